//! Text cleaning: deterministic cleanup of service-exported text.
//!
//! ## Why is cleaning necessary?
//!
//! The export endpoint does not return the recognised text alone. It returns
//! a document rendition with service-injected framing:
//!
//! - a UTF-8 BOM at the start of the body
//! - a preamble block (the original filename on its own line, followed by a
//!   `________________` rule) before the first recognised character
//! - Windows-style `\r\n` line endings
//! - erratic runs of spaces and blank lines wherever the recogniser was
//!   unsure of the layout
//!
//! This module applies cheap, deterministic string/regex rules that strip
//! the framing without touching content. Each rule is independently testable,
//! and the whole pass is pure and total: malformed input simply flows through
//! with its whitespace normalised. Running `clean_text` on its own output is
//! a no-op (the rules are idempotent), which is what lets failed runs be
//! re-cleaned from the raw files without another round of remote calls.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleaning rules to raw exported text.
///
/// Rules (applied in order):
/// 1. Strip the UTF-8 BOM
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip the service preamble (title line + `____` rule)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of spaces/tabs inside lines
/// 6. Collapse 2+ consecutive blank lines down to 1
/// 7. Trim leading/trailing blank lines
pub fn clean_text(input: &str) -> String {
    let s = strip_bom(input);
    let s = normalise_line_endings(s);
    let s = strip_export_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_inline_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip BOM ────────────────────────────────────────────────────────

fn strip_bom(input: &str) -> &str {
    input.strip_prefix('\u{FEFF}').unwrap_or(input)
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip the export preamble ────────────────────────────────────────
//
// The exported document opens with the uploaded filename as a heading and a
// horizontal rule of underscores before the recognised text begins. Only a
// rule found within the first few lines is treated as preamble; underscore
// runs later in the document are content.

const PREAMBLE_SCAN_LINES: usize = 4;

static RE_UNDERSCORE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_{4,}\s*$").unwrap());

fn strip_export_preamble(input: &str) -> String {
    let mut offset = 0;
    for line in input.lines().take(PREAMBLE_SCAN_LINES) {
        // +1 for the newline; saturates at the end of unterminated input.
        let line_end = (offset + line.len() + 1).min(input.len());
        if RE_UNDERSCORE_RULE.is_match(line) {
            return input[line_end..].to_string();
        }
        offset = line_end;
    }
    input.to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse inline whitespace runs ──────────────────────────────────

static RE_INLINE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn collapse_inline_whitespace(input: &str) -> String {
    RE_INLINE_WS.replace_all(input, " ").to_string()
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{FEFF}hello"), "hello");
        assert_eq!(strip_bom("hello"), "hello");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_strip_preamble() {
        let input = "scan_001.png\n________________\nActual recognised text";
        assert_eq!(strip_export_preamble(input), "Actual recognised text");
    }

    #[test]
    fn test_preamble_with_blank_line() {
        let input = "scan_001.png\n\n________________\nBody";
        assert_eq!(strip_export_preamble(input), "Body");
    }

    #[test]
    fn test_no_preamble_passthrough() {
        let input = "Just text\nwith lines";
        assert_eq!(strip_export_preamble(input), input);
    }

    #[test]
    fn test_late_underscores_are_content() {
        let input = "l1\nl2\nl3\nl4\nl5\n________________\nl6";
        assert_eq!(strip_export_preamble(input), input);
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("  hi   \nthere  "), "  hi\nthere");
    }

    #[test]
    fn test_collapse_inline_whitespace() {
        assert_eq!(collapse_inline_whitespace("a    b\tc\t\td"), "a b\tc d");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_simple_text_is_untouched() {
        assert_eq!(clean_text("Hello"), "Hello");
        assert_eq!(clean_text("Hello\nWorld"), "Hello\nWorld");
    }

    #[test]
    fn test_clean_full_export() {
        let input = "\u{FEFF}scan_001.png\r\n________________\r\nHello   world  \r\n\r\n\r\n\r\nSecond   paragraph\r\n";
        assert_eq!(clean_text(input), "Hello world\n\nSecond paragraph");
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("\u{FEFF}"), "");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let inputs = [
            "\u{FEFF}a.png\n________________\nBody  text\n\n\n\nmore",
            "plain text",
            "   spaced\t\tout   ",
            "",
            "line\r\nendings\rgalore",
        ];
        for input in inputs {
            let once = clean_text(input);
            let twice = clean_text(&once);
            assert_eq!(once, twice, "clean must be a fixed point, input: {input:?}");
        }
    }
}

//! Text combination: aggregate per-file texts into one output.
//!
//! A pure function over an ordered section list. The orchestrator hands the
//! sections over in discovery order after the join barrier, so the combined
//! document reads in the same order as a directory listing of the inputs —
//! never in completion order.

/// Combine `(filename, text)` sections into one document.
///
/// With `include_headers`, each section is prefixed with a
/// `--- filename ---` delimiter line; sections are joined by a single
/// newline. Without headers, sections are joined by a blank line.
///
/// Never fails; an empty section list produces an empty string.
pub fn combine_texts(sections: &[(String, String)], include_headers: bool) -> String {
    if include_headers {
        sections
            .iter()
            .map(|(filename, text)| format!("--- {filename} ---\n{text}"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        sections
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(f, t)| (f.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn empty_input_empty_output() {
        assert_eq!(combine_texts(&[], true), "");
        assert_eq!(combine_texts(&[], false), "");
    }

    #[test]
    fn headers_delimit_each_section() {
        let combined = combine_texts(
            &sections(&[("a.png", "Hello"), ("b.jpg", "World")]),
            true,
        );
        assert_eq!(combined, "--- a.png ---\nHello\n--- b.jpg ---\nWorld");
    }

    #[test]
    fn no_headers_joins_with_blank_line() {
        let combined = combine_texts(
            &sections(&[("a.png", "Hello"), ("b.jpg", "World")]),
            false,
        );
        assert_eq!(combined, "Hello\n\nWorld");
    }

    #[test]
    fn single_section_with_headers() {
        let combined = combine_texts(&sections(&[("only.png", "text")]), true);
        assert_eq!(combined, "--- only.png ---\ntext");
    }

    #[test]
    fn input_order_is_output_order() {
        let combined = combine_texts(
            &sections(&[("z.png", "last name, first content"), ("a.png", "second")]),
            true,
        );
        let z = combined.find("z.png").unwrap();
        let a = combined.find("a.png").unwrap();
        assert!(z < a, "sections must keep the given order, not sort");
    }
}

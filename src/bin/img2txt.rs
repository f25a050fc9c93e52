//! CLI binary for img2txt.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! renders progress, and turns the final report into an exit status:
//! 0 = clean run, 1 = per-file failures only, 2 = fatal abort (auth, quota,
//! pre-flight).

use anyhow::{Context, Result};
use clap::Parser;
use img2txt::{
    run_batch, BatchConfig, BatchProgressCallback, FileStatus, FingerprintMode, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per finished
/// file. Works correctly when files complete out-of-order (concurrency > 1).
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} image(s)…"))
        ));
    }

    fn on_file_start(&self, filename: &str, _index: usize, _total: usize) {
        self.bar.set_message(filename.to_string());
    }

    fn on_file_done(&self, filename: &str, status: FileStatus, detail: &str) {
        let line = match status {
            FileStatus::Success => format!("  {} {}", green("✓"), filename),
            FileStatus::SkippedDuplicate => {
                format!("  {} {}  {}", yellow("↷"), filename, dim("duplicate"))
            }
            FileStatus::Pending => format!("  {} {}  {}", dim("·"), filename, dim("not attempted")),
            FileStatus::Failed => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                format!("  {} {}  {}", red("✗"), filename, red(&ellipsize(detail, 80)))
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {}/{} image(s) processed",
                green("✔"),
                bold(&success_count.to_string()),
                total_files
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) processed  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

/// Cap `s` at `max_chars` characters, appending `…` when shortened.
///
/// Counts characters, not bytes: failure details embed filenames, which may
/// be non-ASCII, and a byte slice could land mid-character.
fn ellipsize(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) if s[idx..].chars().count() > 1 => format!("{}…", &s[..idx]),
        _ => s.to_string(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every image in ./images (token read from ./token.json)
  img2txt

  # Custom directories and headers between combined sections
  img2txt scans --texts-dir out/clean --raw-dir out/raw --include-headers

  # Only PNG and TIFF, keep a cross-run duplicate registry
  img2txt --extensions png,tiff --registry .img2txt-registry.json

  # Per-file outputs only, no combined file
  img2txt --no-combine-texts

  # Machine-readable report
  img2txt --json > report.json

EXIT STATUS:
  0  every file succeeded (duplicates count as success)
  1  some files failed, the batch itself completed
  2  fatal abort: bad credential, quota exhausted, or pre-flight error

TOKEN FILE:
  img2txt does not run the OAuth consent flow itself. It reads a JSON token
  file (default: token.json) holding either
    {"refresh_token": "...", "client_id": "...", "client_secret": "..."}
  or a bare {"access_token": "..."}.
"#;

/// Convert a directory of scanned images to plain text via Google Drive OCR.
#[derive(Parser, Debug)]
#[command(
    name = "img2txt",
    version,
    about = "Convert a directory of scanned images to plain text via Google Drive OCR",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the source images.
    #[arg(default_value = "images", env = "IMG2TXT_INPUT")]
    input: PathBuf,

    /// Directory for cleaned per-file text outputs.
    #[arg(long, default_value = "texts", env = "IMG2TXT_TEXTS_DIR")]
    texts_dir: PathBuf,

    /// Directory for raw (uncleaned) per-file text outputs.
    #[arg(long = "raw-dir", default_value = "raw_texts", env = "IMG2TXT_RAW_DIR")]
    raw_texts_dir: PathBuf,

    /// Comma-separated image extensions to process.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "jpg,jpeg,png,gif,bmp,tif,tiff,webp",
        env = "IMG2TXT_EXTENSIONS"
    )]
    extensions: Vec<String>,

    /// Skip producing the combined cleaned-text file.
    #[arg(long, env = "IMG2TXT_NO_COMBINE")]
    no_combine_texts: bool,

    /// Also produce a combined file from the raw, uncleaned texts.
    #[arg(long, env = "IMG2TXT_COMBINE_RAW")]
    combine_raw: bool,

    /// Prefix each combined section with a `--- filename ---` header line.
    #[arg(long, env = "IMG2TXT_HEADERS")]
    include_headers: bool,

    /// Path to the stored OAuth token file.
    #[arg(long, default_value = "token.json", env = "IMG2TXT_TOKEN")]
    token: PathBuf,

    /// Persist duplicate fingerprints here so later runs skip processed files.
    #[arg(long, env = "IMG2TXT_REGISTRY")]
    registry: Option<PathBuf>,

    /// Fingerprint duplicates by file content or by name+size.
    #[arg(long, value_enum, default_value = "content", env = "IMG2TXT_FINGERPRINT")]
    fingerprint: FingerprintArg,

    /// Retries per remote call on transient failure.
    #[arg(long, default_value_t = 3, env = "IMG2TXT_MAX_RETRIES")]
    max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt).
    #[arg(long, default_value_t = 500, env = "IMG2TXT_RETRY_BACKOFF_MS")]
    retry_backoff_ms: u64,

    /// Per-remote-call timeout in seconds.
    #[arg(long, default_value_t = 60, env = "IMG2TXT_API_TIMEOUT")]
    api_timeout: u64,

    /// Number of files processed concurrently.
    #[arg(short, long, default_value_t = 1, env = "IMG2TXT_CONCURRENCY")]
    concurrency: usize,

    /// Keep remote artifacts instead of deleting them (debugging aid).
    #[arg(long, env = "IMG2TXT_RETAIN_REMOTE")]
    retain_remote: bool,

    /// Print the full report as JSON instead of human-readable output.
    #[arg(long, env = "IMG2TXT_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "IMG2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2TXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FingerprintArg {
    Content,
    NameSize,
}

impl From<FingerprintArg> for FingerprintMode {
    fn from(v: FingerprintArg) -> Self {
        match v {
            FingerprintArg::Content => FingerprintMode::Content,
            FingerprintArg::NameSize => FingerprintMode::NameSize,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", red("✘"));
            // Pre-flight and output errors are fatal-class.
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<ExitCode> {
    // Stop issuing new remote calls on Ctrl-C; in-flight files still delete
    // the artifacts they created before the run unwinds.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", yellow("Interrupt received — finishing in-flight files…"));
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let mut builder = BatchConfig::builder()
        .input_dir(&cli.input)
        .texts_dir(&cli.texts_dir)
        .raw_texts_dir(&cli.raw_texts_dir)
        .extensions(&cli.extensions)
        .combine_texts(!cli.no_combine_texts)
        .combine_raw(cli.combine_raw)
        .include_headers(cli.include_headers)
        .token_path(&cli.token)
        .fingerprint(cli.fingerprint.clone().into())
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .concurrency(cli.concurrency)
        .retain_remote(cli.retain_remote)
        .cancel_flag(cancel);
    if let Some(ref path) = cli.registry {
        builder = builder.registry_path(path);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let report = run_batch(&config).await.context("Batch failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report);
    }

    Ok(if report.is_fatal() {
        ExitCode::from(2)
    } else if report.has_failures() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Human-readable end-of-run summary (the callback already printed the
/// per-file log lines).
fn print_summary(report: &img2txt::BatchReport) {
    eprintln!(
        "   {} ok  /  {} failed  /  {} skipped  /  {} pending  —  {}ms total",
        report.successful,
        report.failed,
        report.skipped,
        report.pending,
        dim(&report.total_duration_ms.to_string()),
    );

    if report.has_failures() {
        eprintln!("{}", bold("Failures:"));
        for (filename, reason) in report.failures() {
            eprintln!("  {} {}: {}", red("✗"), filename, reason);
        }
    }

    if let Some(ref fatal) = report.fatal {
        eprintln!("{} {}", red("✘ Batch aborted:"), fatal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsize_short_input_untouched() {
        assert_eq!(ellipsize("all fine", 80), "all fine");
        assert_eq!(ellipsize("", 80), "");
    }

    #[test]
    fn ellipsize_exact_length_untouched() {
        let s = "x".repeat(80);
        assert_eq!(ellipsize(&s, 80), s);
    }

    #[test]
    fn ellipsize_caps_long_input() {
        let s = "x".repeat(100);
        let out = ellipsize(&s, 80);
        assert_eq!(out.chars().count(), 80);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn ellipsize_survives_multibyte_filenames() {
        // A failure detail embedding a Japanese filename: characters are
        // three bytes each, so a byte-indexed cut would land mid-character.
        let detail =
            "'日本語スキャン画像ファイル長い名前.png': upload failed after 3 retries: HTTP 503 service unavailable";
        assert!(detail.len() > 80, "detail must exceed the cap in bytes");
        let out = ellipsize(detail, 80);
        assert!(out.chars().count() <= 80);
        assert!(out.ends_with('…'));
        assert!(out.starts_with("'日本語"));
    }
}

//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::{
    convert, convert_to_file, inspect, CaptionFailurePolicy, ConversionConfig,
    ConversionProgressCallback, DocumentKind, PageSelection, PageSeparator, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner with one log line per captioned image, and a
/// page bar for PDFs once the page count is known.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-image wall-clock start times; images may overlap when captioning
    /// runs concurrently.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_page_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, kind: DocumentKind, total_pages: usize) {
        if kind.is_paginated() {
            self.activate_page_bar(total_pages);
        }
        self.bar.set_prefix("Converting");
        self.bar.set_message(kind.to_string());
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {kind} document…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, _items: usize) {
        self.bar.inc(1);
    }

    fn on_image_start(&self, index: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(format!("captioning image {index}"));
    }

    fn on_image_captioned(&self, index: usize, caption_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Image {:>3}  {:<8}  {}",
            green("✓"),
            index,
            dim(&format!("{caption_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_image_error(&self, index: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} Image {:>3}  {}  {}",
            red("✗"),
            index,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_conversion_complete(&self, images_captioned: usize, caption_failures: usize) {
        self.bar.finish_and_clear();

        if caption_failures == 0 {
            eprintln!(
                "{} {} images captioned",
                green("✔"),
                bold(&images_captioned.to_string())
            );
        } else {
            eprintln!(
                "{} {} images captioned  ({} replaced by placeholder)",
                cyan("⚠"),
                bold(&images_captioned.to_string()),
                red(&caption_failures.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout)
  doc2md report.docx

  # Convert to file
  doc2md slides.pptx -o slides.md

  # Selected PDF pages, with a separator between pages
  doc2md --pages 1-5 --separator comment paper.pdf -o paper.md

  # Use a specific model
  doc2md --model gpt-4.1 --provider openai report.docx

  # Keep going when an image cannot be captioned
  doc2md --on-caption-error placeholder --placeholder "image" report.docx

  # Convert from URL
  doc2md https://example.com/whitepaper.pdf -o whitepaper.md

  # Report the detected format only (no API key needed)
  doc2md --inspect-only mystery.bin

  # JSON output with stats
  doc2md --json report.docx > output.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to the pdfium shared library (PDF input only)

Embedded images are written to --output-dir (default static/temp) while they
are captioned and removed right after.
"#;

/// Convert DOCX, PPTX and PDF documents to Markdown, captioning images with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert DOCX, PPTX and PDF documents to Markdown, captioning images with Vision LLMs",
    long_about = "Convert DOCX, PPTX and PDF documents (local files or URLs) to Markdown. Every \
embedded image is replaced by a [caption]() placeholder written by a Vision Language Model. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint \
(Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL.
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Caption prompt sent with every image.
    #[arg(long, env = "DOC2MD_PROMPT")]
    prompt: Option<String>,

    /// Directory for temporary image files.
    #[arg(long, env = "DOC2MD_OUTPUT_DIR", default_value = "static/temp")]
    output_dir: PathBuf,

    /// Maximum nesting of image conversions.
    #[arg(long, env = "DOC2MD_MAX_DEPTH", default_value_t = 3)]
    max_depth: usize,

    /// What to do when an image cannot be captioned.
    #[arg(long, env = "DOC2MD_ON_CAPTION_ERROR", value_enum, default_value = "abort")]
    on_caption_error: CaptionErrorArg,

    /// Caption text used by `--on-caption-error placeholder`.
    #[arg(long, env = "DOC2MD_PLACEHOLDER", default_value = "")]
    placeholder: String,

    /// Images captioned at once.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// PDF page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DOC2MD_PAGES", default_value = "all")]
    pages: String,

    /// PDF page separator: none, hr, comment, or custom string.
    #[arg(long, env = "DOC2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOC2MD_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per caption.
    #[arg(long, env = "DOC2MD_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOC2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per caption on LLM failure.
    #[arg(long, env = "DOC2MD_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Print the detected document format only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOC2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CaptionErrorArg {
    Abort,
    Placeholder,
}

#[tokio::main]
async fn main() -> Result<()> {
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
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let kind = inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&kind).context("Failed to serialize format")?
            );
        } else {
            println!("File:    {}", cli.input);
            println!("Format:  {}", kind);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} images  {}ms  →  {}",
                if stats.caption_failures == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.images_found,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let output = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        // Only print inline stats when the progress callback is disabled.
        if !cli.quiet && !show_progress {
            eprintln!(
                "Converted {} document: {} images captioned in {}ms",
                output.kind, output.stats.images_captioned, output.stats.total_duration_ms
            );
            if output.stats.caption_failures > 0 {
                eprintln!(
                    "  {} images replaced by placeholder",
                    output.stats.caption_failures
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = parse_pages(&cli.pages)?;
    let separator = parse_separator(&cli.separator);
    let policy = match cli.on_caption_error {
        CaptionErrorArg::Abort => CaptionFailurePolicy::Abort,
        CaptionErrorArg::Placeholder => CaptionFailurePolicy::Placeholder(cli.placeholder.clone()),
    };

    let mut builder = ConversionConfig::builder()
        .detect_provider_from_env(true)
        .output_dir(&cli.output_dir)
        .max_depth(cli.max_depth)
        .caption_failure(policy)
        .caption_concurrency(cli.concurrency)
        .pages(pages)
        .page_separator(separator)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref prompt) = cli.prompt {
        builder = builder.caption_prompt(prompt);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

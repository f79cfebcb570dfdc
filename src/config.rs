//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The same config value is passed
//! explicitly into every nested conversion of an extracted image, so the
//! captioning client, model and prompt seen by an image three levels deep are
//! exactly the ones the caller set at the top.

use crate::error::Doc2MdError;
use crate::pipeline::llm::ImageCaptioner;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Directory that receives materialized images when none is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "static/temp";

/// Default limit on nested conversions (document → image → …).
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Configuration for a document-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use edgequake_doc2md::{CaptionFailurePolicy, ConversionConfig};
///
/// let config = ConversionConfig::builder()
///     .caption_prompt("Describe this figure in one sentence.")
///     .output_dir("/tmp/doc2md")
///     .caption_failure(CaptionFailurePolicy::Placeholder("image".into()))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Pre-constructed captioning client. Takes precedence over every other
    /// captioner setting.
    pub captioner: Option<Arc<dyn ImageCaptioner>>,

    /// Pre-constructed LLM provider, wrapped in a
    /// [`crate::pipeline::llm::VisionCaptioner`] when no `captioner` is set.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// Fall back to API-key environment variables when no provider is named.
    /// Default: false, so a library caller without a client gets no captions
    /// rather than a surprise API bill.
    pub detect_provider_from_env: bool,

    /// Prompt sent with every image. If None, uses
    /// [`crate::prompts::DEFAULT_CAPTION_PROMPT`].
    pub caption_prompt: Option<String>,

    /// Directory where extracted images live while they are captioned.
    /// Created on demand, never removed. Default: `static/temp`.
    pub output_dir: PathBuf,

    /// Maximum nesting depth of conversions. Default: 3.
    pub max_depth: usize,

    /// What to do when one image cannot be captioned. Default: abort.
    pub caption_failure: CaptionFailurePolicy,

    /// Images captioned at once within one page or flow document. Default: 1.
    ///
    /// Output order never depends on this value.
    pub caption_concurrency: usize,

    /// Sampling temperature for the captioning call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per caption. Default: 1024.
    pub max_tokens: usize,

    /// Retries on a failed captioning call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection for paginated documents. Default: All pages.
    pub pages: PageSelection,

    /// Separator between PDF pages in assembled output. Default: None.
    pub page_separator: PageSeparator,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives top-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            captioner: None,
            provider: None,
            provider_name: None,
            model: None,
            detect_provider_from_env: false,
            caption_prompt: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_depth: DEFAULT_MAX_DEPTH,
            caption_failure: CaptionFailurePolicy::default(),
            caption_concurrency: 1,
            temperature: 0.1,
            max_tokens: 1024,
            max_retries: 0,
            retry_backoff_ms: 500,
            password: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("captioner", &self.captioner.as_ref().map(|_| "<dyn ImageCaptioner>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("detect_provider_from_env", &self.detect_provider_from_env)
            .field("caption_prompt", &self.caption_prompt)
            .field("output_dir", &self.output_dir)
            .field("max_depth", &self.max_depth)
            .field("caption_failure", &self.caption_failure)
            .field("caption_concurrency", &self.caption_concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn captioner(mut self, captioner: Arc<dyn ImageCaptioner>) -> Self {
        self.config.captioner = Some(captioner);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn detect_provider_from_env(mut self, v: bool) -> Self {
        self.config.detect_provider_from_env = v;
        self
    }

    pub fn caption_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.caption_prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn caption_failure(mut self, policy: CaptionFailurePolicy) -> Self {
        self.config.caption_failure = policy;
        self
    }

    pub fn caption_concurrency(mut self, n: usize) -> Self {
        self.config.caption_concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.max_depth == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "max_depth must be ≥ 1, otherwise no embedded image can be captioned".into(),
            ));
        }
        if c.caption_concurrency == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "caption_concurrency must be ≥ 1".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(Doc2MdError::InvalidConfig(
                "output_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a conversion reacts to an image whose nested conversion failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptionFailurePolicy {
    /// Fail the whole document with the caption error. (default)
    #[default]
    Abort,
    /// Use the given text as the caption and keep converting.
    Placeholder(String),
}

/// Specifies which pages of a paginated document to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// What goes between two non-empty pages of assembled PDF output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages are concatenated directly. (default)
    #[default]
    None,
    /// Horizontal rule line: "---"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom line inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    ///
    /// The assembled buffer always ends in a newline at a page boundary, so
    /// every non-empty separator is a complete line.
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => String::new(),
            PageSeparator::HorizontalRule => "---\n".to_string(),
            PageSeparator::Comment => format!("<!-- page {} -->\n", page_num),
            PageSeparator::Custom(s) => format!("{}\n", s),
        }
    }
}

//! Captioning clients: the [`ImageCaptioner`] seam and its VLM implementation.
//!
//! The engine never talks to an LLM directly. It asks an `ImageCaptioner`
//! for a description of one image, which keeps the recursion logic testable
//! with a scripted captioner and lets callers plug in any backend.
//!
//! ## Retry Strategy
//!
//! Captioning calls are not retried by default. When `max_retries` is set,
//! the delay doubles after each attempt (`retry_backoff_ms * 2^attempt`), so
//! with 500 ms base and 3 retries the waits are 500 ms → 1 s → 2 s.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without a model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Produces a text description of one image.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    /// Describe `image`, following `prompt`.
    async fn caption(&self, image: ImageData, prompt: &str) -> Result<String, Doc2MdError>;
}

/// Captions images with a vision-capable [`LLMProvider`].
pub struct VisionCaptioner {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionCaptioner {
    /// Wrap `provider`, taking sampling and retry settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ImageCaptioner for VisionCaptioner {
    /// The request is a single user turn: the prompt as text with the image
    /// attached.
    async fn caption(&self, image: ImageData, prompt: &str) -> Result<String, Doc2MdError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let options = self.options();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Caption: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Caption: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Caption: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(Doc2MdError::LlmApiError {
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Doc2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Doc2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the captioning client, from most-specific to least-specific.
///
/// 1. **Captioner** (`config.captioner`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped in a
///    [`VisionCaptioner`].
/// 3. **Named provider + model** (`config.provider_name`): built through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 4. **Environment**: only when `detect_provider_from_env` is set:
///    `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, then `OPENAI_API_KEY`,
///    then [`ProviderFactory::from_env`].
///
/// `Ok(None)` means no client: images convert to empty captions.
pub fn resolve_captioner(
    config: &ConversionConfig,
) -> Result<Option<Arc<dyn ImageCaptioner>>, Doc2MdError> {
    if let Some(ref captioner) = config.captioner {
        return Ok(Some(Arc::clone(captioner)));
    }

    let wrap = |provider: Arc<dyn LLMProvider>| -> Arc<dyn ImageCaptioner> {
        Arc::new(VisionCaptioner::new(provider, config))
    };

    if let Some(ref provider) = config.provider {
        return Ok(Some(wrap(Arc::clone(provider))));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model).map(|p| Some(wrap(p)));
    }

    if !config.detect_provider_from_env {
        return Ok(None);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model).map(|p| Some(wrap(p)));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model).map(|p| Some(wrap(p)));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Doc2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Some(wrap(llm_provider)))
}

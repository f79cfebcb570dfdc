//! Prompts sent to the vision model.
//!
//! Callers can override the default via
//! [`crate::config::ConversionConfig::caption_prompt`]; the constant here is
//! used only when no override is provided. The same prompt reaches every
//! nested conversion, so an image inside a PPTX inside a caption request
//! is described the same way as a standalone one.

/// Default prompt for describing one image.
pub const DEFAULT_CAPTION_PROMPT: &str = "Write a detailed caption for this image.";

/// The prompt to use for a conversion: the override, else the default.
pub fn caption_prompt(custom: Option<&str>) -> &str {
    match custom {
        Some(p) if !p.trim().is_empty() => p,
        _ => DEFAULT_CAPTION_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_used_when_missing_or_blank() {
        assert_eq!(caption_prompt(None), DEFAULT_CAPTION_PROMPT);
        assert_eq!(caption_prompt(Some("  ")), DEFAULT_CAPTION_PROMPT);
        assert_eq!(caption_prompt(Some("Name the chart type.")), "Name the chart type.");
    }
}

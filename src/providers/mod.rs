use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

use crate::data::DataAttachment;
use crate::geometry::PercentBox;

mod gemini;

pub use gemini::{ContentItem, ContentPart, Gemini, InlineData};

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// The remote model seen from the editor: one call to find text regions in an
/// image, one call to paint text out of a cropped region.
pub trait Collaborator: Send + Sync {
    /// Percent boxes relative to `image`. Unparseable model output yields an
    /// empty list rather than an error.
    fn detect_text_regions(&self, image: DataAttachment) -> ProviderFuture<Vec<PercentBox>>;

    /// Returns the cleaned patch as a `data:<mime>;base64,...` URI.
    fn clean_text_region(&self, image: DataAttachment) -> ProviderFuture<String>;
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|value| !value.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GEMINI_API_KEY")
        .or_else(|| get_env("GOOGLE_API_KEY"))
        .ok_or_else(|| anyhow!("API key not found (checked GEMINI_API_KEY, GOOGLE_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

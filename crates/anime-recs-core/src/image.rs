//! Image resolution collaborator.
//!
//! The pipeline asks an [`ImageResolver`] for a cover image per retained
//! recommendation. Resolution is best effort: a `None`, an error, or a
//! timeout all fall back to [`placeholder_url`] and never fail the request.

use crate::error::ImageLookupError;

/// Placeholder pattern; `{title}` is replaced by the URL-encoded title.
pub const DEFAULT_PLACEHOLDER: &str =
    "https://via.placeholder.com/300x450/1a1033/a78bfa?text={title}";

/// Resolves a display image URL for a title.
pub trait ImageResolver: Send + Sync {
    /// Returns `Ok(None)` when no image is known for the title.
    fn resolve(&self, title: &str) -> Result<Option<String>, ImageLookupError>;
}

/// A resolver that never finds an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

impl ImageResolver for NoImages {
    fn resolve(&self, _title: &str) -> Result<Option<String>, ImageLookupError> {
        Ok(None)
    }
}

/// Substitute the URL-encoded title into a placeholder pattern.
pub fn placeholder_url(pattern: &str, title: &str) -> String {
    pattern.replace("{title}", &urlencoding::encode(title))
}

/// Resolve an image, falling back to the placeholder on `None` or error.
pub fn resolve_or_placeholder(resolver: &dyn ImageResolver, pattern: &str, title: &str) -> String {
    match resolver.resolve(title) {
        Ok(Some(url)) if !url.trim().is_empty() => url,
        Ok(_) => placeholder_url(pattern, title),
        Err(e) => {
            tracing::warn!(title, error = %e, "image lookup failed, using placeholder");
            placeholder_url(pattern, title)
        }
    }
}

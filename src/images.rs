//! Image resolvers for the serving commands.
//!
//! [`StaticImages`] answers from a local title → URL map. Any resolver can
//! be wrapped in a [`TimeoutResolver`] so a slow lookup never holds up a
//! recommendation; on timeout the pipeline falls back to the placeholder.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anime_recs_core::error::ImageLookupError;
use anime_recs_core::image::{ImageResolver, NoImages};

use crate::config::ImagesConfig;

/// Title → URL lookup loaded from a JSON object. Matching ignores case and
/// surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct StaticImages {
    urls: HashMap<String, String>,
}

impl StaticImages {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            urls: entries
                .into_iter()
                .map(|(k, v)| (key(k.as_ref()), v.into()))
                .collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read image map: {}", path.display()))?;
        let map: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse image map: {}", path.display()))?;
        Ok(Self::new(map))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

fn key(title: &str) -> String {
    title.trim().to_lowercase()
}

impl ImageResolver for StaticImages {
    fn resolve(&self, title: &str) -> Result<Option<String>, ImageLookupError> {
        Ok(self.urls.get(&key(title)).cloned())
    }
}

/// Runs the inner resolver on a worker thread and gives up after `timeout`.
///
/// A timed-out worker is left to finish on its own; its answer is dropped.
pub struct TimeoutResolver {
    inner: Arc<dyn ImageResolver>,
    timeout: Duration,
}

impl TimeoutResolver {
    pub fn new(inner: Arc<dyn ImageResolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl ImageResolver for TimeoutResolver {
    fn resolve(&self, title: &str) -> Result<Option<String>, ImageLookupError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let title = title.to_string();
        std::thread::Builder::new()
            .name("image-lookup".to_string())
            .spawn(move || {
                let _ = tx.send(inner.resolve(&title));
            })
            .map_err(|e| ImageLookupError::Failed(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ImageLookupError::Timeout(self.timeout.as_millis() as u64))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ImageLookupError::Failed(
                "image lookup worker exited without an answer".to_string(),
            )),
        }
    }
}

/// Build the resolver described by `[images]`.
pub fn build_resolver(config: &ImagesConfig) -> Result<Arc<dyn ImageResolver>> {
    let Some(path) = &config.map else {
        return Ok(Arc::new(NoImages));
    };
    let images = StaticImages::from_file(path)?;
    tracing::info!(path = %path.display(), titles = images.len(), "loaded image map");

    let inner: Arc<dyn ImageResolver> = Arc::new(images);
    if config.timeout_ms == 0 {
        return Ok(inner);
    }
    Ok(Arc::new(TimeoutResolver::new(
        inner,
        Duration::from_millis(config.timeout_ms),
    )))
}

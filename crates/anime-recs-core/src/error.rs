//! Error kinds for fitting and serving recommendations.
//!
//! Every variant of [`RecommendError`] is fatal to the call that raised it:
//! no partial recommendation list is returned alongside an error. Image
//! lookup failures are modelled separately by [`ImageLookupError`] because
//! they never fail a request.

/// Fatal errors raised by the fitting and recommendation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum RecommendError {
    /// A fitted artifact could not be loaded or decoded.
    #[error("missing artifact '{name}': {source}")]
    MissingArtifact {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The training or serving catalog has zero rows.
    #[error("catalog is empty")]
    EmptyCatalog,

    /// An assembled feature vector disagrees with the index width.
    #[error("feature width mismatch: expected {expected} columns, got {actual}")]
    FeatureShapeMismatch { expected: usize, actual: usize },

    /// A categorical column had no observed values to learn categories from.
    #[error("column '{column}' has no observed values")]
    NoObservations { column: &'static str },

    /// The query carried a value the pipeline cannot encode.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl RecommendError {
    /// Wraps any error as a [`RecommendError::MissingArtifact`] for `name`.
    pub fn missing_artifact<E>(name: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RecommendError::MissingArtifact {
            name: name.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Non-fatal failure of an image resolution collaborator.
#[derive(thiserror::Error, Debug)]
pub enum ImageLookupError {
    #[error("image lookup timed out after {0} ms")]
    Timeout(u64),

    #[error("image lookup failed: {0}")]
    Failed(String),
}

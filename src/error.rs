use crate::generator::GenerationError;

/// Engine error taxonomy. NotFound and Validation surface to the caller with
/// no state mutated; Generation and Grading are recovered locally with
/// deterministic fallbacks wherever a flow defines one; Persistence is fatal
/// to the current request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("grading failed: {0}")]
    Grading(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("stored document is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Retrying the whole operation may succeed for persistence failures;
    /// the other variants are deterministic for a given request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

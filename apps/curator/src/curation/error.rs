use thiserror::Error;
use uuid::Uuid;

use crate::curation::provider::ProviderError;

/// Failure of a single generation run. Never escapes the run that produced it.
#[derive(Debug, Error)]
pub enum CurationError {
    /// A strategy-required filter is missing or a bound is violated.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external ranking provider or the clip corpus could not answer.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The new playlist or the run bookkeeping could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("playlist script {0} not found")]
    ScriptNotFound(Uuid),

    #[error("playlist script {0} is inactive")]
    ScriptInactive(Uuid),
}

impl CurationError {
    pub fn config(msg: impl Into<String>) -> Self {
        CurationError::Configuration(msg.into())
    }

    /// Corpus query failures are reported as provider unavailability.
    pub fn corpus(err: anyhow::Error) -> Self {
        CurationError::ProviderUnavailable(format!("clip corpus query failed: {err:#}"))
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        CurationError::Persistence(format!("{err:#}"))
    }

    /// Short label used in logs and tick reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CurationError::Configuration(_) => "configuration",
            CurationError::ProviderUnavailable(_) => "provider_unavailable",
            CurationError::Persistence(_) => "persistence",
            CurationError::ScriptNotFound(_) => "not_found",
            CurationError::ScriptInactive(_) => "inactive",
        }
    }
}

impl From<ProviderError> for CurationError {
    fn from(err: ProviderError) -> Self {
        CurationError::ProviderUnavailable(err.to_string())
    }
}

use std::io;
use thiserror::Error;

/// Failures that end an assessment before any evidence is gathered.
///
/// Everything after acquisition degrades to "no evidence" instead.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no file was uploaded")]
    MissingArtifact,
    #[error("could not store the uploaded artifact: {0}")]
    Acquisition(#[from] io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalyzeError {
    /// True for errors caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyzeError::MissingArtifact | AnalyzeError::InvalidInput(_)
        )
    }
}

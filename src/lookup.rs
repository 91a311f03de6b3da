//! Narrow interfaces to the slow or unreliable collaborators: DNS, WHOIS,
//! page fetches, OCR and file metadata extraction.
//!
//! Every call returns `Result<_, LookupError>`. A failed lookup is a normal
//! outcome meaning "no evidence" and is turned into zero flags by the caller.

use crate::config::TimeoutConfig;
use crate::metadata::{ImageMetadata, PdfInfo};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LookupError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("lookup timed out")]
    Timeout,
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolves,
    Unresolvable,
}

pub trait DnsProbe: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str) -> LookupFuture<'a, Resolution>;
}

pub trait RegistrationLookup: Send + Sync {
    /// Raw creation date string from the registration record, if it has one.
    fn creation_date<'a>(&'a self, domain: &'a str) -> LookupFuture<'a, Option<String>>;
}

pub trait PageFetcher: Send + Sync {
    /// Body of a successful (2xx) response.
    fn fetch<'a>(&'a self, url: &'a str) -> LookupFuture<'a, String>;
}

pub trait OcrEngine: Send + Sync {
    fn recognize<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, String>;
}

pub trait DocumentReader: Send + Sync {
    fn text<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, String>;
    fn info<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, Option<PdfInfo>>;
}

pub trait ImageMetadataReader: Send + Sync {
    /// `Ok(None)` when the image carries no metadata block.
    fn read<'a>(&'a self, path: &'a Path) -> LookupFuture<'a, Option<ImageMetadata>>;
}

/// Upper bounds for each kind of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub dns: Duration,
    pub registration: Duration,
    pub fetch: Duration,
    pub ocr: Duration,
    pub metadata: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for Deadlines {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            dns: Duration::from_secs(config.dns),
            registration: Duration::from_secs(config.whois),
            fetch: Duration::from_secs(config.fetch),
            ocr: Duration::from_secs(config.ocr),
            metadata: Duration::from_secs(config.metadata),
        }
    }
}

/// Runs a lookup under `limit`; expiry becomes [`LookupError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, lookup: F) -> Result<T, LookupError>
where
    F: Future<Output = Result<T, LookupError>>,
{
    match tokio::time::timeout(limit, lookup).await {
        Ok(outcome) => outcome,
        Err(_) => Err(LookupError::Timeout),
    }
}

/// Converts a failed lookup into "no evidence", logging it for operators.
pub fn absorb<T>(check: &str, subject: &str, outcome: Result<T, LookupError>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("{check} for {subject} produced no evidence: {e}");
            None
        }
    }
}

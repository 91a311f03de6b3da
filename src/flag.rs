use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which kind of artifact an assessment was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Document,
    Image,
    Text,
    Unknown,
    Url,
    Email,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Document => "document",
            SubjectType::Image => "image",
            SubjectType::Text => "text",
            SubjectType::Unknown => "unknown",
            SubjectType::Url => "url",
            SubjectType::Email => "email",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("flag key must not be empty")]
    EmptyKey,
    #[error("flag reason must not be empty (key: {0})")]
    EmptyReason(String),
}

/// One weighted piece of risk evidence produced by a single rule.
///
/// Fields are private: a flag cannot be changed once it has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceFlag {
    key: String,
    reason: String,
    weight: u32,
    explanation: String,
}

impl EvidenceFlag {
    pub fn new(
        key: impl Into<String>,
        reason: impl Into<String>,
        weight: u32,
        explanation: impl Into<String>,
    ) -> Result<Self, FlagError> {
        let key = key.into();
        let reason = reason.into();

        if key.trim().is_empty() {
            return Err(FlagError::EmptyKey);
        }
        if reason.trim().is_empty() {
            return Err(FlagError::EmptyReason(key));
        }

        Ok(Self {
            key,
            reason,
            weight,
            explanation: explanation.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// Static description of a rule: its key, weight and analyst-facing explanation.
///
/// Every check in the crate declares its rules as `const` values and calls
/// [`Rule::fire`] with an occurrence-specific reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub key: &'static str,
    pub weight: u32,
    pub explanation: &'static str,
}

impl Rule {
    pub const fn new(key: &'static str, weight: u32, explanation: &'static str) -> Self {
        Self {
            key,
            weight,
            explanation,
        }
    }

    pub fn fire(&self, reason: impl Into<String>) -> EvidenceFlag {
        let reason = reason.into();
        log::debug!("Rule {} fired (weight {}): {}", self.key, self.weight, reason);
        EvidenceFlag {
            key: self.key.to_string(),
            reason,
            weight: self.weight,
            explanation: self.explanation.to_string(),
        }
    }
}

/// Append-only evidence set for one assessment.
///
/// The set is passed by value from stage to stage. A rule key is recorded at
/// most once; later flags with a key already present are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    flags: Vec<EvidenceFlag>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: impl Into<Option<EvidenceFlag>>) -> Self {
        if let Some(flag) = flag.into() {
            self.record(flag);
        }
        self
    }

    pub fn extend(mut self, flags: impl IntoIterator<Item = EvidenceFlag>) -> Self {
        for flag in flags {
            self.record(flag);
        }
        self
    }

    fn record(&mut self, flag: EvidenceFlag) {
        if self.contains(flag.key()) {
            log::debug!("Ignoring repeated flag {}", flag.key());
            return;
        }
        self.flags.push(flag);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flags.iter().any(|f| f.key == key)
    }

    pub fn flags(&self) -> &[EvidenceFlag] {
        &self.flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn into_flags(self) -> Vec<EvidenceFlag> {
        self.flags
    }
}

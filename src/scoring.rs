use crate::flag::EvidenceFlag;
use serde::Serialize;
use std::fmt;

pub const MEDIUM_RISK_THRESHOLD: u32 = 3;
pub const HIGH_RISK_THRESHOLD: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RiskLabel {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskLabel {
    pub fn from_score(score: u32) -> Self {
        match score {
            score if score >= HIGH_RISK_THRESHOLD => RiskLabel::High,
            score if score >= MEDIUM_RISK_THRESHOLD => RiskLabel::Medium,
            _ => RiskLabel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "Low Risk",
            RiskLabel::Medium => "Medium Risk",
            RiskLabel::High => "High Risk",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub score: u32,
    pub label: RiskLabel,
}

/// Sum of flag weights and the label derived from it.
pub fn aggregate(flags: &[EvidenceFlag]) -> Aggregate {
    let score = flags
        .iter()
        .fold(0u32, |total, flag| total.saturating_add(flag.weight()));

    Aggregate {
        score,
        label: RiskLabel::from_score(score),
    }
}

pub mod api;
pub mod config;
pub mod dns;
pub mod email;
pub mod enrichment;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod flag;
pub mod hints;
pub mod lookup;
pub mod metadata;
pub mod patterns;
pub mod pipeline;
pub mod scoring;
pub mod upload;
pub mod whois;

pub use config::Config;
pub use error::AnalyzeError;
pub use flag::{Evidence, EvidenceFlag, Rule, SubjectType};
pub use lookup::LookupError;
pub use pipeline::{Analyzer, Assessment};
pub use scoring::{aggregate, RiskLabel};

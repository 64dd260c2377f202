//! Section extraction — the collaborator that reads per-section facts for a
//! subject. The pipeline only consumes this contract; how sections are
//! actually scraped is the collaborator's problem.
//!
//! Any shape violation or transport failure surfaces as `ExtractError`; the
//! orchestrator degrades it to a missing/errored record and never lets it
//! abort a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::snapshot::{Section, SectionRecord};

pub mod remote;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extractor error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed extractor response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of the fast existence/count probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProbe {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_count: Option<u32>,
}

impl ScanProbe {
    /// Probe for a section that did not resolve (absent, errored, or timed
    /// out) — treated as not existing.
    pub fn missing() -> Self {
        ScanProbe::default()
    }
}

/// The extraction collaborator contract.
///
/// `scan` is the cheap probe run for every known section; `extract` reads
/// full counts and signals; `extract_deep` adds the AI-ready detail (text,
/// items) used to build the quality request payload.
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    async fn scan(&self, subject_id: &str, section: Section) -> Result<ScanProbe, ExtractError>;

    async fn extract(
        &self,
        subject_id: &str,
        section: Section,
    ) -> Result<SectionRecord, ExtractError>;

    async fn extract_deep(
        &self,
        subject_id: &str,
        section: Section,
    ) -> Result<SectionRecord, ExtractError>;
}

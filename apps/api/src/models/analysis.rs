//! Result types produced by the scoring engines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::snapshot::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// Overall completeness band. Bands: ≥90 excellent, ≥75 good, ≥60 fair,
/// ≥40 needs_work, else poor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Excellent,
    Good,
    Fair,
    NeedsWork,
    Poor,
}

impl Level {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 90 => Level::Excellent,
            s if s >= 75 => Level::Good,
            s if s >= 60 => Level::Fair,
            s if s >= 40 => Level::NeedsWork,
            _ => Level::Poor,
        }
    }
}

/// Per-section line in the completeness breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub weight: u32,
    pub earned: u32,
    pub passed: bool,
}

/// A single improvement suggestion for a failing section.
/// `impact` equals the section's rubric weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub section: Section,
    pub priority: Priority,
    pub message: String,
    pub impact: u32,
}

/// Output of the completeness engine. Derived solely from a snapshot and
/// the fixed rubric; recomputing on an unchanged snapshot yields an
/// identical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessResult {
    /// 0–100.
    pub score: u32,
    pub breakdown: BTreeMap<Section, SectionScore>,
    /// Top 5 recommendations by impact.
    pub recommendations: Vec<Recommendation>,
    /// Full list, impact descending, ties in rubric order.
    pub all_recommendations: Vec<Recommendation>,
    pub is_optimized: bool,
    pub level: Level,
}

/// AI recommendations normalized into fixed priority buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedRecommendations {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

/// Output of the quality normalizer. Invariant: `content_score ≤ score_cap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    /// 0.0–10.0, one decimal.
    pub content_score: f64,
    /// Raw AI scores, keyed by the section names the AI returned.
    pub section_scores: BTreeMap<String, f64>,
    /// Structural ceiling derived from the snapshot alone.
    pub score_cap: f64,
    pub recommendations: PrioritizedRecommendations,
    pub insights: Vec<String>,
}

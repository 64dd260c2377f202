//! Profile snapshot — structured per-section facts about a subject at one
//! point in time. Built fresh each analysis run from extractor output and
//! immutable afterwards: a section that fails extraction gets a degraded
//! record, never a missing key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A profile section known to the pipeline.
///
/// Variant order is the canonical rubric order — recommendation tie-breaks
/// and map iteration both rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Photo,
    Headline,
    About,
    Experience,
    Skills,
    Education,
    Recommendations,
    Certifications,
    Projects,
    Featured,
    Connections,
}

impl Section {
    /// Every section the scanner probes.
    pub const ALL: &'static [Section] = &[
        Section::Photo,
        Section::Headline,
        Section::About,
        Section::Experience,
        Section::Skills,
        Section::Education,
        Section::Recommendations,
        Section::Certifications,
        Section::Projects,
        Section::Featured,
        Section::Connections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Photo => "photo",
            Section::Headline => "headline",
            Section::About => "about",
            Section::Experience => "experience",
            Section::Skills => "skills",
            Section::Education => "education",
            Section::Recommendations => "recommendations",
            Section::Certifications => "certifications",
            Section::Projects => "projects",
            Section::Featured => "featured",
            Section::Connections => "connections",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts extracted for a single section.
///
/// `text` and `items` are only populated by deep extraction; the shallow
/// pass fills existence, counts, and the derived signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_count: Option<u32>,
    /// Set on degraded records when extraction exhausted its retries.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_current_role: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_generic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl SectionRecord {
    /// Record for a section the scanner found absent.
    pub fn missing() -> Self {
        SectionRecord::default()
    }

    /// Degraded record for a section whose extraction failed every attempt.
    pub fn degraded(attempts: u32) -> Self {
        SectionRecord {
            exists: false,
            error: true,
            attempts: Some(attempts),
            ..SectionRecord::default()
        }
    }

    pub fn has_content(&self) -> bool {
        self.exists && (self.count.unwrap_or(0) > 0 || self.char_count.unwrap_or(0) > 0)
    }
}

/// Per-section facts for one subject, captured by a single analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub subject_id: String,
    pub sections: BTreeMap<Section, SectionRecord>,
    pub captured_at: DateTime<Utc>,
}

impl ProfileSnapshot {
    pub fn new(subject_id: impl Into<String>, sections: BTreeMap<Section, SectionRecord>) -> Self {
        ProfileSnapshot {
            subject_id: subject_id.into(),
            sections,
            captured_at: Utc::now(),
        }
    }

    pub fn section(&self, section: Section) -> Option<&SectionRecord> {
        self.sections.get(&section)
    }

    pub fn exists(&self, section: Section) -> bool {
        self.section(section).map(|r| r.exists).unwrap_or(false)
    }

    /// Count for a section, 0 when absent or uncounted.
    pub fn count(&self, section: Section) -> u32 {
        self.section(section)
            .and_then(|r| r.count)
            .unwrap_or(0)
    }

    /// Character count for a section, 0 when absent or unmeasured.
    pub fn char_count(&self, section: Section) -> u32 {
        self.section(section)
            .and_then(|r| r.char_count)
            .unwrap_or(0)
    }

    pub fn has_content(&self, section: Section) -> bool {
        self.section(section).map(|r| r.has_content()).unwrap_or(false)
    }
}

/// Caller-supplied analysis settings. All fields participate in the cache
/// fingerprint, so changing any of them invalidates prior analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    /// Whether to request the AI quality analysis after completeness scoring.
    #[serde(default = "default_quality")]
    pub quality: bool,
}

fn default_quality() -> bool {
    true
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            target_role: None,
            seniority_level: None,
            custom_instructions: None,
            quality: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_serializes_snake_case() {
        let json = serde_json::to_string(&Section::Recommendations).unwrap();
        assert_eq!(json, "\"recommendations\"");
    }

    #[test]
    fn test_degraded_record_shape() {
        let rec = SectionRecord::degraded(3);
        assert!(!rec.exists);
        assert!(rec.error);
        assert_eq!(rec.attempts, Some(3));
    }

    #[test]
    fn test_has_content_requires_existence() {
        let rec = SectionRecord {
            exists: false,
            count: Some(5),
            ..SectionRecord::default()
        };
        assert!(!rec.has_content());
    }

    #[test]
    fn test_snapshot_counts_default_to_zero() {
        let snapshot = ProfileSnapshot::new("subject", BTreeMap::new());
        assert_eq!(snapshot.count(Section::Experience), 0);
        assert_eq!(snapshot.char_count(Section::About), 0);
        assert!(!snapshot.exists(Section::Photo));
    }

    #[test]
    fn test_settings_default_enables_quality() {
        let settings = AnalysisSettings::default();
        assert!(settings.quality);
        assert!(settings.target_role.is_none());
    }

    #[test]
    fn test_settings_deserialize_empty_object() {
        let settings: AnalysisSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.quality);
    }
}

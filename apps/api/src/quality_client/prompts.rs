// All prompt constants for the quality analysis call.

use crate::quality_client::{QualityError, QualityRequest};

/// System prompt — enforces JSON-only output.
pub const QUALITY_SYSTEM: &str =
    "You are an expert career coach reviewing a professional profile. \
    Score the writing quality of each provided section. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Quality analysis prompt template. Replace `{payload}` before sending.
pub const QUALITY_PROMPT_TEMPLATE: &str = r#"Review the professional profile below and score the quality of each section's content.

Score each section 0-10 for clarity, specificity, and impact. Do not reward length alone; reward concrete outcomes over generic claims. Take the target role and seniority level into account when they are present in the settings.

Return a JSON object with this EXACT schema (no extra fields):
{
  "contentScore": 7.5,
  "sectionScores": {
    "about": 8.0,
    "experience": 7.0
  },
  "recommendations": {
    "critical": ["..."],
    "high": ["..."],
    "medium": ["..."],
    "low": ["..."]
  },
  "insights": ["..."]
}

Only include sections you were given content for in "sectionScores".

Profile payload:
{payload}"#;

/// Builds the full quality prompt from a request.
pub fn build_quality_prompt(request: &QualityRequest) -> Result<String, QualityError> {
    let payload = serde_json::to_string_pretty(request)?;
    Ok(QUALITY_PROMPT_TEMPLATE.replace("{payload}", &payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{AnalysisSettings, ProfileSnapshot, Section, SectionRecord};
    use std::collections::BTreeMap;

    #[test]
    fn test_prompt_embeds_section_payload() {
        let mut excerpt = BTreeMap::new();
        excerpt.insert(
            Section::About,
            SectionRecord {
                exists: true,
                char_count: Some(900),
                text: Some("Seasoned platform engineer".to_string()),
                ..SectionRecord::default()
            },
        );

        let request = QualityRequest {
            subject_id: "subject-1".to_string(),
            snapshot_excerpt: excerpt,
            completeness_result: crate::analysis::rubric::calculate(&ProfileSnapshot::new(
                "subject-1",
                BTreeMap::new(),
            )),
            settings: AnalysisSettings::default(),
            force_refresh: false,
        };

        let prompt = build_quality_prompt(&request).unwrap();
        assert!(prompt.contains("Seasoned platform engineer"));
        assert!(prompt.contains("sectionScores"));
        assert!(!prompt.contains("{payload}"));
    }
}

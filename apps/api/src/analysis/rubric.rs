//! Completeness Engine — scores a profile snapshot against the fixed rubric.
//!
//! Pure and deterministic: no I/O, no clock, no randomness. The rubric is
//! data — a tagged list of `{section, weight, predicate, message}` records —
//! so thresholds are table-driven and testable in isolation. This engine
//! cannot fail at runtime: a malformed or absent section simply scores as
//! failed.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::analysis::{
    CompletenessResult, Level, Priority, Recommendation, SectionScore,
};
use crate::models::snapshot::{ProfileSnapshot, Section, SectionRecord};

/// Score at or above which a profile counts as optimized.
const OPTIMIZED_THRESHOLD: u32 = 85;

/// How many recommendations are surfaced as primary.
const PRIMARY_RECOMMENDATION_LIMIT: usize = 5;

/// One rubric line: a section, its weight, the pass predicate, and the
/// message generator used when the section fails.
pub struct RubricRule {
    pub section: Section,
    pub weight: u32,
    pub predicate: fn(&SectionRecord) -> bool,
    pub message: fn(Option<&SectionRecord>) -> String,
}

/// The fixed rubric. Weights sum to exactly 100; order is the canonical
/// tie-break order for recommendations.
pub const RUBRIC: &[RubricRule] = &[
    RubricRule {
        section: Section::Photo,
        weight: 5,
        predicate: |r| r.exists,
        message: |_| "Add a profile photo — profiles with photos get far more views".to_string(),
    },
    RubricRule {
        section: Section::Headline,
        weight: 10,
        predicate: |r| r.exists && r.char_count.unwrap_or(0) >= 40,
        message: |r| match r.and_then(|r| r.char_count) {
            Some(n) if n > 0 => format!(
                "Expand your headline to at least 40 characters (currently {n})"
            ),
            _ => "Write a headline that says what you do and for whom".to_string(),
        },
    },
    RubricRule {
        section: Section::About,
        weight: 20,
        predicate: |r| r.exists && r.char_count.unwrap_or(0) >= 800,
        message: |r| match r.and_then(|r| r.char_count) {
            Some(n) if n > 0 => format!(
                "Expand your about section to at least 800 characters (currently {n})"
            ),
            _ => "Write an about section — it carries the most weight after experience"
                .to_string(),
        },
    },
    RubricRule {
        section: Section::Experience,
        weight: 25,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 2,
        message: |r| match r.and_then(|r| r.count) {
            Some(n) if n > 0 => format!("List at least 2 positions (currently {n})"),
            _ => "Add your work experience — the highest-impact section".to_string(),
        },
    },
    RubricRule {
        section: Section::Skills,
        weight: 15,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 15,
        message: |r| match r.and_then(|r| r.count) {
            Some(n) if n > 0 => format!("Add at least 15 skills (currently {n})"),
            _ => "Add skills so searches and screens can find you".to_string(),
        },
    },
    RubricRule {
        section: Section::Education,
        weight: 10,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 1,
        message: |_| "Add your education history".to_string(),
    },
    RubricRule {
        section: Section::Recommendations,
        weight: 10,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 1,
        message: |_| "Request a recommendation from a colleague or manager".to_string(),
    },
    RubricRule {
        section: Section::Certifications,
        weight: 3,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 1,
        message: |_| "Add a certification to strengthen credibility".to_string(),
    },
    RubricRule {
        section: Section::Projects,
        weight: 2,
        predicate: |r| r.exists && r.count.unwrap_or(0) >= 1,
        message: |_| "Showcase at least one project".to_string(),
    },
];

fn priority_for(record: Option<&SectionRecord>, weight: u32) -> Priority {
    // Absent from the snapshot entirely → always high.
    if record.is_none() {
        return Priority::High;
    }
    match weight {
        w if w >= 15 => Priority::High,
        w if w >= 5 => Priority::Medium,
        _ => Priority::Low,
    }
}

/// Scores a snapshot against the rubric.
pub fn calculate(snapshot: &ProfileSnapshot) -> CompletenessResult {
    let mut breakdown = BTreeMap::new();
    let mut all_recommendations = Vec::new();
    let mut earned_total = 0u32;

    for rule in RUBRIC {
        let record = snapshot.section(rule.section);
        let passed = record.map(|r| (rule.predicate)(r)).unwrap_or(false);
        let earned = if passed { rule.weight } else { 0 };
        earned_total += earned;

        breakdown.insert(
            rule.section,
            SectionScore {
                weight: rule.weight,
                earned,
                passed,
            },
        );

        if !passed {
            all_recommendations.push(Recommendation {
                section: rule.section,
                priority: priority_for(record, rule.weight),
                message: (rule.message)(record),
                impact: rule.weight,
            });
        }
    }

    // Stable sort: equal impacts keep rubric order.
    all_recommendations.sort_by(|a, b| b.impact.cmp(&a.impact));

    let score = earned_total;
    debug!(subject_id = %snapshot.subject_id, score, "completeness calculated");

    CompletenessResult {
        score,
        breakdown,
        recommendations: all_recommendations
            .iter()
            .take(PRIMARY_RECOMMENDATION_LIMIT)
            .cloned()
            .collect(),
        all_recommendations,
        is_optimized: score >= OPTIMIZED_THRESHOLD,
        level: Level::from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(exists: bool, count: Option<u32>, char_count: Option<u32>) -> SectionRecord {
        SectionRecord {
            exists,
            count,
            char_count,
            ..SectionRecord::default()
        }
    }

    fn snapshot_from(sections: Vec<(Section, SectionRecord)>) -> ProfileSnapshot {
        ProfileSnapshot::new("subject-1", sections.into_iter().collect())
    }

    /// Scenario A from the design: everything passes except certifications
    /// and projects.
    fn strong_snapshot() -> ProfileSnapshot {
        snapshot_from(vec![
            (Section::Photo, record(true, None, None)),
            (Section::Headline, record(true, None, Some(120))),
            (Section::About, record(true, None, Some(900))),
            (Section::Experience, record(true, Some(3), None)),
            (Section::Skills, record(true, Some(20), None)),
            (Section::Education, record(true, Some(1), None)),
            (Section::Recommendations, record(true, Some(2), None)),
            (Section::Certifications, record(true, Some(0), None)),
            (Section::Projects, record(true, Some(0), None)),
        ])
    }

    #[test]
    fn test_rubric_weights_sum_to_100() {
        let total: u32 = RUBRIC.iter().map(|r| r.weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_strong_profile_scores_95() {
        let result = calculate(&strong_snapshot());
        assert_eq!(result.score, 95);
        assert_eq!(result.level, Level::Excellent);
        assert!(result.is_optimized);

        let failing: Vec<Section> = result
            .all_recommendations
            .iter()
            .map(|r| r.section)
            .collect();
        assert_eq!(failing, vec![Section::Certifications, Section::Projects]);
        assert_eq!(result.all_recommendations[0].impact, 3);
        assert_eq!(result.all_recommendations[1].impact, 2);
    }

    #[test]
    fn test_empty_profile_scores_zero() {
        let result = calculate(&snapshot_from(vec![]));
        assert_eq!(result.score, 0);
        assert_eq!(result.level, Level::Poor);
        assert!(!result.is_optimized);
        assert_eq!(result.all_recommendations.len(), 9);

        // Impact descending; the 10-weight tie keeps rubric order.
        let order: Vec<Section> = result
            .all_recommendations
            .iter()
            .map(|r| r.section)
            .collect();
        assert_eq!(
            order,
            vec![
                Section::Experience,
                Section::About,
                Section::Skills,
                Section::Headline,
                Section::Education,
                Section::Recommendations,
                Section::Photo,
                Section::Certifications,
                Section::Projects,
            ]
        );

        // Absent sections are always high priority.
        assert!(result
            .all_recommendations
            .iter()
            .all(|r| r.priority == Priority::High));
    }

    #[test]
    fn test_primary_recommendations_capped_at_five() {
        let result = calculate(&snapshot_from(vec![]));
        assert_eq!(result.recommendations.len(), 5);
        assert_eq!(result.recommendations[0].section, Section::Experience);
    }

    #[test]
    fn test_breakdown_weights_cover_rubric() {
        let result = calculate(&snapshot_from(vec![]));
        let total: u32 = result.breakdown.values().map(|s| s.weight).sum();
        assert_eq!(total, 100);
        assert_eq!(result.breakdown.len(), 9);
    }

    #[test]
    fn test_monotonic_in_every_section() {
        // Flipping any single failing predicate to passing never decreases
        // the score.
        let passing: Vec<(Section, SectionRecord)> = vec![
            (Section::Photo, record(true, None, None)),
            (Section::Headline, record(true, None, Some(80))),
            (Section::About, record(true, None, Some(1000))),
            (Section::Experience, record(true, Some(3), None)),
            (Section::Skills, record(true, Some(20), None)),
            (Section::Education, record(true, Some(1), None)),
            (Section::Recommendations, record(true, Some(1), None)),
            (Section::Certifications, record(true, Some(1), None)),
            (Section::Projects, record(true, Some(1), None)),
        ];

        let base_score = calculate(&snapshot_from(vec![])).score;
        for (section, rec) in passing {
            let flipped = calculate(&snapshot_from(vec![(section, rec)]));
            assert!(
                flipped.score >= base_score,
                "flipping {section} decreased the score"
            );
        }
    }

    #[test]
    fn test_idempotent_on_unchanged_snapshot() {
        let snapshot = strong_snapshot();
        let first = serde_json::to_string(&calculate(&snapshot)).unwrap();
        let second = serde_json::to_string(&calculate(&snapshot)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_degraded_record_fails_with_weight_priority() {
        let result = calculate(&snapshot_from(vec![(
            Section::Experience,
            SectionRecord::degraded(3),
        )]));
        let rec = result
            .all_recommendations
            .iter()
            .find(|r| r.section == Section::Experience)
            .unwrap();
        // Present-but-degraded → priority derives from weight.
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.impact, 25);
    }

    #[test]
    fn test_about_threshold_is_800_chars() {
        let below = calculate(&snapshot_from(vec![(
            Section::About,
            record(true, None, Some(799)),
        )]));
        let at = calculate(&snapshot_from(vec![(
            Section::About,
            record(true, None, Some(800)),
        )]));
        assert_eq!(below.score, 0);
        assert_eq!(at.score, 20);
    }

    #[test]
    fn test_failing_message_includes_current_count() {
        let result = calculate(&snapshot_from(vec![(
            Section::Skills,
            record(true, Some(7), None),
        )]));
        let rec = result
            .all_recommendations
            .iter()
            .find(|r| r.section == Section::Skills)
            .unwrap();
        assert!(rec.message.contains('7'), "message was: {}", rec.message);
    }
}

//! Quality Normalizer — turns raw AI section scores into a `QualityResult`.
//!
//! Pure function of the AI response and the snapshot. The score cap is
//! derived from the snapshot alone, so nothing the AI returns can lift it:
//! an eloquent but structurally empty profile stays capped.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::models::analysis::{PrioritizedRecommendations, QualityResult};
use crate::models::snapshot::{ProfileSnapshot, Section};
use crate::quality_client::QualityResponse;

/// Aggregation weights for the sections the AI is asked to score.
/// Named weights sum to 0.95; anything else gets `OTHER_WEIGHT`.
const QUALITY_WEIGHTS: &[(&str, f64)] = &[
    ("about", 0.30),
    ("experience", 0.30),
    ("skills", 0.15),
    ("headline", 0.10),
    ("education", 0.05),
    ("photo", 0.05),
];

const OTHER_WEIGHT: f64 = 0.05;

fn weight_for(section: &str) -> f64 {
    QUALITY_WEIGHTS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, w)| *w)
        .unwrap_or(OTHER_WEIGHT)
}

/// Normalizes the external quality response against the snapshot.
pub fn normalize(response: &QualityResponse, snapshot: &ProfileSnapshot) -> QualityResult {
    let section_scores: BTreeMap<String, f64> = response
        .section_scores
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|(name, score)| (name, score.clamp(0.0, 10.0)))
        .collect();

    let cap = score_cap(snapshot);

    // Weighted mean over the sections actually scored, renormalized by the
    // weight used so unscored sections don't drag the average down. With no
    // section scores at all, fall back to the AI's own aggregate.
    let mean = if section_scores.is_empty() {
        response.content_score.unwrap_or(0.0).clamp(0.0, 10.0)
    } else {
        weighted_mean(&section_scores)
    };

    let rounded = (mean * 10.0).round() / 10.0;
    let content_score = rounded.min(cap);

    QualityResult {
        content_score,
        section_scores,
        score_cap: cap,
        recommendations: normalize_recommendations(response.recommendations.as_ref()),
        insights: normalize_insights(response.insights.as_ref()),
    }
}

fn weighted_mean(scores: &BTreeMap<String, f64>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_used = 0.0;
    for (section, score) in scores {
        let weight = weight_for(section);
        weighted_sum += score * weight;
        weight_used += weight;
    }
    if weight_used > 0.0 {
        weighted_sum / weight_used
    } else {
        0.0
    }
}

/// Structural ceiling on the quality score. Depends only on the snapshot,
/// never on AI-provided subscores.
pub fn score_cap(snapshot: &ProfileSnapshot) -> f64 {
    let mut cap = 10.0_f64;
    if !snapshot.exists(Section::About) || snapshot.char_count(Section::About) < 100 {
        cap = cap.min(7.0);
    }
    if !snapshot.exists(Section::Experience) || snapshot.count(Section::Experience) == 0 {
        cap = cap.min(6.0);
    }
    if !snapshot.exists(Section::Skills) || snapshot.count(Section::Skills) < 5 {
        cap = cap.min(8.0);
    }
    if !snapshot.exists(Section::Headline) || snapshot.char_count(Section::Headline) < 30 {
        cap = cap.min(8.0);
    }
    cap
}

/// Sorts AI recommendations into the four priority buckets. Recognized
/// shape: an object keyed by priority, each holding a list. Anything else
/// (a flat list, a bare string, unknown keys) lands in "high" rather than
/// being discarded.
fn normalize_recommendations(value: Option<&Value>) -> PrioritizedRecommendations {
    let mut buckets = PrioritizedRecommendations::default();
    let Some(value) = value else {
        return buckets;
    };

    match value {
        Value::Object(map) => {
            for (key, entries) in map {
                let items = collect_items(entries);
                match key.as_str() {
                    "critical" => buckets.critical.extend(items),
                    "high" => buckets.high.extend(items),
                    "medium" => buckets.medium.extend(items),
                    "low" => buckets.low.extend(items),
                    other => {
                        warn!(bucket = other, "unrecognized recommendation bucket, defaulting to high");
                        buckets.high.extend(items);
                    }
                }
            }
        }
        other => {
            warn!("unrecognized recommendation shape, defaulting to high");
            buckets.high.extend(collect_items(other));
        }
    }
    buckets
}

fn normalize_insights(value: Option<&Value>) -> Vec<String> {
    value.map(collect_items).unwrap_or_default()
}

/// Flattens a value into display strings: strings pass through, objects
/// yield their `message`/`text` field or their compact JSON, arrays recurse.
fn collect_items(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(collect_items).collect(),
        Value::Object(map) => {
            let text = map
                .get("message")
                .or_else(|| map.get("text"))
                .and_then(Value::as_str);
            match text {
                Some(t) => vec![t.to_string()],
                None => vec![value.to_string()],
            }
        }
        Value::Null => vec![],
        other => vec![other.to_string()],
    }
}

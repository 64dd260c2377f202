use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::cache::CacheLookup;
use crate::analysis::session::{AnalysisOutcome, AnalysisSession};
use crate::errors::AppError;
use crate::models::analysis::{CompletenessResult, QualityResult};
use crate::models::snapshot::AnalysisSettings;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub settings: AnalysisSettings,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct CachedAnalysisResponse {
    pub subject_id: String,
    pub timestamp: DateTime<Utc>,
    pub completeness: CompletenessResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityResult>,
}

/// POST /api/v1/analysis/:subject_id
///
/// Runs the full pipeline for a subject. Returns 409 if a run is already
/// in flight and 429 when re-triggered inside the throttle window. An
/// `error`-phase outcome is still a 200 — it carries the best available
/// completeness payload.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    if subject_id.trim().is_empty() {
        return Err(AppError::Validation("subject id must not be blank".to_string()));
    }

    let _active = state
        .guards
        .try_begin(&subject_id, state.config.trigger_throttle)
        .map_err(|rejection| AppError::from_guard(rejection, &subject_id))?;

    let mut session = AnalysisSession::new(subject_id, req.force_refresh);
    let outcome = state.orchestrator.run(&mut session, &req.settings).await;
    Ok(Json(outcome))
}

/// GET /api/v1/analysis/:subject_id
///
/// Returns the cached analysis for a subject, preferring the AI-backed
/// entry. 404 when nothing is cached.
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<CachedAnalysisResponse>, AppError> {
    match state.cache.lookup(&subject_id).await? {
        CacheLookup::AiBacked(entry) => Ok(Json(CachedAnalysisResponse {
            subject_id: entry.subject_id,
            timestamp: entry.timestamp,
            completeness: entry.completeness,
            quality: Some(entry.quality),
        })),
        CacheLookup::CompletenessOnly(entry) => Ok(Json(CachedAnalysisResponse {
            subject_id: entry.subject_id,
            timestamp: entry.timestamp,
            completeness: entry.completeness,
            quality: None,
        })),
        CacheLookup::Absent => Err(AppError::NotFound(format!(
            "no cached analysis for {subject_id}"
        ))),
    }
}

/// DELETE /api/v1/analysis/:subject_id
///
/// Clears both cached entry variants for a subject.
pub async fn handle_clear_analysis(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.cache.clear(&subject_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_gets_default_settings() {
        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.settings.quality);
        assert!(!req.force_refresh);
    }

    #[test]
    fn test_request_with_settings() {
        let req: AnalyzeRequest = serde_json::from_str(
            r#"{"settings": {"target_role": "staff engineer", "quality": false}, "force_refresh": true}"#,
        )
        .unwrap();
        assert_eq!(req.settings.target_role.as_deref(), Some("staff engineer"));
        assert!(!req.settings.quality);
        assert!(req.force_refresh);
    }
}

//! Analysis session state and the per-subject run guard.
//!
//! An `AnalysisSession` is an explicit value owned by the caller for the
//! duration of one orchestration run — there is no ambient global state.
//! The guard registry lives in `AppState` and prevents overlapping runs
//! for the same subject while throttling rapid re-triggers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::analysis::{CompletenessResult, QualityResult};
use crate::models::snapshot::Section;

/// Minimum spacing between analysis triggers for one subject, absorbing
/// duplicate triggers from the calling environment.
pub const TRIGGER_THROTTLE: Duration = Duration::from_secs(5);

/// Pipeline phases, in execution order. `Error` is reachable from any
/// phase; `Recovery` runs before `Error` is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scan,
    Extract,
    Calculate,
    DeepExtract,
    QualityRequest,
    Complete,
    Recovery,
    Error,
}

/// Ephemeral state for one orchestration run. Never persisted; dropped
/// when the run ends regardless of outcome.
#[derive(Debug)]
pub struct AnalysisSession {
    pub run_id: Uuid,
    pub subject_id: String,
    pub phase: Phase,
    /// Attempts used per section during EXTRACT.
    pub retry_counts: BTreeMap<Section, u32>,
    pub force_refresh: bool,
    pub last_completeness: Option<CompletenessResult>,
}

impl AnalysisSession {
    pub fn new(subject_id: impl Into<String>, force_refresh: bool) -> Self {
        AnalysisSession {
            run_id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            phase: Phase::Scan,
            retry_counts: BTreeMap::new(),
            force_refresh,
            last_completeness: None,
        }
    }
}

/// What one run hands back to the caller. An `Error` phase still carries
/// the best completeness data recovery could produce.
#[derive(Debug, Serialize)]
pub struct AnalysisOutcome {
    pub run_id: Uuid,
    pub subject_id: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityResult>,
    pub from_cache: bool,
    pub ai_error: bool,
    pub ai_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisOutcome {
    pub fn new(session: &AnalysisSession) -> Self {
        AnalysisOutcome {
            run_id: session.run_id,
            subject_id: session.subject_id.clone(),
            phase: session.phase,
            completeness: None,
            quality: None,
            from_cache: false,
            ai_error: false,
            ai_disabled: false,
            error: None,
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardRejection {
    #[error("an analysis is already running for this subject")]
    Busy,
    #[error("analysis re-triggered too soon, try again shortly")]
    Throttled,
}

#[derive(Debug)]
struct GuardSlot {
    extracting: bool,
    last_trigger: Instant,
}

/// Per-subject run guards. One live analysis per subject; triggers within
/// the throttle window are rejected.
#[derive(Debug, Default)]
pub struct SessionGuards {
    slots: Mutex<HashMap<String, GuardSlot>>,
}

impl SessionGuards {
    /// Claims the guard for a subject. The returned token releases the
    /// `extracting` flag on drop; the throttle timestamp stays behind.
    pub fn try_begin(
        &self,
        subject_id: &str,
        throttle: Duration,
    ) -> Result<ActiveAnalysis<'_>, GuardRejection> {
        let mut slots = self.slots.lock().expect("session guard lock poisoned");
        if let Some(slot) = slots.get_mut(subject_id) {
            if slot.extracting {
                return Err(GuardRejection::Busy);
            }
            if slot.last_trigger.elapsed() < throttle {
                return Err(GuardRejection::Throttled);
            }
            slot.extracting = true;
            slot.last_trigger = Instant::now();
        } else {
            slots.insert(
                subject_id.to_string(),
                GuardSlot {
                    extracting: true,
                    last_trigger: Instant::now(),
                },
            );
        }
        Ok(ActiveAnalysis {
            guards: self,
            subject_id: subject_id.to_string(),
        })
    }

    fn finish(&self, subject_id: &str) {
        let mut slots = self.slots.lock().expect("session guard lock poisoned");
        if let Some(slot) = slots.get_mut(subject_id) {
            slot.extracting = false;
        }
    }
}

/// Guard token for a running analysis.
#[derive(Debug)]
pub struct ActiveAnalysis<'a> {
    guards: &'a SessionGuards,
    subject_id: String,
}

impl Drop for ActiveAnalysis<'_> {
    fn drop(&mut self) {
        self.guards.finish(&self.subject_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_concurrent_run_rejected_busy() {
        let guards = SessionGuards::default();
        let active = guards.try_begin("subject-1", Duration::ZERO).unwrap();
        assert_eq!(
            guards.try_begin("subject-1", Duration::ZERO).unwrap_err(),
            GuardRejection::Busy
        );
        drop(active);
        // Released; zero throttle lets the next run through.
        assert!(guards.try_begin("subject-1", Duration::ZERO).is_ok());
    }

    #[test]
    fn test_rapid_retrigger_throttled() {
        let guards = SessionGuards::default();
        let active = guards.try_begin("subject-1", TRIGGER_THROTTLE).unwrap();
        drop(active);
        assert_eq!(
            guards
                .try_begin("subject-1", TRIGGER_THROTTLE)
                .unwrap_err(),
            GuardRejection::Throttled
        );
    }

    #[test]
    fn test_guard_is_per_subject() {
        let guards = SessionGuards::default();
        let _a = guards.try_begin("subject-1", TRIGGER_THROTTLE).unwrap();
        assert!(guards.try_begin("subject-2", TRIGGER_THROTTLE).is_ok());
    }

    #[test]
    fn test_session_resets_per_run() {
        let session = AnalysisSession::new("subject-1", true);
        assert_eq!(session.phase, Phase::Scan);
        assert!(session.retry_counts.is_empty());
        assert!(session.force_refresh);
        assert!(session.last_completeness.is_none());
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::QualityRequest).unwrap(),
            "\"quality_request\""
        );
        assert_eq!(
            serde_json::to_string(&Phase::DeepExtract).unwrap(),
            "\"deep_extract\""
        );
    }
}

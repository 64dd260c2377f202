//! Analysis Orchestrator — drives one run through the phase sequence
//! SCAN → EXTRACT → CALCULATE → DEEP_EXTRACT → QUALITY_REQUEST → COMPLETE.
//!
//! This is the only stateful, side-effecting component in the pipeline.
//! Phases execute strictly in order: CALCULATE never starts before every
//! EXTRACT attempt has resolved, even when some sections degrade. Within
//! SCAN the per-section probes race each other under one ceiling, with no
//! ordering guarantee among themselves.
//!
//! Failure posture: section problems degrade records, the quality call is
//! best-effort, and anything genuinely fatal goes through RECOVERY before
//! an ERROR outcome is surfaced — the caller never loses previously-known
//! completeness data.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::analysis::cache::{self, CacheError, CacheLookup, ProfileCache};
use crate::analysis::quality;
use crate::analysis::retry::{retry_with_backoff, RetryPolicy, Sleeper};
use crate::analysis::rubric;
use crate::analysis::session::{AnalysisOutcome, AnalysisSession, Phase};
use crate::extraction::{ScanProbe, SectionExtractor};
use crate::models::snapshot::{AnalysisSettings, ProfileSnapshot, Section, SectionRecord};
use crate::quality_client::{QualityAnalyzer, QualityRequest};

/// Ceiling on the concurrent SCAN phase. Sections unresolved when it
/// fires are treated as not existing.
pub const SCAN_CEILING: Duration = Duration::from_secs(5);

/// Upper bound on the number of sections deep-extracted for the quality
/// request, bounding the payload sent downstream.
const MAX_DEEP_SECTIONS: usize = 6;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),
}

pub struct Orchestrator {
    extractor: Arc<dyn SectionExtractor>,
    quality: Arc<dyn QualityAnalyzer>,
    cache: ProfileCache,
    sleeper: Arc<dyn Sleeper>,
    retry_policy: RetryPolicy,
    scan_ceiling: Duration,
}

impl Orchestrator {
    /// The sleeper is injected so tests can drive the retry backoff
    /// without real delays.
    pub fn new(
        extractor: Arc<dyn SectionExtractor>,
        quality: Arc<dyn QualityAnalyzer>,
        cache: ProfileCache,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Orchestrator {
            extractor,
            quality,
            cache,
            sleeper,
            retry_policy: RetryPolicy::default(),
            scan_ceiling: SCAN_CEILING,
        }
    }

    /// Runs one full analysis. Never returns a bare error: fatal failures
    /// go through recovery and come back as an `Error`-phase outcome that
    /// still carries the best available completeness payload.
    pub async fn run(
        &self,
        session: &mut AnalysisSession,
        settings: &AnalysisSettings,
    ) -> AnalysisOutcome {
        match self.run_phases(session, settings).await {
            Ok(outcome) => outcome,
            Err(err) => self.recover(session, err).await,
        }
    }

    async fn run_phases(
        &self,
        session: &mut AnalysisSession,
        settings: &AnalysisSettings,
    ) -> Result<AnalysisOutcome, PipelineError> {
        info!(
            subject_id = %session.subject_id,
            run_id = %session.run_id,
            force_refresh = session.force_refresh,
            "analysis started"
        );

        session.phase = Phase::Scan;
        let probes = self.scan_all(&session.subject_id).await;

        session.phase = Phase::Extract;
        let snapshot = self.extract_all(session, &probes).await;

        // Change-detection gate: an AI-backed entry whose fingerprint still
        // matches short-circuits the rest of the pipeline.
        let lookup = self.cache.lookup(&session.subject_id).await?;
        if cache::is_valid(&lookup, &snapshot, settings, session.force_refresh) {
            if let CacheLookup::AiBacked(entry) = lookup {
                info!(subject_id = %session.subject_id, "profile unchanged, serving cached analysis");
                session.phase = Phase::Complete;
                let mut outcome = AnalysisOutcome::new(session);
                outcome.completeness = Some(entry.completeness);
                outcome.quality = Some(entry.quality);
                outcome.from_cache = true;
                return Ok(outcome);
            }
        }

        session.phase = Phase::Calculate;
        let completeness = rubric::calculate(&snapshot);
        session.last_completeness = Some(completeness.clone());

        // Persist completeness immediately — it must survive even if
        // everything downstream fails.
        if let Err(err) = self
            .cache
            .save_completeness_only(&session.subject_id, &completeness)
            .await
        {
            warn!(%err, "failed to cache completeness result, continuing");
        }

        if !settings.quality || !self.quality.is_enabled() {
            session.phase = Phase::Complete;
            let mut outcome = AnalysisOutcome::new(session);
            outcome.completeness = Some(completeness);
            outcome.ai_disabled = true;
            return Ok(outcome);
        }

        session.phase = Phase::DeepExtract;
        let selected = select_deep_sections(&snapshot, settings);
        let excerpt = self
            .deep_extract(&session.subject_id, &snapshot, &selected)
            .await;

        session.phase = Phase::QualityRequest;
        let request = QualityRequest {
            subject_id: session.subject_id.clone(),
            snapshot_excerpt: excerpt,
            completeness_result: completeness.clone(),
            settings: settings.clone(),
            force_refresh: session.force_refresh,
        };

        let mut outcome = match self.quality.analyze(&request).await {
            Ok(response) if response.is_disabled() => {
                info!(subject_id = %session.subject_id, "quality analysis unavailable");
                let mut outcome = AnalysisOutcome::new(session);
                outcome.ai_disabled = true;
                outcome
            }
            Ok(response) => {
                let quality = quality::normalize(&response, &snapshot);
                if let Err(err) = self
                    .cache
                    .save(
                        &session.subject_id,
                        &snapshot,
                        settings,
                        &completeness,
                        &quality,
                    )
                    .await
                {
                    warn!(%err, "failed to cache full analysis, continuing");
                }
                let mut outcome = AnalysisOutcome::new(session);
                outcome.quality = Some(quality);
                outcome
            }
            // Quality is best-effort: a failed call completes the run with
            // completeness only, it does not raise ERROR.
            Err(err) => {
                warn!(%err, "quality analysis failed, completing with completeness only");
                let mut outcome = AnalysisOutcome::new(session);
                outcome.ai_error = true;
                outcome
            }
        };

        session.phase = Phase::Complete;
        outcome.phase = Phase::Complete;
        outcome.completeness = Some(completeness);
        Ok(outcome)
    }

    /// Launches one lightweight probe per known section concurrently and
    /// races the combined result against the scan ceiling. Probe errors
    /// and unresolved sections both degrade to "does not exist".
    async fn scan_all(&self, subject_id: &str) -> BTreeMap<Section, ScanProbe> {
        let mut tasks = JoinSet::new();
        for &section in Section::ALL {
            let extractor = Arc::clone(&self.extractor);
            let subject = subject_id.to_string();
            tasks.spawn(async move { (section, extractor.scan(&subject, section).await) });
        }

        let mut probes: BTreeMap<Section, ScanProbe> = BTreeMap::new();
        let drained = tokio::time::timeout(self.scan_ceiling, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((section, Ok(probe))) => {
                        probes.insert(section, probe);
                    }
                    Ok((section, Err(err))) => {
                        warn!(section = %section, %err, "scan probe failed, treating as missing");
                        probes.insert(section, ScanProbe::missing());
                    }
                    Err(err) => {
                        warn!(%err, "scan task aborted");
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                subject_id,
                ceiling_ms = self.scan_ceiling.as_millis() as u64,
                "scan ceiling hit, unresolved sections treated as missing"
            );
            tasks.abort_all();
        }

        for &section in Section::ALL {
            probes.entry(section).or_insert_with(ScanProbe::missing);
        }
        probes
    }

    /// Full extraction for every section SCAN flagged as existing, with
    /// bounded retry per section. Exhausted retries degrade the record and
    /// the run continues — a single bad section never aborts the phase.
    async fn extract_all(
        &self,
        session: &mut AnalysisSession,
        probes: &BTreeMap<Section, ScanProbe>,
    ) -> ProfileSnapshot {
        let subject_id = session.subject_id.clone();
        let mut sections = BTreeMap::new();

        for &section in Section::ALL {
            let exists = probes.get(&section).map(|p| p.exists).unwrap_or(false);
            if !exists {
                sections.insert(section, SectionRecord::missing());
                continue;
            }

            let mut attempts_used = 0u32;
            let result = retry_with_backoff(
                &self.retry_policy,
                self.sleeper.as_ref(),
                section.as_str(),
                |attempt| {
                    attempts_used = attempt;
                    self.extractor.extract(&subject_id, section)
                },
            )
            .await;
            session.retry_counts.insert(section, attempts_used);

            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    warn!(section = %section, %err, "extraction degraded after retries");
                    SectionRecord::degraded(attempts_used)
                }
            };
            sections.insert(section, record);
        }

        ProfileSnapshot::new(subject_id, sections)
    }

    /// Deep extraction for the selected sections. A failed deep read falls
    /// back to the section's shallow record.
    async fn deep_extract(
        &self,
        subject_id: &str,
        snapshot: &ProfileSnapshot,
        selected: &[Section],
    ) -> BTreeMap<Section, SectionRecord> {
        let mut excerpt = BTreeMap::new();
        for &section in selected {
            let record = match self.extractor.extract_deep(subject_id, section).await {
                Ok(deep) => deep,
                Err(err) => {
                    warn!(section = %section, %err, "deep extraction failed, using shallow record");
                    snapshot.section(section).cloned().unwrap_or_default()
                }
            };
            excerpt.insert(section, record);
        }
        excerpt
    }

    /// Last-resort path for an otherwise-uncaught failure: serve any
    /// cached entry, else recompute completeness from an existence-only
    /// scan. Either way the surfaced ERROR outcome carries the best
    /// completeness data available.
    async fn recover(&self, session: &mut AnalysisSession, err: PipelineError) -> AnalysisOutcome {
        warn!(
            subject_id = %session.subject_id,
            %err,
            "pipeline failure, attempting recovery"
        );
        session.phase = Phase::Recovery;

        // Completeness computed earlier in this run is fresher than
        // anything cached.
        if let Some(completeness) = session.last_completeness.clone() {
            session.phase = Phase::Error;
            let mut outcome = AnalysisOutcome::new(session);
            outcome.completeness = Some(completeness);
            outcome.error = Some(err.to_string());
            return outcome;
        }

        match self.cache.lookup(&session.subject_id).await {
            Ok(CacheLookup::AiBacked(entry)) => {
                session.phase = Phase::Error;
                let mut outcome = AnalysisOutcome::new(session);
                outcome.completeness = Some(entry.completeness);
                outcome.quality = Some(entry.quality);
                outcome.from_cache = true;
                outcome.error = Some(err.to_string());
                return outcome;
            }
            Ok(CacheLookup::CompletenessOnly(entry)) => {
                session.phase = Phase::Error;
                let mut outcome = AnalysisOutcome::new(session);
                outcome.completeness = Some(entry.completeness);
                outcome.from_cache = true;
                outcome.error = Some(err.to_string());
                return outcome;
            }
            Ok(CacheLookup::Absent) => {}
            Err(lookup_err) => {
                warn!(%lookup_err, "recovery cache lookup failed");
            }
        }

        // Minimal existence-only extraction, then recompute completeness.
        let probes = self.scan_all(&session.subject_id).await;
        let sections = probes
            .into_iter()
            .map(|(section, probe)| {
                (
                    section,
                    SectionRecord {
                        exists: probe.exists,
                        count: probe.visible_count,
                        ..SectionRecord::default()
                    },
                )
            })
            .collect();
        let snapshot = ProfileSnapshot::new(session.subject_id.clone(), sections);
        let completeness = rubric::calculate(&snapshot);
        session.last_completeness = Some(completeness.clone());

        session.phase = Phase::Error;
        let mut outcome = AnalysisOutcome::new(session);
        outcome.completeness = Some(completeness);
        outcome.error = Some(err.to_string());
        outcome
    }
}

/// Picks the sections worth deep-extracting, in priority order:
/// content-bearing sections first, then role-driven additions, then any
/// remaining section with content, bounded by `MAX_DEEP_SECTIONS`.
/// Photo and connections carry no reviewable text and are skipped.
pub fn select_deep_sections(
    snapshot: &ProfileSnapshot,
    settings: &AnalysisSettings,
) -> Vec<Section> {
    const CONTENT_FIRST: &[Section] = &[Section::About, Section::Experience, Section::Skills];
    const ENGINEERING_HINTS: &[&str] = &["engineer", "developer", "architect", "technical"];
    const MANAGEMENT_HINTS: &[&str] = &["manager", "director", "lead", "executive", "head"];

    let mut selected = Vec::new();

    for &section in CONTENT_FIRST {
        if snapshot.has_content(section) {
            push_unique(&mut selected, section);
        }
    }

    if let Some(role) = settings.target_role.as_deref() {
        let role = role.to_lowercase();
        if ENGINEERING_HINTS.iter().any(|hint| role.contains(hint)) {
            for section in [Section::Projects, Section::Certifications] {
                if snapshot.exists(section) {
                    push_unique(&mut selected, section);
                }
            }
        } else if MANAGEMENT_HINTS.iter().any(|hint| role.contains(hint)) {
            if snapshot.exists(Section::Recommendations) {
                push_unique(&mut selected, Section::Recommendations);
            }
        }
    }

    for &section in Section::ALL {
        if matches!(section, Section::Photo | Section::Connections) {
            continue;
        }
        if snapshot.has_content(section) {
            push_unique(&mut selected, section);
        }
    }

    selected.truncate(MAX_DEEP_SECTIONS);
    selected
}

fn push_unique(selected: &mut Vec<Section>, section: Section) {
    if !selected.contains(&section) {
        selected.push(section);
    }
}

//! Content Cache — change detection that gates re-analysis.
//!
//! The fingerprint is a deterministic, order-fixed join of the tracked
//! snapshot fields and settings. It is not cryptographic and does not need
//! to be: it only has to change when a tracked field changes and stay put
//! when one doesn't.
//!
//! Two entry variants may coexist per subject: an AI-backed entry and a
//! completeness-only entry (written on every run, used when quality
//! analysis is disabled or fails). Lookup resolves them through one
//! explicit sum type, AI-backed first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::analysis::{CompletenessResult, QualityResult};
use crate::models::snapshot::{AnalysisSettings, ProfileSnapshot, Section};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key-value store contract. Writes are atomic at key granularity; there
/// are no cross-key transactions, and last-writer-wins is acceptable
/// because only one session per subject runs at a time.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Redis-backed store.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        RedisStore { client }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        use redis::AsyncCommands;
        let mut con = self.client.get_multiplexed_async_connection().await?;
        Ok(con.get(key).await?)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: () = con.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: () = con.del(key).await?;
        Ok(())
    }
}

/// Cached analysis carrying both completeness and quality results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCacheEntry {
    pub subject_id: String,
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    pub completeness: CompletenessResult,
    pub quality: QualityResult,
    /// Tolerated but not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Cached completeness written on every run, independent of quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessCacheEntry {
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub completeness: CompletenessResult,
}

/// Result of a cache lookup, resolved with explicit precedence: an
/// AI-backed entry wins over a completeness-only entry. A malformed entry
/// (e.g. a non-numeric score) counts as absent, never as trusted cache.
#[derive(Debug)]
pub enum CacheLookup {
    AiBacked(AiCacheEntry),
    CompletenessOnly(CompletenessCacheEntry),
    Absent,
}

/// Computes the change-detection fingerprint for a snapshot + settings.
///
/// Join order and the `"none"`/`"custom"`/`"default"` sentinels are part of
/// the cache contract — do not reorder.
pub fn fingerprint(snapshot: &ProfileSnapshot, settings: &AnalysisSettings) -> String {
    let parts: Vec<String> = vec![
        (snapshot.exists(Section::Photo) as u8).to_string(),
        snapshot.char_count(Section::Headline).to_string(),
        snapshot.char_count(Section::About).to_string(),
        snapshot.count(Section::Experience).to_string(),
        snapshot.count(Section::Skills).to_string(),
        snapshot.count(Section::Education).to_string(),
        snapshot.count(Section::Recommendations).to_string(),
        snapshot.count(Section::Certifications).to_string(),
        (snapshot.exists(Section::Featured) as u8).to_string(),
        snapshot.count(Section::Projects).to_string(),
        snapshot.count(Section::Connections).to_string(),
        settings
            .target_role
            .clone()
            .unwrap_or_else(|| "none".to_string()),
        settings
            .seniority_level
            .clone()
            .unwrap_or_else(|| "none".to_string()),
        if settings.custom_instructions.is_some() {
            "custom".to_string()
        } else {
            "default".to_string()
        },
    ];
    parts.join("-")
}

/// Whether a cached entry can be reused for this snapshot + settings.
/// `force_refresh` and a missing prior fingerprint both invalidate
/// unconditionally.
pub fn is_valid(
    lookup: &CacheLookup,
    snapshot: &ProfileSnapshot,
    settings: &AnalysisSettings,
    force_refresh: bool,
) -> bool {
    if force_refresh {
        return false;
    }
    let prior = match lookup {
        CacheLookup::AiBacked(entry) => Some(entry.fingerprint.as_str()),
        CacheLookup::CompletenessOnly(entry) => entry.fingerprint.as_deref(),
        CacheLookup::Absent => None,
    };
    match prior {
        Some(prior) => prior == fingerprint(snapshot, settings),
        None => false,
    }
}

/// The cache facade used by the orchestrator and handlers.
#[derive(Clone)]
pub struct ProfileCache {
    store: std::sync::Arc<dyn CacheStore>,
}

fn ai_key(subject_id: &str) -> String {
    format!("prolens:analysis:{subject_id}")
}

fn completeness_key(subject_id: &str) -> String {
    format!("prolens:completeness:{subject_id}")
}

impl ProfileCache {
    pub fn new(store: std::sync::Arc<dyn CacheStore>) -> Self {
        ProfileCache { store }
    }

    /// Resolves the cached state for a subject. AI-backed entries take
    /// precedence; entries that fail to deserialize are treated as absent.
    pub async fn lookup(&self, subject_id: &str) -> Result<CacheLookup, CacheError> {
        if let Some(raw) = self.store.get(&ai_key(subject_id)).await? {
            match serde_json::from_str::<AiCacheEntry>(&raw) {
                Ok(entry) => return Ok(CacheLookup::AiBacked(entry)),
                Err(err) => {
                    warn!(subject_id, %err, "malformed AI-backed cache entry, ignoring");
                }
            }
        }

        if let Some(raw) = self.store.get(&completeness_key(subject_id)).await? {
            match serde_json::from_str::<CompletenessCacheEntry>(&raw) {
                Ok(entry) => return Ok(CacheLookup::CompletenessOnly(entry)),
                Err(err) => {
                    warn!(subject_id, %err, "malformed completeness cache entry, ignoring");
                }
            }
        }

        Ok(CacheLookup::Absent)
    }

    /// Saves a full analysis (completeness + quality) under the subject's
    /// AI-backed key, stamped with the snapshot fingerprint.
    pub async fn save(
        &self,
        subject_id: &str,
        snapshot: &ProfileSnapshot,
        settings: &AnalysisSettings,
        completeness: &CompletenessResult,
        quality: &QualityResult,
    ) -> Result<(), CacheError> {
        let entry = AiCacheEntry {
            subject_id: subject_id.to_string(),
            fingerprint: fingerprint(snapshot, settings),
            timestamp: Utc::now(),
            completeness: completeness.clone(),
            quality: quality.clone(),
            version: Some(1),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.put(&ai_key(subject_id), &raw).await?;
        debug!(subject_id, fingerprint = %entry.fingerprint, "saved AI-backed analysis");
        Ok(())
    }

    /// Saves completeness alone. Written right after CALCULATE so the score
    /// survives even if everything downstream fails.
    pub async fn save_completeness_only(
        &self,
        subject_id: &str,
        completeness: &CompletenessResult,
    ) -> Result<(), CacheError> {
        let entry = CompletenessCacheEntry {
            subject_id: subject_id.to_string(),
            fingerprint: None,
            timestamp: Utc::now(),
            completeness: completeness.clone(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.put(&completeness_key(subject_id), &raw).await?;
        debug!(subject_id, "saved completeness-only analysis");
        Ok(())
    }

    /// Deletes both entry variants for a subject.
    pub async fn clear(&self, subject_id: &str) -> Result<(), CacheError> {
        self.store.delete(&ai_key(subject_id)).await?;
        self.store.delete(&completeness_key(subject_id)).await?;
        Ok(())
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::rubric;
    use crate::models::analysis::PrioritizedRecommendations;
    use crate::models::snapshot::SectionRecord;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn record(exists: bool, count: Option<u32>, char_count: Option<u32>) -> SectionRecord {
        SectionRecord {
            exists,
            count,
            char_count,
            ..SectionRecord::default()
        }
    }

    fn snapshot() -> ProfileSnapshot {
        ProfileSnapshot::new(
            "subject-1",
            [
                (Section::Photo, record(true, None, None)),
                (Section::Headline, record(true, None, Some(120))),
                (Section::About, record(true, None, Some(900))),
                (Section::Experience, record(true, Some(3), None)),
                (Section::Skills, record(true, Some(20), None)),
                (Section::Education, record(true, Some(1), None)),
                (Section::Recommendations, record(true, Some(2), None)),
                (Section::Certifications, record(true, Some(0), None)),
                (Section::Projects, record(true, Some(0), None)),
                (Section::Connections, record(true, Some(500), None)),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn quality_result() -> QualityResult {
        QualityResult {
            content_score: 7.5,
            section_scores: BTreeMap::new(),
            score_cap: 10.0,
            recommendations: PrioritizedRecommendations::default(),
            insights: vec![],
        }
    }

    #[test]
    fn test_fingerprint_exact_layout() {
        let fp = fingerprint(&snapshot(), &AnalysisSettings::default());
        assert_eq!(fp, "1-120-900-3-20-1-2-0-0-0-500-none-none-default");
    }

    #[test]
    fn test_fingerprint_settings_sentinels() {
        let settings = AnalysisSettings {
            target_role: Some("staff engineer".to_string()),
            seniority_level: Some("senior".to_string()),
            custom_instructions: Some("emphasize leadership".to_string()),
            quality: true,
        };
        let fp = fingerprint(&snapshot(), &settings);
        assert!(fp.ends_with("staff engineer-senior-custom"));
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let settings = AnalysisSettings::default();
        assert_eq!(
            fingerprint(&snapshot(), &settings),
            fingerprint(&snapshot(), &settings)
        );
    }

    #[test]
    fn test_fingerprint_sensitive_to_tracked_fields() {
        let settings = AnalysisSettings::default();
        let base = fingerprint(&snapshot(), &settings);

        let mut changed = snapshot();
        changed
            .sections
            .insert(Section::About, record(true, None, Some(500)));
        assert_ne!(fingerprint(&changed, &settings), base);

        let mut changed = snapshot();
        changed
            .sections
            .insert(Section::Skills, record(true, Some(21), None));
        assert_ne!(fingerprint(&changed, &settings), base);

        let mut changed = snapshot();
        changed
            .sections
            .insert(Section::Featured, record(true, None, None));
        assert_ne!(fingerprint(&changed, &settings), base);

        let role_change = AnalysisSettings {
            target_role: Some("manager".to_string()),
            ..AnalysisSettings::default()
        };
        assert_ne!(fingerprint(&snapshot(), &role_change), base);
    }

    #[test]
    fn test_fingerprint_ignores_untracked_fields() {
        let settings = AnalysisSettings::default();
        let base = fingerprint(&snapshot(), &settings);

        let mut changed = snapshot();
        changed.sections.insert(
            Section::Headline,
            SectionRecord {
                exists: true,
                char_count: Some(120),
                is_generic: Some(true),
                has_current_role: Some(false),
                ..SectionRecord::default()
            },
        );
        assert_eq!(fingerprint(&changed, &settings), base);
    }

    #[test]
    fn test_is_valid_rules() {
        let settings = AnalysisSettings::default();
        let snap = snapshot();
        let entry = AiCacheEntry {
            subject_id: "subject-1".to_string(),
            fingerprint: fingerprint(&snap, &settings),
            timestamp: Utc::now(),
            completeness: rubric::calculate(&snap),
            quality: quality_result(),
            version: None,
        };
        let lookup = CacheLookup::AiBacked(entry);

        assert!(is_valid(&lookup, &snap, &settings, false));
        // force_refresh invalidates unconditionally.
        assert!(!is_valid(&lookup, &snap, &settings, true));
        // Absent never validates.
        assert!(!is_valid(&CacheLookup::Absent, &snap, &settings, false));
    }

    #[test]
    fn test_stale_fingerprint_invalidates() {
        // Cached at about=500, subject since expanded to 900.
        let settings = AnalysisSettings::default();
        let mut old = snapshot();
        old.sections
            .insert(Section::About, record(true, None, Some(500)));

        let entry = AiCacheEntry {
            subject_id: "subject-1".to_string(),
            fingerprint: fingerprint(&old, &settings),
            timestamp: Utc::now(),
            completeness: rubric::calculate(&old),
            quality: quality_result(),
            version: None,
        };
        assert!(!is_valid(
            &CacheLookup::AiBacked(entry),
            &snapshot(),
            &settings,
            false
        ));
    }

    #[test]
    fn test_completeness_only_without_fingerprint_invalid() {
        let entry = CompletenessCacheEntry {
            subject_id: "subject-1".to_string(),
            fingerprint: None,
            timestamp: Utc::now(),
            completeness: rubric::calculate(&snapshot()),
        };
        assert!(!is_valid(
            &CacheLookup::CompletenessOnly(entry),
            &snapshot(),
            &AnalysisSettings::default(),
            false
        ));
    }

    #[tokio::test]
    async fn test_lookup_prefers_ai_backed_entry() {
        let cache = ProfileCache::new(Arc::new(MemoryStore::default()));
        let snap = snapshot();
        let settings = AnalysisSettings::default();
        let completeness = rubric::calculate(&snap);

        cache
            .save_completeness_only("subject-1", &completeness)
            .await
            .unwrap();
        cache
            .save("subject-1", &snap, &settings, &completeness, &quality_result())
            .await
            .unwrap();

        match cache.lookup("subject-1").await.unwrap() {
            CacheLookup::AiBacked(entry) => {
                assert_eq!(entry.fingerprint, fingerprint(&snap, &settings));
            }
            other => panic!("expected AI-backed entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_completeness_entry_treated_as_absent() {
        let store = Arc::new(MemoryStore::default());
        store
            .put(
                &completeness_key("subject-1"),
                r#"{"subject_id":"subject-1","timestamp":"2026-01-01T00:00:00Z","completeness":{"score":"high"}}"#,
            )
            .await
            .unwrap();

        let cache = ProfileCache::new(store);
        assert!(matches!(
            cache.lookup("subject-1").await.unwrap(),
            CacheLookup::Absent
        ));
    }

    #[tokio::test]
    async fn test_clear_removes_both_variants() {
        let cache = ProfileCache::new(Arc::new(MemoryStore::default()));
        let snap = snapshot();
        let settings = AnalysisSettings::default();
        let completeness = rubric::calculate(&snap);

        cache
            .save_completeness_only("subject-1", &completeness)
            .await
            .unwrap();
        cache
            .save("subject-1", &snap, &settings, &completeness, &quality_result())
            .await
            .unwrap();
        cache.clear("subject-1").await.unwrap();

        assert!(matches!(
            cache.lookup("subject-1").await.unwrap(),
            CacheLookup::Absent
        ));
    }
}

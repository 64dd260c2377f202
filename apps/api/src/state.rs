use std::sync::Arc;

use crate::analysis::cache::ProfileCache;
use crate::analysis::orchestrator::Orchestrator;
use crate::analysis::session::SessionGuards;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub cache: ProfileCache,
    pub orchestrator: Arc<Orchestrator>,
    /// Per-subject run guards — one live analysis per subject, throttled.
    pub guards: Arc<SessionGuards>,
    pub config: Config,
}

//! The profile analysis pipeline: orchestrator, completeness engine,
//! quality normalizer, and the content-addressed cache that gates
//! re-analysis.

pub mod cache;
pub mod handlers;
pub mod orchestrator;
pub mod quality;
pub mod retry;
pub mod rubric;
pub mod session;

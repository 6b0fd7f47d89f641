//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to follow a
//! run stage by stage. All methods default to no-ops.

use crate::model::Stage;
use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
pub trait AnalysisProgressCallback: Send + Sync {
    /// The PDF was rasterised and its text extracted.
    fn on_document_loaded(&self, page_count: usize) {
        let _ = page_count;
    }

    /// An inference request is about to be sent.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// An inference request returned a schema-valid reply.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// A stage failed; the run ends after this call.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// Shared handle stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

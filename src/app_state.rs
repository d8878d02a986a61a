use sqlx::PgPool;
use std::sync::Arc;

use crate::services::pipeline::ScanPipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: Arc<ScanPipeline>,
}

impl AppState {
    pub fn new(db: PgPool, pipeline: ScanPipeline) -> Self {
        Self {
            db,
            pipeline: Arc::new(pipeline),
        }
    }
}

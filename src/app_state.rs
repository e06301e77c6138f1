use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{
    cache::CacheClient,
    queue::JobQueue,
    storage::ObjectStorage,
    token::TokenService,
    vision::VisionClient,
};

/// Shared application state passed to all route handlers and the worker.
/// Everything is constructed explicitly at startup and injected; there
/// are no process-global instances.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<ObjectStorage>,
    pub queue: Arc<JobQueue>,
    pub vision: Arc<VisionClient>,
    pub cache: Arc<CacheClient>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: ObjectStorage,
        queue: JobQueue,
        vision: VisionClient,
        cache: CacheClient,
        tokens: TokenService,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            vision: Arc::new(vision),
            cache: Arc::new(cache),
            tokens: Arc::new(tokens),
        }
    }
}

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::kernel::clock::{Clock, SystemClock};
use crate::kernel::job_bus::JobBus;
use crate::kernel::pubsub::PubSubBus;

/// Process-wide shared state: the database pool plus the infrastructure
/// seams (job bus, pub/sub bus, clock) everything else is built on.
///
/// Mirrors the "holds all server dependencies, injected via traits for
/// testability" shape used throughout this codebase's kernel layer.
#[derive(Clone)]
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub job_bus: Arc<dyn JobBus>,
    pub pubsub: Arc<dyn PubSubBus>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl ServerKernel {
    pub fn new(
        db_pool: PgPool,
        job_bus: Arc<dyn JobBus>,
        pubsub: Arc<dyn PubSubBus>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db_pool,
            job_bus,
            pubsub,
            clock: Arc::new(SystemClock),
            config,
        }
    }
}

//! Configuration for the live-query engine.

use std::time::Duration;

/// Configuration for an [`Engine`](crate::Engine) instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait for the backend to report ready during startup.
    pub init_timeout: Duration,
    /// Database assumed for triggers that name none.
    pub default_database: Option<String>,
    /// Minimum re-evaluation interval applied to caches whose
    /// subscriptions request none. `None` disables rate limiting.
    pub default_min_interval: Option<Duration>,
    /// Capacity of the backend event channel.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(6),
            default_database: None,
            default_min_interval: None,
            channel_capacity: 1024,
        }
    }
}

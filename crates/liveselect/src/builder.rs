//! Fluent builder for engine construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use liveselect_connectors::{AdapterEvent, SourceAdapter};
use liveselect_core::InterestSet;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineMetrics, EngineRuntime, EngineShared};
use crate::error::EngineError;
use crate::executor::QueryExecutor;
use crate::parser::QueryParser;

/// Fluent builder for constructing an [`Engine`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::builder()
///     .executor(pool)
///     .parser(parser)
///     .adapter(NotifyAdapter::new(notifications, NotifyConfig::default()))
///     .default_database("app")
///     .min_interval(Duration::from_millis(50))
///     .build()
///     .await?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    executor: Option<Arc<dyn QueryExecutor>>,
    parser: Option<Arc<dyn QueryParser>>,
    adapter: Option<Box<dyn SourceAdapter>>,
}

impl EngineBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            executor: None,
            parser: None,
            adapter: None,
        }
    }

    /// Sets the query executor.
    #[must_use]
    pub fn executor(mut self, executor: impl QueryExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Sets the query parser.
    #[must_use]
    pub fn parser(mut self, parser: impl QueryParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Sets the backend adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: impl SourceAdapter + 'static) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    /// Bounded wait for the backend to report ready.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Database assumed for triggers that name none.
    #[must_use]
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.config.default_database = Some(database.into());
        self
    }

    /// Minimum re-evaluation interval applied to caches whose
    /// subscriptions request none.
    #[must_use]
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.config.default_min_interval = Some(interval);
        self
    }

    /// Capacity of the backend event channel.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the backend, waits for it to report ready within the init
    /// budget, and spawns the engine loop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when a collaborator is
    /// missing, [`EngineError::BackendInitTimeout`] when the backend
    /// does not report ready in time, and [`EngineError::Connector`] /
    /// [`EngineError::BackendIngress`] when startup fails outright.
    pub async fn build(self) -> Result<Engine, EngineError> {
        let executor = self.executor.ok_or_else(|| {
            EngineError::Configuration("a query executor is required".into())
        })?;
        let parser = self
            .parser
            .ok_or_else(|| EngineError::Configuration("a query parser is required".into()))?;
        let mut adapter = self
            .adapter
            .ok_or_else(|| EngineError::Configuration("a backend adapter is required".into()))?;
        let config = self.config;

        let (event_tx, mut event_rx) = mpsc::channel(config.channel_capacity);
        adapter.start(&InterestSet::new(), event_tx).await?;

        let ready = tokio::time::timeout(config.init_timeout, async {
            while let Some(event) = event_rx.recv().await {
                match event {
                    AdapterEvent::Ready => return Ok(()),
                    AdapterEvent::Error(error) => {
                        return Err(EngineError::BackendIngress(error.to_string()))
                    }
                    // Nothing can be interested yet; pre-ready events
                    // are stale and dropped.
                    AdapterEvent::Event(_) => {}
                }
            }
            Err(EngineError::BackendIngress(
                "change feed closed during startup".into(),
            ))
        })
        .await;

        match ready {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                let _ = adapter.stop().await;
                return Err(error);
            }
            Err(_) => {
                let _ = adapter.stop().await;
                return Err(EngineError::BackendInitTimeout(
                    config.init_timeout.as_millis() as u64,
                ));
            }
        }
        debug!("backend ready, starting engine loop");

        let shared = Arc::new(EngineShared {
            config,
            parser,
            parsed_cache: Mutex::new(HashMap::new()),
            metrics: EngineMetrics::default(),
            next_subscription: AtomicU64::new(1),
            ended: AtomicBool::new(false),
            cache_count: AtomicUsize::new(0),
            subscription_count: AtomicUsize::new(0),
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let runtime = EngineRuntime::new(
            Arc::clone(&shared),
            executor,
            adapter,
            cmd_tx.clone(),
            cmd_rx,
            event_rx,
        );
        tokio::spawn(runtime.run());

        Ok(Engine::from_parts(shared, cmd_tx))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("has_executor", &self.executor.is_some())
            .field("has_parser", &self.parser.is_some())
            .field("has_adapter", &self.adapter.is_some())
            .finish()
    }
}

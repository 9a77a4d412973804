//! The live-query engine: registry, ingress, and lifecycle.
//!
//! One [`Engine`] owns one backend adapter, one query executor, and the
//! `{identity → QueryCache}` registry. All registry and cache mutation
//! happens on a single loop task; the public handle, backend ingress,
//! rate-limit timers, and re-evaluation completions all post [`Command`]s
//! to it. Query I/O is the only work that runs off-loop, as a spawned
//! task per re-evaluation whose completion is serialized back.
//!
//! # Data Flow
//!
//! ```text
//! backend adapter ──AdapterEvent──►┌─────────────────┐
//! Engine handle  ──Command──────►  │   engine loop   │──sink──► subscribers
//! timers / re-evals ──Command──►   │ (single writer) │
//!                                  └─────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use liveselect_connectors::{AdapterEvent, SourceAdapter};
use liveselect_core::{
    apply_diff, diff_result_sets, incremental, matcher, CacheState, CompleteDecision, Diff,
    IncrementalOutcome, InterestSet, InvalidateDecision, KeySelector, ParsedQuery, QueryCache,
    Row, RowEvent, SubscriptionId, Trigger,
};

use crate::builder::EngineBuilder;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::QueryExecutor;
use crate::parser::QueryParser;
use crate::subscription::{EventSink, Subscription};

// ---------------------------------------------------------------------------
// EngineMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for monitoring an engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Total row events accepted from the backend.
    pub(crate) events_ingested: AtomicU64,
    /// Total re-evaluations started.
    pub(crate) reevaluations: AtomicU64,
    /// Total diff deliveries to subscription sinks.
    pub(crate) deliveries: AtomicU64,
    /// Total error deliveries to subscription sinks.
    pub(crate) delivery_errors: AtomicU64,
}

impl EngineMetrics {
    /// Returns total row events accepted from the backend.
    #[must_use]
    pub fn events_ingested(&self) -> u64 {
        self.events_ingested.load(Ordering::Relaxed)
    }

    /// Returns total re-evaluations started.
    #[must_use]
    pub fn reevaluations(&self) -> u64 {
        self.reevaluations.load(Ordering::Relaxed)
    }

    /// Returns total diff deliveries to subscription sinks.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Returns total error deliveries to subscription sinks.
    #[must_use]
    pub fn delivery_errors(&self) -> u64 {
        self.delivery_errors.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Work posted to the engine loop.
pub(crate) enum Command {
    Select {
        id: SubscriptionId,
        identity: String,
        query: String,
        parsed: ParsedQuery,
        params: Vec<Value>,
        key_tag: String,
        triggers: Vec<Trigger>,
        min_interval: Option<Duration>,
        sink: Arc<dyn EventSink>,
        stopped: Arc<AtomicBool>,
    },
    InitialDeliver {
        identity: String,
        id: SubscriptionId,
    },
    Stop(SubscriptionId),
    Refresh(String),
    Reevaluated {
        identity: String,
        outcome: Result<Option<Diff>, EngineError>,
    },
    Pause,
    Resume,
    End,
}

// ---------------------------------------------------------------------------
// Engine (public handle)
// ---------------------------------------------------------------------------

pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) parser: Arc<dyn QueryParser>,
    pub(crate) parsed_cache: Mutex<HashMap<String, ParsedQuery>>,
    pub(crate) metrics: EngineMetrics,
    pub(crate) next_subscription: AtomicU64,
    pub(crate) ended: AtomicBool,
    pub(crate) cache_count: AtomicUsize,
    pub(crate) subscription_count: AtomicUsize,
}

/// Handle to a running live-query engine.
///
/// Created via [`Engine::builder`]. Dropping the handle ends the engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::builder()
///     .executor(executor)
///     .parser(parser)
///     .adapter(BinlogAdapter::new(messages))
///     .build()
///     .await?;
///
/// let sub = engine.select(
///     "SELECT * FROM users WHERE score > $1",
///     vec![json!(10)],
///     &KeySelector::column("id"),
///     vec![Trigger::on_table("users").in_database("app")],
///     None,
///     sink_fn(|diff, rows| println!("{} rows", rows.len())),
/// )?;
/// ```
pub struct Engine {
    shared: Arc<EngineShared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Engine {
    /// Returns a fluent builder for constructing an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(
        shared: Arc<EngineShared>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self { shared, commands }
    }

    /// Registers a live query and returns its subscription handle.
    ///
    /// Registrations with an identical `(query, params, key tag)`
    /// identity share one cache; the first registration triggers an
    /// immediate evaluation, later ones receive the current result set
    /// as an all-added diff on the next loop tick.
    ///
    /// A `min_interval` is promoted to the cache only if the cache does
    /// not already carry one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] for an empty query, an
    /// empty trigger list, or a trigger whose database cannot be
    /// resolved; [`EngineError::Shutdown`] after [`end`](Self::end).
    pub fn select<S: EventSink>(
        &self,
        query: &str,
        params: Vec<Value>,
        key: &KeySelector,
        triggers: Vec<Trigger>,
        min_interval: Option<Duration>,
        sink: S,
    ) -> Result<Subscription, EngineError> {
        if self.shared.ended.load(Ordering::SeqCst) {
            return Err(EngineError::Shutdown);
        }
        if query.trim().is_empty() {
            return Err(EngineError::Configuration(
                "query must be a non-empty string".into(),
            ));
        }
        if triggers.is_empty() {
            return Err(EngineError::Configuration(
                "at least one trigger is required".into(),
            ));
        }
        let mut resolved = Vec::with_capacity(triggers.len());
        for mut trigger in triggers {
            if trigger.database.is_none() {
                match &self.shared.config.default_database {
                    Some(database) => trigger.database = Some(database.clone()),
                    None => {
                        return Err(EngineError::Configuration(format!(
                            "trigger for table `{}` has no database and no default is configured",
                            trigger.table
                        )))
                    }
                }
            }
            resolved.push(trigger);
        }

        let parsed = self.parse_cached(query)?;
        let min_interval = min_interval.or(self.shared.config.default_min_interval);
        let identity = QueryCache::identity(query, &params, key.tag());
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription::new(id, self.commands.clone());

        let command = Command::Select {
            id,
            identity,
            query: query.to_string(),
            parsed,
            params,
            key_tag: key.tag().to_string(),
            triggers: resolved,
            min_interval,
            sink: Arc::new(sink),
            stopped: subscription.stopped_flag(),
        };
        self.commands
            .send(command)
            .map_err(|_| EngineError::Shutdown)?;
        debug!(%id, query, "subscription registered");
        Ok(subscription)
    }

    /// Publishes an empty interest-set; events still draining from the
    /// backend are discarded without invalidating any cache.
    pub fn pause(&self) {
        if !self.shared.ended.load(Ordering::SeqCst) {
            let _ = self.commands.send(Command::Pause);
        }
    }

    /// Republishes the full interest-set and re-evaluates every live
    /// cache once to reconcile changes missed while paused.
    pub fn resume(&self) {
        if !self.shared.ended.load(Ordering::SeqCst) {
            let _ = self.commands.send(Command::Resume);
        }
    }

    /// Terminal shutdown: stops the backend, aborts timers, and reports
    /// a shutdown error to subscribers of in-flight re-evaluations.
    /// Subsequent calls are no-ops.
    pub fn end(&self) {
        if !self.shared.ended.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::End);
        }
    }

    /// `true` once [`end`](Self::end) has run (or the handle dropped).
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    /// Engine counters.
    #[must_use]
    pub fn metrics(&self) -> &EngineMetrics {
        &self.shared.metrics
    }

    /// Number of live query caches.
    #[must_use]
    pub fn cache_count(&self) -> usize {
        self.shared.cache_count.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.subscription_count.load(Ordering::SeqCst)
    }

    /// Looks up or computes the parsed form of a query.
    ///
    /// # Panics
    ///
    /// Panics if the parsed-query cache lock was poisoned. This should
    /// not occur under normal operation.
    fn parse_cached(&self, query: &str) -> Result<ParsedQuery, EngineError> {
        if let Some(parsed) = self.shared.parsed_cache.lock().unwrap().get(query) {
            return Ok(parsed.clone());
        }
        let parsed = self.shared.parser.parse(query)?;
        self.shared
            .parsed_cache
            .lock()
            .unwrap()
            .insert(query.to_string(), parsed.clone());
        Ok(parsed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("caches", &self.cache_count())
            .field("subscriptions", &self.subscription_count())
            .field("ended", &self.is_ended())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EngineRuntime (loop task)
// ---------------------------------------------------------------------------

struct SubEntry {
    cache: String,
    triggers: Vec<Trigger>,
    sink: Arc<dyn EventSink>,
    stopped: Arc<AtomicBool>,
    delivered: bool,
}

struct CacheEntry {
    cache: QueryCache,
    timer: Option<tokio::task::JoinHandle<()>>,
}

/// What a finished re-evaluation owes the subscribers.
enum DeliveryPlan {
    /// Changed: the diff plus the result set after it.
    Update(Diff, Vec<Row>),
    /// Unchanged: only undelivered subscribers get a bootstrap.
    BootstrapOnly(Vec<Row>),
    /// Failed: the error, result set untouched.
    Error(EngineError),
}

/// The single-writer loop owning all engine state.
pub(crate) struct EngineRuntime {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) adapter: Box<dyn SourceAdapter>,
    pub(crate) supplies_payload: bool,
    pub(crate) internal: mpsc::UnboundedSender<Command>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) events: mpsc::Receiver<AdapterEvent>,
    caches: IndexMap<String, CacheEntry>,
    subscriptions: HashMap<SubscriptionId, SubEntry>,
    published_interest: InterestSet,
    paused: bool,
    events_closed: bool,
}

impl EngineRuntime {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        executor: Arc<dyn QueryExecutor>,
        adapter: Box<dyn SourceAdapter>,
        internal: mpsc::UnboundedSender<Command>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Receiver<AdapterEvent>,
    ) -> Self {
        let supplies_payload = adapter.supplies_row_data();
        Self {
            shared,
            executor,
            adapter,
            supplies_payload,
            internal,
            commands,
            events,
            caches: IndexMap::new(),
            subscriptions: HashMap::new(),
            published_interest: InterestSet::new(),
            paused: false,
            events_closed: false,
        }
    }

    /// Runs the loop until [`Command::End`].
    pub(crate) async fn run(mut self) {
        debug!(payload_mode = self.supplies_payload, "engine loop started");
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                event = self.events.recv(), if !self.events_closed => {
                    match event {
                        Some(event) => self.handle_adapter_event(event),
                        None => self.backend_lost(),
                    }
                }
            }
        }
        debug!("engine loop exited");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Select {
                id,
                identity,
                query,
                parsed,
                params,
                key_tag,
                triggers,
                min_interval,
                sink,
                stopped,
            } => {
                let created = !self.caches.contains_key(&identity);
                if created {
                    let cache = QueryCache::new(query, parsed, params, key_tag);
                    self.caches.insert(
                        identity.clone(),
                        CacheEntry { cache, timer: None },
                    );
                }
                if let Some(entry) = self.caches.get_mut(&identity) {
                    entry.cache.attach(id);
                    entry.cache.promote_min_interval(min_interval);
                }
                self.subscriptions.insert(
                    id,
                    SubEntry {
                        cache: identity.clone(),
                        triggers,
                        sink,
                        stopped,
                        delivered: false,
                    },
                );
                self.update_counts();
                self.publish_interest().await;
                if created {
                    debug!(%id, "cache created, evaluating");
                    self.invalidate_cache(&identity);
                } else {
                    debug!(%id, "joined existing cache");
                    let _ = self.internal.send(Command::InitialDeliver { identity, id });
                }
                false
            }

            Command::InitialDeliver { identity, id } => {
                self.initial_deliver(&identity, id);
                false
            }

            Command::Stop(id) => {
                self.stop_subscription(id).await;
                false
            }

            Command::Refresh(identity) => {
                let fired = match self.caches.get_mut(&identity) {
                    Some(entry) => {
                        entry.timer = None;
                        entry.cache.timer_fired()
                    }
                    None => false,
                };
                if fired {
                    self.spawn_reevaluation(&identity);
                }
                false
            }

            Command::Reevaluated { identity, outcome } => {
                self.finish_reevaluation(&identity, outcome);
                false
            }

            Command::Pause => {
                self.paused = true;
                self.publish_interest().await;
                debug!("engine paused");
                false
            }

            Command::Resume => {
                self.paused = false;
                self.publish_interest().await;
                let identities: Vec<String> = self.caches.keys().cloned().collect();
                for identity in &identities {
                    self.invalidate_cache(identity);
                }
                debug!(caches = identities.len(), "engine resumed, reconciling");
                false
            }

            Command::End => {
                self.end().await;
                true
            }
        }
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Ready => trace!("backend ready"),
            AdapterEvent::Error(error) => {
                let error = EngineError::BackendIngress(error.to_string());
                warn!(%error, "backend ingress error");
                let subscribers: Vec<SubscriptionId> =
                    self.subscriptions.keys().copied().collect();
                self.deliver_error(&subscribers, &error);
            }
            AdapterEvent::Event(event) => self.ingress(event),
        }
    }

    /// One row event: dirty every cache whose aggregate trigger set
    /// matches, in registry insertion order.
    fn ingress(&mut self, event: RowEvent) {
        if self.paused {
            trace!(table = %event.qualified_table(), "paused, discarding event");
            return;
        }
        self.shared
            .metrics
            .events_ingested
            .fetch_add(1, Ordering::Relaxed);

        let mut dirty = Vec::new();
        for (identity, entry) in &self.caches {
            let triggers: Vec<Trigger> = entry
                .cache
                .subscribers()
                .iter()
                .filter_map(|id| self.subscriptions.get(id))
                .flat_map(|sub| sub.triggers.iter().cloned())
                .collect();
            if matcher::matches_event(&triggers, &event) {
                dirty.push(identity.clone());
            }
        }
        trace!(
            table = %event.qualified_table(),
            op = event.op.as_str(),
            affected = dirty.len(),
            "row event ingress"
        );

        for identity in dirty {
            if self.supplies_payload {
                if let Some(entry) = self.caches.get_mut(&identity) {
                    entry.cache.queue_event(event.clone());
                }
            }
            self.invalidate_cache(&identity);
        }
    }

    fn backend_lost(&mut self) {
        self.events_closed = true;
        let error = EngineError::BackendIngress("change feed closed".into());
        warn!(%error, "backend lost");
        let subscribers: Vec<SubscriptionId> = self.subscriptions.keys().copied().collect();
        self.deliver_error(&subscribers, &error);
    }

    // --- Invalidation and re-evaluation ---

    fn invalidate_cache(&mut self, identity: &str) {
        let now = Instant::now();
        let decision = match self.caches.get_mut(identity) {
            Some(entry) => entry.cache.invalidate(now),
            None => return,
        };
        trace!(?decision, "cache invalidated");
        match decision {
            InvalidateDecision::RunNow => self.spawn_reevaluation(identity),
            InvalidateDecision::ScheduleIn(delay) => self.arm_timer(identity, delay),
            InvalidateDecision::AlreadyScheduled | InvalidateDecision::Deferred => {}
        }
    }

    fn arm_timer(&mut self, identity: &str, delay: Duration) {
        let sender = self.internal.clone();
        let target = identity.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(Command::Refresh(target));
        });
        match self.caches.get_mut(identity) {
            Some(entry) => entry.timer = Some(handle),
            None => handle.abort(),
        }
    }

    fn spawn_reevaluation(&mut self, identity: &str) {
        let supplies = self.supplies_payload;
        let Some(entry) = self.caches.get_mut(identity) else {
            return;
        };
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let old_rows = entry.cache.result_set().to_vec();
        let old_hashes = entry.cache.result_hashes();
        let pending = if supplies {
            entry.cache.drain_pending()
        } else {
            Vec::new()
        };
        let query = entry.cache.query().to_string();
        let parsed = entry.cache.parsed().clone();
        let params = entry.cache.params().to_vec();

        self.shared
            .metrics
            .reevaluations
            .fetch_add(1, Ordering::Relaxed);
        trace!(query = %query, pending = pending.len(), "re-evaluation started");

        let executor = Arc::clone(&self.executor);
        let sender = self.internal.clone();
        let target = identity.to_string();
        tokio::spawn(async move {
            let outcome = reevaluate(
                executor.as_ref(),
                &query,
                &parsed,
                &params,
                &old_rows,
                &old_hashes,
                &pending,
            )
            .await;
            let _ = sender.send(Command::Reevaluated {
                identity: target,
                outcome,
            });
        });
    }

    fn finish_reevaluation(
        &mut self,
        identity: &str,
        outcome: Result<Option<Diff>, EngineError>,
    ) {
        let now = Instant::now();
        let advanced = outcome.is_ok();
        let Some(entry) = self.caches.get_mut(identity) else {
            trace!("re-evaluation finished for a disposed cache, dropping");
            return;
        };
        let decision = entry.cache.complete(now, advanced);
        let subscribers = entry.cache.subscribers().to_vec();
        let plan = match outcome {
            Ok(Some(diff)) => {
                let next = apply_diff(entry.cache.result_set(), &diff);
                entry.cache.install(next);
                DeliveryPlan::Update(diff, entry.cache.result_set().to_vec())
            }
            // A first evaluation that found nothing still owes new
            // subscribers their (empty) initial state.
            Ok(None) => DeliveryPlan::BootstrapOnly(entry.cache.result_set().to_vec()),
            Err(error) => DeliveryPlan::Error(error),
        };

        match plan {
            DeliveryPlan::Update(diff, rows) => {
                debug!(
                    rows = rows.len(),
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    moved = diff.moved.len(),
                    copied = diff.copied.len(),
                    "delivering diff"
                );
                self.deliver_update(&subscribers, &diff, &rows);
            }
            DeliveryPlan::BootstrapOnly(rows) => {
                trace!("re-evaluation found no change");
                self.bootstrap_undelivered(&subscribers, &rows);
            }
            DeliveryPlan::Error(error) => {
                warn!(%error, "re-evaluation failed");
                self.deliver_error(&subscribers, &error);
            }
        }

        match decision {
            CompleteDecision::FollowUpNow => self.spawn_reevaluation(identity),
            CompleteDecision::FollowUpIn(delay) => self.arm_timer(identity, delay),
            CompleteDecision::Idle => {}
        }
    }

    // --- Delivery ---

    /// Delivers the incremental diff to subscribers that already hold a
    /// mirror; subscribers awaiting their first delivery get the current
    /// result set as an all-added diff instead.
    fn deliver_update(&mut self, subscribers: &[SubscriptionId], diff: &Diff, rows: &[Row]) {
        for id in subscribers {
            let Some(sub) = self.subscriptions.get_mut(id) else {
                continue;
            };
            if sub.stopped.load(Ordering::SeqCst) {
                continue;
            }
            if sub.delivered {
                sub.sink.on_update(diff, rows);
            } else {
                sub.sink.on_update(&Diff::all_added(rows), rows);
                sub.delivered = true;
            }
            self.shared.metrics.deliveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One delivery of the current result set to subscribers that have
    /// not received anything yet.
    fn bootstrap_undelivered(&mut self, subscribers: &[SubscriptionId], rows: &[Row]) {
        let diff = Diff::all_added(rows);
        for id in subscribers {
            let Some(sub) = self.subscriptions.get_mut(id) else {
                continue;
            };
            if sub.delivered || sub.stopped.load(Ordering::SeqCst) {
                continue;
            }
            sub.sink.on_update(&diff, rows);
            sub.delivered = true;
            self.shared.metrics.deliveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn initial_deliver(&mut self, identity: &str, id: SubscriptionId) {
        let rows = match self.caches.get(identity) {
            Some(entry) => entry.cache.result_set().to_vec(),
            None => return,
        };
        let Some(sub) = self.subscriptions.get_mut(&id) else {
            return;
        };
        if sub.delivered || sub.stopped.load(Ordering::SeqCst) {
            return;
        }
        let diff = Diff::all_added(&rows);
        sub.sink.on_update(&diff, &rows);
        sub.delivered = true;
        self.shared.metrics.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    fn deliver_error(&mut self, subscribers: &[SubscriptionId], error: &EngineError) {
        for id in subscribers {
            let Some(sub) = self.subscriptions.get(id) else {
                continue;
            };
            if sub.stopped.load(Ordering::SeqCst) {
                continue;
            }
            sub.sink.on_error(error);
            self.shared
                .metrics
                .delivery_errors
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    // --- Lifecycle ---

    async fn stop_subscription(&mut self, id: SubscriptionId) {
        let Some(sub) = self.subscriptions.remove(&id) else {
            return;
        };
        sub.stopped.store(true, Ordering::SeqCst);
        let identity = sub.cache;
        let disposed = match self.caches.get_mut(&identity) {
            Some(entry) => {
                let empty = entry.cache.detach(id);
                if empty {
                    if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                }
                empty
            }
            None => false,
        };
        if disposed {
            self.caches.shift_remove(&identity);
        }
        self.update_counts();
        self.publish_interest().await;
        debug!(%id, disposed, "subscription stopped");
    }

    async fn end(&mut self) {
        if let Err(error) = self.adapter.stop().await {
            warn!(%error, "backend stop failed");
        }
        let mut in_flight: Vec<Vec<SubscriptionId>> = Vec::new();
        for entry in self.caches.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            if matches!(entry.cache.state(), CacheState::Running { .. }) {
                in_flight.push(entry.cache.subscribers().to_vec());
            }
        }
        for subscribers in in_flight {
            self.deliver_error(&subscribers, &EngineError::Shutdown);
        }
        self.caches.clear();
        self.subscriptions.clear();
        self.update_counts();
        debug!("engine ended");
    }

    /// Recomputes the interest-set from live triggers and pushes it to
    /// the backend when it changed. While paused the empty set is
    /// published regardless of live triggers.
    async fn publish_interest(&mut self) {
        let mut set = InterestSet::new();
        if !self.paused {
            for sub in self.subscriptions.values() {
                for trigger in &sub.triggers {
                    if let Some(database) = &trigger.database {
                        set.insert(database.clone(), trigger.table.clone());
                    }
                }
            }
        }
        if set == self.published_interest {
            return;
        }
        debug!(tables = set.len(), "publishing interest-set");
        if let Err(error) = self.adapter.set_interest(&set).await {
            warn!(%error, "interest publication failed");
        }
        self.published_interest = set;
    }

    fn update_counts(&self) {
        self.shared
            .cache_count
            .store(self.caches.len(), Ordering::SeqCst);
        self.shared
            .subscription_count
            .store(self.subscriptions.len(), Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Re-evaluation (off-loop)
// ---------------------------------------------------------------------------

/// One re-evaluation: incremental from queued payloads when possible,
/// otherwise a full re-query. Returns the diff against the snapshot, or
/// `None` for no change.
async fn reevaluate(
    executor: &dyn QueryExecutor,
    query: &str,
    parsed: &ParsedQuery,
    params: &[Value],
    old_rows: &[Row],
    old_hashes: &[liveselect_core::RowHash],
    pending: &[RowEvent],
) -> Result<Option<Diff>, EngineError> {
    if !pending.is_empty() {
        match incremental::next_result_set(old_rows, pending, parsed, params) {
            Ok(IncrementalOutcome::Unchanged) => return Ok(None),
            Ok(IncrementalOutcome::Updated(rows)) => {
                return Ok(diff_result_sets(old_hashes, &rows))
            }
            Ok(IncrementalOutcome::RequiresRequery) => {}
            Err(error) => return Err(error.into()),
        }
    }

    let raw = executor.execute(query, params).await?;
    let rows: Vec<Row> = raw
        .into_iter()
        .enumerate()
        .map(|(position, data)| Row::new(data, position as u64 + 1))
        .collect();
    Ok(diff_result_sets(old_hashes, &rows))
}

// ===========================================================================
// Tests
// ===========================================================================

//! Per-query cache state and the re-evaluation rate limiter.
//!
//! One [`QueryCache`] exists per distinct `(query, params, key tag)`
//! registration. It owns the last-known result set, the queued payload
//! events, the subscriber roster, and the IDLE / SCHEDULED / RUNNING
//! state machine that coalesces invalidations under a minimum
//! re-evaluation interval.
//!
//! The machine is pure: callers pass the current instant and act on the
//! returned decision (spawn a re-evaluation, arm a timer, or nothing).
//! Timer handles live with the caller, which keeps this type free of any
//! runtime dependency and directly testable.

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::event::RowEvent;
use crate::query::ParsedQuery;
use crate::row::{Row, RowHash};

// ---------------------------------------------------------------------------
// SubscriptionId
// ---------------------------------------------------------------------------

/// Unique subscription identifier, monotonically assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// State machine types
// ---------------------------------------------------------------------------

/// Re-evaluation lifecycle state of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Clean, or dirty work already delivered.
    Idle,
    /// A re-evaluation timer is armed.
    Scheduled,
    /// A re-evaluation is in flight. `deferred` records whether another
    /// invalidation arrived meanwhile.
    Running {
        /// A follow-up re-evaluation is owed on completion.
        deferred: bool,
    },
}

/// What the caller must do after [`QueryCache::invalidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateDecision {
    /// Start a re-evaluation now.
    RunNow,
    /// Arm a timer; re-evaluate when it fires.
    ScheduleIn(Duration),
    /// A timer is already armed; coalesced.
    AlreadyScheduled,
    /// A re-evaluation is in flight; a follow-up was recorded.
    Deferred,
}

/// What the caller must do after [`QueryCache::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteDecision {
    /// Nothing pending.
    Idle,
    /// A deferred invalidation is due immediately.
    FollowUpNow,
    /// A deferred invalidation is due after the rate-limit window.
    FollowUpIn(Duration),
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// De-duplicated per-query state holding the last known result set.
#[derive(Debug)]
pub struct QueryCache {
    query: String,
    parsed: ParsedQuery,
    params: Vec<Value>,
    key_tag: String,
    result_set: Vec<Row>,
    subscribers: Vec<SubscriptionId>,
    state: CacheState,
    last_update: Option<Instant>,
    min_interval: Option<Duration>,
    pending_events: Vec<RowEvent>,
}

impl QueryCache {
    /// Creates an empty cache for a registration.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        parsed: ParsedQuery,
        params: Vec<Value>,
        key_tag: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            parsed,
            params,
            key_tag: key_tag.into(),
            result_set: Vec::new(),
            subscribers: Vec::new(),
            state: CacheState::Idle,
            last_update: None,
            min_interval: None,
            pending_events: Vec::new(),
        }
    }

    /// Canonical identity of a `(query, params, key tag)` registration.
    ///
    /// Registrations with equal identities share one cache.
    #[must_use]
    pub fn identity(query: &str, params: &[Value], key_tag: &str) -> String {
        serde_json::to_string(&(query, params, key_tag))
            .expect("JSON encoding of plain values does not fail")
    }

    /// This cache's own identity.
    #[must_use]
    pub fn own_identity(&self) -> String {
        Self::identity(&self.query, &self.params, &self.key_tag)
    }

    /// The registered query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The parsed form of the query.
    #[must_use]
    pub fn parsed(&self) -> &ParsedQuery {
        &self.parsed
    }

    /// The positional parameter bindings.
    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The last known result set.
    #[must_use]
    pub fn result_set(&self) -> &[Row] {
        &self.result_set
    }

    /// Hashes of the last known result set, in order.
    #[must_use]
    pub fn result_hashes(&self) -> Vec<RowHash> {
        self.result_set.iter().map(|row| row.hash().clone()).collect()
    }

    /// Replaces the result set after a completed re-evaluation.
    pub fn install(&mut self, rows: Vec<Row>) {
        self.result_set = rows;
    }

    /// Current state-machine state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Instant of the last completed re-evaluation.
    #[must_use]
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// The effective minimum re-evaluation interval.
    #[must_use]
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Adopts a subscription's interval only if the cache has none yet.
    pub fn promote_min_interval(&mut self, interval: Option<Duration>) {
        if self.min_interval.is_none() {
            self.min_interval = interval;
        }
    }

    // --- Subscribers ---

    /// Attaches a subscription.
    pub fn attach(&mut self, id: SubscriptionId) {
        if !self.subscribers.contains(&id) {
            self.subscribers.push(id);
        }
    }

    /// Detaches a subscription. Returns `true` when the roster is now
    /// empty and the cache must be disposed.
    pub fn detach(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.retain(|existing| *existing != id);
        self.subscribers.is_empty()
    }

    /// Attached subscriptions, in attach order.
    #[must_use]
    pub fn subscribers(&self) -> &[SubscriptionId] {
        &self.subscribers
    }

    // --- Pending payload events ---

    /// Queues a payload event for the next re-evaluation.
    pub fn queue_event(&mut self, event: RowEvent) {
        self.pending_events.push(event);
    }

    /// Drains the queued payload events.
    #[must_use]
    pub fn drain_pending(&mut self) -> Vec<RowEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Number of queued payload events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_events.len()
    }

    // --- State machine ---

    /// Marks the cache dirty.
    ///
    /// From `Idle` the decision is `RunNow` when no rate limit applies or
    /// the window has elapsed, otherwise `ScheduleIn` the remainder.
    /// A `Scheduled` cache coalesces; a `Running` cache records one
    /// deferred follow-up.
    pub fn invalidate(&mut self, now: Instant) -> InvalidateDecision {
        match self.state {
            CacheState::Idle => match (self.min_interval, self.last_update) {
                (Some(min_interval), Some(last_update)) => {
                    let elapsed = now.saturating_duration_since(last_update);
                    if elapsed >= min_interval {
                        self.state = CacheState::Running { deferred: false };
                        InvalidateDecision::RunNow
                    } else {
                        self.state = CacheState::Scheduled;
                        InvalidateDecision::ScheduleIn(min_interval - elapsed)
                    }
                }
                _ => {
                    self.state = CacheState::Running { deferred: false };
                    InvalidateDecision::RunNow
                }
            },
            CacheState::Scheduled => InvalidateDecision::AlreadyScheduled,
            CacheState::Running { .. } => {
                self.state = CacheState::Running { deferred: true };
                InvalidateDecision::Deferred
            }
        }
    }

    /// A scheduled timer fired. Returns `true` when a re-evaluation must
    /// start (stale timers for a disposed or already-running cache return
    /// `false`).
    pub fn timer_fired(&mut self) -> bool {
        if self.state == CacheState::Scheduled {
            self.state = CacheState::Running { deferred: false };
            true
        } else {
            false
        }
    }

    /// A re-evaluation finished. `advanced` is `true` when it completed
    /// successfully (the result set and `last_update` moved forward) and
    /// `false` on failure, which leaves `last_update` untouched.
    ///
    /// A deferred invalidation recorded while running is replayed here as
    /// a fresh one, still subject to the rate limit.
    pub fn complete(&mut self, now: Instant, advanced: bool) -> CompleteDecision {
        let deferred = matches!(self.state, CacheState::Running { deferred: true });
        if advanced {
            self.last_update = Some(now);
        }
        self.state = CacheState::Idle;
        if !deferred {
            return CompleteDecision::Idle;
        }
        match self.invalidate(now) {
            InvalidateDecision::RunNow => CompleteDecision::FollowUpNow,
            InvalidateDecision::ScheduleIn(delay) => CompleteDecision::FollowUpIn(delay),
            InvalidateDecision::AlreadyScheduled | InvalidateDecision::Deferred => {
                CompleteDecision::Idle
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

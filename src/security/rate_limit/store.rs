//! Fixed-window records and their backing stores.
//!
//! The admit/reject algorithm lives on [`RateWindowRecord`]; a store only has
//! to apply it atomically per key. [`MemoryWindowStore`] does so under the
//! `DashMap` shard lock, which is sufficient for a single process. A store
//! shared by several replicas must offer the same atomic check-and-increment
//! (e.g. a scripted increment in an external counter service).

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limit applied to one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

/// Outcome of a single limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub admitted: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which the current window closes.
    pub reset_at: u64,
    /// Hint returned to rejected callers; always the window length.
    pub retry_after: Duration,
}

impl RateDecision {
    fn admit(remaining: u32, reset_at: u64, policy: RatePolicy) -> Self {
        Self {
            admitted: true,
            remaining,
            reset_at,
            retry_after: policy.window,
        }
    }

    pub(crate) fn reject(reset_at: u64, policy: RatePolicy) -> Self {
        Self {
            admitted: false,
            remaining: 0,
            reset_at,
            retry_after: policy.window,
        }
    }
}

/// Request count for one (purpose, identifier) pair in the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowRecord {
    pub identifier: String,
    pub count: u32,
    pub reset_at: u64,
}

impl RateWindowRecord {
    /// Open a fresh window holding the admitted request.
    pub fn open(identifier: &str, now: u64, policy: RatePolicy) -> (Self, RateDecision) {
        let record = Self {
            identifier: identifier.to_string(),
            count: 1,
            reset_at: now.saturating_add(policy.window_millis()),
        };
        let decision = RateDecision::admit(
            policy.max_requests.saturating_sub(1),
            record.reset_at,
            policy,
        );
        (record, decision)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset_at
    }

    /// Apply one check to an existing record. Rejections leave it untouched.
    pub fn step(&mut self, now: u64, policy: RatePolicy) -> RateDecision {
        if self.is_expired(now) {
            let (fresh, decision) = Self::open(&self.identifier, now, policy);
            *self = fresh;
            return decision;
        }

        if self.count < policy.max_requests {
            self.count += 1;
            return RateDecision::admit(policy.max_requests - self.count, self.reset_at, policy);
        }

        RateDecision::reject(self.reset_at, policy)
    }
}

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum RateStoreError {
    #[error("rate limit store unavailable: {0}")]
    Backend(String),
}

/// Backing store for window records.
#[async_trait]
pub trait WindowStore: Send + Sync + Debug {
    /// Atomically apply one check to the record under `key`.
    async fn check_and_increment(
        &self,
        key: &str,
        identifier: &str,
        now: u64,
        policy: RatePolicy,
    ) -> Result<RateDecision, RateStoreError>;

    /// Remove every record whose window closed before `now`. Returns the
    /// number removed.
    async fn sweep_expired(&self, now: u64) -> Result<usize, RateStoreError>;

    /// Number of tracked windows, if the store can report it cheaply.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    records: DashMap<String, RateWindowRecord>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<RateWindowRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn check_and_increment(
        &self,
        key: &str,
        identifier: &str,
        now: u64,
        policy: RatePolicy,
    ) -> Result<RateDecision, RateStoreError> {
        let decision = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut slot) => slot.get_mut().step(now, policy),
            Entry::Vacant(slot) => {
                let (record, decision) = RateWindowRecord::open(identifier, now, policy);
                slot.insert(record);
                decision
            }
        };
        Ok(decision)
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, RateStoreError> {
        let removed = AtomicUsize::new(0);
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        Ok(removed.into_inner())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

//! In-process admission store.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::Store;
use super::window::RateLimitSpec;
use crate::error::Result;

/// Admission state for one key.
#[derive(Debug, Clone, Copy)]
struct KeyState {
    /// Admits granted in the current window
    count: u64,
    /// When the first admit of the current window happened
    window_start: Instant,
}

#[derive(Debug)]
struct Counters {
    keys: HashMap<String, KeyState>,
    last_sweep: Instant,
}

/// Memory-resident counters for single-instance deployments.
///
/// All keys share one mutex. Every decision is a short critical section
/// with no I/O, so the cross-key contention stays small.
///
/// Keys whose window elapsed are evicted lazily: at most once per window
/// length, the next caller sweeps the whole map. An evicted key behaves
/// exactly like one whose window elapsed, so eviction never changes a
/// decision.
#[derive(Debug)]
pub struct LocalStore {
    spec: RateLimitSpec,
    counters: Mutex<Counters>,
}

impl LocalStore {
    /// Create an empty store enforcing `spec`.
    pub fn new(spec: RateLimitSpec) -> Self {
        Self {
            spec,
            counters: Mutex::new(Counters {
                keys: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// The limits this store enforces.
    pub fn spec(&self) -> RateLimitSpec {
        self.spec
    }

    /// Consume one admission unit for `key`.
    ///
    /// This is the synchronous core of [`Store::use_token`]; it never fails.
    pub fn try_admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        self.maybe_sweep(&mut counters, now);

        let Some(state) = counters.keys.get_mut(key) else {
            counters.keys.insert(
                key.to_string(),
                KeyState {
                    count: 1,
                    window_start: now,
                },
            );
            debug!(key = %key, "Opened admission window");
            return true;
        };

        if self
            .spec
            .has_elapsed(now.saturating_duration_since(state.window_start))
        {
            // Hard reset: the new window starts at this admit.
            state.count = 1;
            state.window_start = now;
            debug!(key = %key, "Window elapsed, reopened admission window");
            return true;
        }

        if state.count >= self.spec.max_admits() {
            debug!(
                key = %key,
                count = state.count,
                limit = self.spec.max_admits(),
                "Admission capacity reached"
            );
            return false;
        }

        state.count += 1;
        trace!(key = %key, count = state.count, "Admitted");
        true
    }

    /// Drop every key whose window has elapsed.
    ///
    /// Returns the number of evicted keys.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        self.sweep(&mut counters, now)
    }

    /// Admits granted to `key` in its currently open window.
    ///
    /// Returns `None` if no window is open for the key.
    pub fn admitted(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let counters = self.counters.lock();
        counters
            .keys
            .get(key)
            .filter(|s| !self.spec.has_elapsed(now.saturating_duration_since(s.window_start)))
            .map(|s| s.count)
    }

    /// Number of keys currently tracked, including not yet evicted stale ones.
    pub fn len(&self) -> usize {
        self.counters.lock().keys.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_sweep(&self, counters: &mut Counters, now: Instant) {
        if self
            .spec
            .has_elapsed(now.saturating_duration_since(counters.last_sweep))
        {
            self.sweep(counters, now);
        }
    }

    fn sweep(&self, counters: &mut Counters, now: Instant) -> usize {
        let before = counters.keys.len();
        let spec = self.spec;
        counters
            .keys
            .retain(|_, s| !spec.has_elapsed(now.saturating_duration_since(s.window_start)));
        counters.last_sweep = now;

        let evicted = before - counters.keys.len();
        if evicted > 0 {
            debug!(evicted, remaining = counters.keys.len(), "Evicted stale admission windows");
        }
        evicted
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn use_token(&self, key: &str) -> Result<bool> {
        Ok(self.try_admit(key))
    }

    fn spec(&self) -> RateLimitSpec {
        self.spec
    }
}

// 🔁 Retry policy for the remote store
//
// Exponential backoff with a cap, bounded attempts, and a status-code
// predicate deciding which failures are worth another try. The engine never
// sees this; it talks to a RetryingStore like any other TabularStore.

use crate::store::{CellUpdate, StoreError, StoreResult, Table, TabularStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Status codes treated as transient (rate limit, timeouts, 5xx)
    pub retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            ..RetryPolicy::default()
        }
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        RetryPolicy::new(1, 0, 0)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1:
    /// base * 2^(attempt-1), capped at max_delay_ms
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn is_retryable(&self, error: &StoreError) -> bool {
        error
            .status()
            .map(|s| self.retryable_statuses.contains(&s))
            .unwrap_or(false)
    }

    /// Run `op`, sleeping with std::thread::sleep between attempts
    pub fn run<T>(&self, label: &str, op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        self.run_with(label, std::thread::sleep, op)
    }

    /// Run `op` with an injected sleeper (tests pass a recorder)
    pub fn run_with<T>(
        &self,
        label: &str,
        mut sleep: impl FnMut(Duration),
        mut op: impl FnMut() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && self.is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 32_000,
            retryable_statuses: vec![403, 408, 429, 500, 502, 503, 504],
        }
    }
}

// ============================================================================
// RETRYING STORE
// ============================================================================

/// Wraps any store so every call goes through the policy
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: TabularStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        RetryingStore { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: TabularStore> TabularStore for RetryingStore<S> {
    fn list_tabs(&self, workbook: &str) -> StoreResult<Vec<String>> {
        self.policy.run("list_tabs", || self.inner.list_tabs(workbook))
    }

    fn read_tab(&self, workbook: &str, tab: &str) -> StoreResult<Option<Table>> {
        self.policy.run("read_tab", || self.inner.read_tab(workbook, tab))
    }

    fn write_cells(&mut self, workbook: &str, tab: &str, updates: &[CellUpdate]) -> StoreResult<()> {
        let inner = &mut self.inner;
        self.policy
            .run("write_cells", || inner.write_cells(workbook, tab, updates))
    }

    fn duplicate_tab(&mut self, workbook: &str, from: &str, to: &str) -> StoreResult<()> {
        let inner = &mut self.inner;
        self.policy
            .run("duplicate_tab", || inner.duplicate_tab(workbook, from, to))
    }
}

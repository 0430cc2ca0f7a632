//! [`RuntimeConfig`]: ambient defaults a [`Client`](crate::client::Client)
//! is built with and threads through `context.config`.

use std::time::Duration;

use crate::clock::Backoff;

/// Runtime-wide defaults, overridable per-operation by modifiers but
/// otherwise shared by every `Store` a `Client` creates.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Bound on a [`MutationState`](crate::state::mutation::MutationState)'s
    /// history when no `mutation_history_limit`-style modifier overrides
    /// it.
    pub default_mutation_history_limit: usize,
    /// Default `retry` ceiling applied when an operation carries no
    /// explicit `retry(...)` modifier — `0` means "one attempt, no
    /// retries".
    pub default_retry_limit: u32,
    /// Default backoff policy for `retry`.
    pub default_backoff: Backoff,
    /// How long a `Store` waits after its last subscriber unsubscribes
    /// before tearing down its active tasks, so a rapid resubscribe (a
    /// UI remount, a reconnect) doesn't pay for a fresh fetch.
    pub idle_teardown_grace_period: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_mutation_history_limit: 25,
            default_retry_limit: 0,
            default_backoff: Backoff::fibonacci(),
            idle_teardown_grace_period: Duration::from_secs(0),
        }
    }
}

impl RuntimeConfig {
    /// Starts from the defaults; use the `with_*` builders to override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default mutation history bound.
    pub fn with_mutation_history_limit(mut self, limit: usize) -> Self {
        self.default_mutation_history_limit = limit;
        self
    }

    /// Overrides the default retry ceiling.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.default_retry_limit = limit;
        self
    }

    /// Overrides the default backoff policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.default_backoff = backoff;
        self
    }

    /// Overrides the idle teardown grace period.
    pub fn with_idle_teardown_grace_period(mut self, period: Duration) -> Self {
        self.idle_teardown_grace_period = period;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_zero_retries_and_twenty_five_history() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_retry_limit, 0);
        assert_eq!(config.default_mutation_history_limit, 25);
    }

    #[test]
    fn builders_override_individually() {
        let config = RuntimeConfig::new().with_retry_limit(5).with_mutation_history_limit(3);
        assert_eq!(config.default_retry_limit, 5);
        assert_eq!(config.default_mutation_history_limit, 3);
    }
}

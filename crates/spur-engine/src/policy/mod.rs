//! Retry, concurrency, and deadline policy for one engine run.

use std::time::Duration;

/// Bounds on how hard the engine tries before degrading output.
///
/// Regeneration never loops unbounded: each variant slot gets at most
/// `max_slot_retries` fresh attempts after its first candidate is
/// rejected, retries for different slots run concurrently up to
/// `slot_concurrency`, every collaborator call is cut off at
/// `call_timeout`, and the whole request is cut off at
/// `request_deadline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub max_slot_retries: u32,
    pub slot_concurrency: usize,
    pub call_timeout: Duration,
    pub request_deadline: Duration,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            max_slot_retries: 2,
            slot_concurrency: 2,
            call_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(90),
        }
    }
}

impl SelectionPolicy {
    pub fn with_max_slot_retries(mut self, retries: u32) -> Self {
        self.max_slot_retries = retries;
        self
    }

    pub fn with_slot_concurrency(mut self, concurrency: usize) -> Self {
        self.slot_concurrency = concurrency.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let policy = SelectionPolicy::default();
        assert_eq!(policy.max_slot_retries, 2);
        assert_eq!(policy.slot_concurrency, 2);
        assert!(policy.call_timeout < policy.request_deadline);
    }

    #[test]
    fn concurrency_floor_is_one() {
        let policy = SelectionPolicy::default().with_slot_concurrency(0);
        assert_eq!(policy.slot_concurrency, 1);
    }
}

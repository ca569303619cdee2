// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry policy for chain endpoint polls.
//!
//! A relay link keeps two endpoints polled (the source receive loop and the
//! destination monitor loop). Transient transport failures must not kill the
//! link, but an endpoint that stays unreachable has to surface as a fatal
//! error so the operator notices instead of the relay idling forever.

use std::time::Duration;

use backoff::backoff::Backoff;

/// Fixed-interval retry with an outage budget.
///
/// Each failed poll spends one unit of the budget and waits the poll
/// interval; a successful poll refills it. When the budget is spent,
/// [`next_delay`](PollRetry::next_delay) returns `None` and the caller is
/// expected to tear the link down with the underlying error.
///
/// Also usable as a [`Backoff`] policy wherever a retried future wants the
/// same outage semantics.
#[derive(Debug)]
pub struct PollRetry {
    interval: Duration,
    budget: usize,
    remaining: usize,
}

impl PollRetry {
    /// Consecutive failed polls tolerated before an endpoint outage is
    /// considered fatal.
    pub const OUTAGE_BUDGET: usize = 30;

    /// A policy polling at `interval` with the default outage budget.
    pub fn new(interval: Duration) -> Self {
        Self::with_budget(interval, Self::OUTAGE_BUDGET)
    }

    /// A policy with an explicit outage budget.
    pub fn with_budget(interval: Duration, budget: usize) -> Self {
        Self {
            interval,
            budget,
            remaining: budget,
        }
    }

    /// Spends one unit of the budget, returning how long to wait before the
    /// next poll, or `None` once the outage budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }

    /// Refills the outage budget after a successful poll.
    pub fn succeeded(&mut self) {
        self.remaining = self.budget;
    }
}

impl Backoff for PollRetry {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.next_delay()
    }

    fn reset(&mut self) {
        self.succeeded();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_the_outage_budget() {
        let mut retry = PollRetry::with_budget(Duration::from_millis(50), 2);
        assert_eq!(retry.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(retry.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(retry.next_delay(), None);
    }

    #[test]
    fn a_successful_poll_refills_the_budget() {
        let mut retry = PollRetry::with_budget(Duration::from_secs(1), 1);
        assert!(retry.next_delay().is_some());
        assert_eq!(retry.next_delay(), None);
        retry.succeeded();
        assert!(retry.next_delay().is_some());
    }

    #[test]
    fn default_budget_matches_the_constant() {
        let mut retry = PollRetry::new(Duration::from_secs(1));
        for _ in 0..PollRetry::OUTAGE_BUDGET {
            assert!(retry.next_delay().is_some());
        }
        assert_eq!(retry.next_delay(), None);
    }

    #[test]
    fn composes_as_a_backoff_policy() {
        let mut retry = PollRetry::with_budget(Duration::from_millis(10), 1);
        assert_eq!(
            Backoff::next_backoff(&mut retry),
            Some(Duration::from_millis(10))
        );
        assert_eq!(Backoff::next_backoff(&mut retry), None);
        Backoff::reset(&mut retry);
        assert!(Backoff::next_backoff(&mut retry).is_some());
    }
}

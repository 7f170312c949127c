//! What to do with a message whose handler failed.

/// Settlement policy for failed deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryPolicy {
    /// Nack with requeue, forever. A message that always fails circulates
    /// until an operator intervenes.
    Requeue,
    /// Republish with an incremented retry counter, then move the message to
    /// the dead-letter queue once `max_retries` retries have failed.
    Bounded {
        /// Retries allowed after the first delivery
        max_retries: u32,
    },
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::Bounded { max_retries: 5 }
    }
}

impl RedeliveryPolicy {
    /// `0` selects [`RedeliveryPolicy::Requeue`], anything else a bounded policy.
    #[must_use]
    pub const fn from_max_retries(max_retries: u32) -> Self {
        if max_retries == 0 {
            Self::Requeue
        } else {
            Self::Bounded { max_retries }
        }
    }

    /// Decide the fate of a failed delivery that had already been retried
    /// `retry_count` times.
    #[must_use]
    pub const fn decide(self, retry_count: u32) -> RedeliveryDecision {
        match self {
            Self::Requeue => RedeliveryDecision::Requeue,
            Self::Bounded { max_retries } if retry_count < max_retries => {
                RedeliveryDecision::Retry {
                    next_retry_count: retry_count + 1,
                }
            }
            Self::Bounded { .. } => RedeliveryDecision::DeadLetter,
        }
    }
}

/// Outcome of [`RedeliveryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryDecision {
    /// Nack with requeue
    Requeue,
    /// Republish to the same queue, then ack the original
    Retry {
        /// Counter carried by the republished copy
        next_retry_count: u32,
    },
    /// Publish to the dead-letter queue, then ack the original
    DeadLetter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_requeue_forever() {
        let policy = RedeliveryPolicy::from_max_retries(0);
        assert_eq!(policy, RedeliveryPolicy::Requeue);
        assert_eq!(policy.decide(1_000), RedeliveryDecision::Requeue);
    }

    #[test]
    fn bounded_policy_retries_then_dead_letters() {
        let policy = RedeliveryPolicy::from_max_retries(2);

        assert_eq!(policy.decide(0), RedeliveryDecision::Retry { next_retry_count: 1 });
        assert_eq!(policy.decide(1), RedeliveryDecision::Retry { next_retry_count: 2 });
        assert_eq!(policy.decide(2), RedeliveryDecision::DeadLetter);
        assert_eq!(policy.decide(7), RedeliveryDecision::DeadLetter);
    }

    #[test]
    fn default_allows_five_retries() {
        assert_eq!(RedeliveryPolicy::default(), RedeliveryPolicy::Bounded { max_retries: 5 });
    }
}

use std::time::Duration;

/// Bounded, linearly backed-off reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries allowed before the session gives up and reports `Errored`.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    /// How long a pairing credential stays on offer.
    pub pairing_ttl: Duration,
}

impl ReconnectPolicy {
    pub const MAX_ATTEMPTS: u32 = 5;
    pub const BASE_DELAY: Duration = Duration::from_secs(5);
    pub const CAP_DELAY: Duration = Duration::from_secs(30);
    pub const PAIRING_TTL: Duration = Duration::from_secs(60);

    /// `min(attempt * base_delay, cap_delay)` for a 1-indexed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt.max(1))
            .map_or(self.cap_delay, |d| d.min(self.cap_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::MAX_ATTEMPTS,
            base_delay: Self::BASE_DELAY,
            cap_delay: Self::CAP_DELAY,
            pairing_ttl: Self::PAIRING_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_is_capped() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_secs(5));
        assert_eq!(p.delay_for(2), Duration::from_secs(10));
        assert_eq!(p.delay_for(4), Duration::from_secs(20));
        assert_eq!(p.delay_for(6), Duration::from_secs(30));
        assert_eq!(p.delay_for(7), Duration::from_secs(30));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn defaults_match_constants() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.pairing_ttl, Duration::from_secs(60));
    }
}

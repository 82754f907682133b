use std::time::Duration;

/// Redelivery policy for failed webhook jobs.
/// Each failed receive hides the job for an exponentially growing delay until
/// the attempt budget is spent, after which the job is dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    max_attempts: u32,

    base_delay: Duration,

    max_delay: Duration,
}

impl RetryStrategy {
    /// Create a new retry strategy
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(300),
        }
    }

    /// 2s, 4s, 8s, 16s between five attempts, capped at five minutes
    pub fn default_strategy() -> Self {
        Self::new(5, Duration::from_secs(2))
    }

    /// Set maximum delay cap
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Get maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before redelivering a job whose `attempt`-th delivery (1-based) failed.
    ///
    /// `None` means the attempt budget is exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }

        // Exponential backoff: base * 2^(attempt-1)
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(multiplier);

        Some(delay.min(self.max_delay))
    }

    /// Check if a job may be redelivered after its `attempt`-th failure
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Get all retry delays for visualization/testing
    pub fn get_all_delays(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.next_delay(attempt))
            .collect()
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::default_strategy()
    }
}

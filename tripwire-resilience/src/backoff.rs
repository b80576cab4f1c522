//! Exponential backoff with full jitter

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Growth factor between consecutive retry delays
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Backoff delay calculator.
///
/// The delay before retry `n` (0 after the first failure) is
/// `base_delay * 2^n`. With jitter the actual delay is drawn uniformly from
/// `[0, base_delay * 2^n]` ("full jitter"), so many callers retrying the same
/// dependency spread out instead of retrying in lockstep.
#[derive(Debug)]
pub struct BackoffCalculator {
    base_delay: Duration,
    jitter: bool,
    rng: Mutex<StdRng>,
}

impl BackoffCalculator {
    /// Create a calculator seeded from OS entropy
    pub fn new(base_delay: Duration, jitter: bool) -> Self {
        Self::with_rng(base_delay, jitter, StdRng::from_entropy())
    }

    /// Create a calculator with a reproducible jitter sequence
    pub fn seeded(base_delay: Duration, jitter: bool, seed: u64) -> Self {
        Self::with_rng(base_delay, jitter, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(base_delay: Duration, jitter: bool, rng: StdRng) -> Self {
        Self {
            base_delay,
            jitter,
            rng: Mutex::new(rng),
        }
    }

    /// Un-jittered delay for retry `n`, saturating instead of overflowing
    pub fn exponential_delay(&self, retry: u32) -> Duration {
        BACKOFF_MULTIPLIER
            .checked_pow(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Delay to sleep before retry `n`
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let delay = self.exponential_delay(retry);
        if self.jitter {
            self.full_jitter(delay)
        } else {
            delay
        }
    }

    fn full_jitter(&self, ceiling: Duration) -> Duration {
        let ceiling_nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        let nanos = self.rng.lock().gen_range(0..=ceiling_nanos);
        Duration::from_nanos(nanos)
    }
}

//! Token bucket implementation.

use parking_lot::Mutex;
use std::time::Instant;

/// Mutable state of a bucket, guarded as one unit.
#[derive(Debug)]
struct BucketState {
    /// Tokens currently stored
    available: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

/// A thread-safe token bucket.
///
/// Tokens accumulate at `rate` per second up to `burst`, and every successful
/// [`try_acquire`](Self::try_acquire) removes exactly one. The bucket starts
/// full. Refill and consumption happen under a single lock so concurrent
/// callers can never observe more than `burst` tokens in total.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second
    rate: f64,
    /// Maximum stored tokens
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket holding one second's worth of `rate`.
    ///
    /// The burst is never below a single token, so a fractional rate still
    /// admits its first request.
    pub fn new(rate: f64) -> Self {
        Self::with_burst(rate, rate)
    }

    /// Create a bucket with an explicit burst capacity.
    ///
    /// A burst below one token is raised to one.
    pub fn with_burst(rate: f64, burst: f64) -> Self {
        Self::starting_at(rate, burst, Instant::now())
    }

    fn starting_at(rate: f64, burst: f64, now: Instant) -> Self {
        let burst = burst.max(1.0);
        Self {
            rate: rate.max(0.0),
            burst,
            state: Mutex::new(BucketState {
                available: burst,
                last_refill: now,
            }),
        }
    }

    /// Try to take one token now. Never blocks waiting for tokens.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Try to take one token as observed at `now`.
    ///
    /// An instant earlier than the last refill adds nothing.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.available >= 1.0 {
            state.available -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens stored right now, after refilling. Does not consume.
    pub fn available(&self) -> f64 {
        self.available_at(Instant::now())
    }

    /// Tokens stored as observed at `now`, after refilling. Does not consume.
    pub fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.available
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum stored tokens.
    pub fn burst(&self) -> f64 {
        self.burst
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }

        state.available = (state.available + elapsed.as_secs_f64() * self.rate).min(self.burst);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(10.0);
        assert_eq!(bucket.rate(), 10.0);
        assert_eq!(bucket.burst(), 10.0);
        assert!((bucket.available() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_burst_then_reject_then_refill() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(2.0, 2.0, start);

        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));

        // Half a second at 2 tokens/sec buys exactly one more
        let later = start + Duration::from_millis(500);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn test_burst_with_real_clock() {
        let bucket = TokenBucket::new(2.0);

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        thread::sleep(Duration::from_millis(600));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_fractional_rate_admits_first_request() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(0.5, 0.5, start);

        assert_eq!(bucket.burst(), 1.0);
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start + Duration::from_secs(1)));
        assert!(bucket.try_acquire_at(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(5.0, 5.0, start);

        let much_later = start + Duration::from_secs(3600);
        assert_eq!(bucket.available_at(much_later), 5.0);
    }

    #[test]
    fn test_failed_acquire_does_not_consume() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(1.0, 1.0, start);

        assert!(bucket.try_acquire_at(start));
        let quarter = start + Duration::from_millis(250);
        assert!(!bucket.try_acquire_at(quarter));
        assert!((bucket.available_at(quarter) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_earlier_instant_adds_nothing() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(1.0, 1.0, start + Duration::from_secs(1));

        assert!(bucket.try_acquire_at(start + Duration::from_secs(1)));
        assert!(!bucket.try_acquire_at(start));
        assert_eq!(bucket.available_at(start), 0.0);
    }

    #[test]
    fn test_explicit_burst_below_one_raised() {
        let bucket = TokenBucket::with_burst(4.0, 0.25);
        assert_eq!(bucket.burst(), 1.0);
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_explicit_burst() {
        let start = Instant::now();
        let bucket = TokenBucket::starting_at(1.0, 3.0, start);

        for _ in 0..3 {
            assert!(bucket.try_acquire_at(start));
        }
        assert!(!bucket.try_acquire_at(start));
    }

    #[test]
    fn test_concurrent_admissions_bounded() {
        let rate = 50.0;
        let bucket = Arc::new(TokenBucket::new(rate));
        let started = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || {
                    let mut admitted = 0u64;
                    for _ in 0..500 {
                        if bucket.try_acquire() {
                            admitted += 1;
                        }
                    }
                    admitted
                })
            })
            .collect();

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let elapsed = started.elapsed().as_secs_f64();
        let ceiling = (bucket.burst() + rate * elapsed).ceil() as u64;

        assert!(total >= bucket.burst() as u64);
        assert!(total <= ceiling, "admitted {total}, ceiling {ceiling}");
    }
}

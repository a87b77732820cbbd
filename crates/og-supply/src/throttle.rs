//! Token-bucket throttling for write bodies
//!
//! Tokens are bytes. The bucket refills at a fixed rate and accumulates up to
//! one second's worth of burst; a writer that outruns the rate blocks until
//! enough permits accrue.

use parking_lot::Mutex;
use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Scale factor for sub-token precision
const SCALE: u64 = 1000;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    inner: Mutex<BucketState>,
    /// Tokens added per second, scaled
    refill_rate: u64,
    /// Maximum tokens (burst capacity), scaled
    max_tokens: u64,
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket sustaining `rate` tokens per second with `burst`
    /// capacity; a zero rate is clamped to one token per second
    pub fn new(rate: u64, burst: u64) -> Self {
        Self {
            inner: Mutex::new(BucketState {
                tokens: burst.saturating_mul(SCALE),
                last_refill: Instant::now(),
            }),
            refill_rate: rate.saturating_mul(SCALE).max(1),
            max_tokens: burst.saturating_mul(SCALE),
        }
    }

    /// A bucket whose burst equals one second of the sustained rate
    pub fn per_second(rate: u64) -> Self {
        Self::new(rate, rate)
    }

    /// Take `count` tokens if available
    pub fn try_acquire(&self, count: u64) -> bool {
        let mut state = self.inner.lock();
        self.refill(&mut state);
        let need = count.saturating_mul(SCALE);
        if state.tokens >= need {
            state.tokens -= need;
            true
        } else {
            false
        }
    }

    /// Take `count` tokens, sleeping until they accrue
    ///
    /// Requests larger than the burst capacity drain the bucket repeatedly,
    /// so a single oversized write still pays the full rate-limited wait.
    pub fn acquire(&self, count: u64) {
        let mut needed = count.saturating_mul(SCALE);
        loop {
            let wait = {
                let mut state = self.inner.lock();
                self.refill(&mut state);
                let take = needed.min(state.tokens);
                state.tokens -= take;
                needed -= take;
                if needed == 0 {
                    return;
                }
                // Sleep until the remainder (at most one bucket) refills.
                let deficit = needed.min(self.max_tokens.max(SCALE));
                Duration::from_nanos(deficit.saturating_mul(1_000_000_000) / self.refill_rate)
            };
            std::thread::sleep(wait);
        }
    }

    /// Tokens currently available
    pub fn available(&self) -> u64 {
        let mut state = self.inner.lock();
        self.refill(&mut state);
        state.tokens / SCALE
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let added = (elapsed.as_nanos() as u64).saturating_mul(self.refill_rate) / 1_000_000_000;
        if added > 0 {
            state.tokens = (state.tokens + added).min(self.max_tokens);
            state.last_refill = now;
        }
    }
}

/// A reader that meters bytes through a token bucket
pub struct ThrottledReader<R> {
    inner: R,
    bucket: TokenBucket,
}

impl<R: Read> ThrottledReader<R> {
    /// Wrap `inner`, limiting throughput to `bytes_per_sec`
    pub fn new(inner: R, bytes_per_sec: u64) -> Self {
        Self {
            inner,
            bucket: TokenBucket::per_second(bytes_per_sec),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ThrottledReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.bucket.acquire(n as u64);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Instant;

    #[test]
    fn test_try_acquire_drains_burst() {
        let bucket = TokenBucket::new(100, 10);
        assert!(bucket.try_acquire(10));
        assert!(!bucket.try_acquire(10));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let bucket = TokenBucket::new(1000, 100);
        assert!(bucket.try_acquire(100));
        std::thread::sleep(Duration::from_millis(50));
        // ~50 tokens accrued at 1000/s
        assert!(bucket.try_acquire(20));
    }

    #[test]
    fn test_throttled_read_takes_expected_time() {
        // 5000 bytes at 1000 B/s: the first 1000 ride the burst, the
        // remaining 4000 take four seconds.
        let data = vec![7u8; 5000];
        let mut reader = ThrottledReader::new(Cursor::new(data), 1000);
        let start = Instant::now();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 5000);
        assert!(
            start.elapsed() >= Duration::from_secs(4),
            "finished in {:?}",
            start.elapsed()
        );
    }
}

// ── Mentor Engine: HTTP Retry & Circuit Breaker ────────────────────────────
//
// Shared retry utilities used by the streaming orchestrator and the
// embedding client.
//
// Features:
//   • Exponential backoff with ±25% jitter (base 1s, doubling, cap 8s)
//   • Retry on 429 (rate limit), 500, 502, 503, 504, 529
//   • Respects `Retry-After` header
//   • Circuit breaker: 5 consecutive failures → fail fast for 60s
//
// Retries here are pre-stream only: the orchestrator never re-issues a call
// once a token has been delivered (that would duplicate output).

use log::warn;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::atoms::constants::{RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS};

// ── Retryable status detection ─────────────────────────────────────────────

// Defined next to ProviderError so the transience rule has one home.
pub use crate::atoms::traits::is_retryable_status;

// ── Backoff delay ──────────────────────────────────────────────────────────

/// Sleep with exponential backoff + ±25% jitter.
/// Respects a server-specified Retry-After delay if one was sent, floored at
/// the computed backoff and capped at 60s.
/// Returns the actual delay duration for logging. `attempt` is 0-based.
pub async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let base_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt.min(10));
    let capped_ms = base_ms.min(RETRY_MAX_DELAY_MS);
    let delay_ms = if let Some(secs) = retry_after_secs {
        (secs.min(60) * 1000).max(capped_ms)
    } else {
        capped_ms
    };
    let jittered = apply_jitter(delay_ms);
    let delay = Duration::from_millis(jittered);
    tokio::time::sleep(delay).await;
    delay
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    let result = base_ms as i64 + offset;
    result.max(100) as u64
}

/// Simple jitter source using system clock nanos (no extra crate needed).
fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

// ── Retry-After header parsing ─────────────────────────────────────────────

/// Parse Retry-After header value (integer seconds only).
/// HTTP-date format is not implemented — falls back to computed backoff.
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

// ── Circuit Breaker ────────────────────────────────────────────────────────

/// A simple circuit breaker that trips after N consecutive failures,
/// then rejects requests for a cooldown period before allowing retries.
///
/// States:
///   Closed   — normal operation, requests pass through
///   Open     — rejecting requests (cooldown active)
///   HalfOpen — cooldown expired, one probe request allowed
pub struct CircuitBreaker {
    /// Number of consecutive failures.
    consecutive_failures: AtomicU32,
    /// Timestamp (epoch secs) when the circuit was tripped open.
    tripped_at: AtomicU64,
    /// Number of consecutive failures before tripping.
    threshold: u32,
    /// Cooldown period in seconds while circuit is open.
    cooldown_secs: u64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    /// - `threshold`: consecutive failures before tripping (default: 5)
    /// - `cooldown_secs`: wait before allowing probe requests (default: 60)
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    /// Check if a request should be allowed through.
    /// Returns `Ok(())` if allowed, `Err(message)` if circuit is open.
    pub fn check(&self) -> Result<(), String> {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.threshold {
            return Ok(());
        }

        let tripped = self.tripped_at.load(Ordering::Relaxed);
        let now = epoch_secs();

        if now - tripped < self.cooldown_secs {
            Err(format!(
                "Circuit breaker open: {} consecutive failures, cooling down for {}s",
                failures,
                self.cooldown_secs - (now - tripped)
            ))
        } else {
            // Half-open: allow one probe request through
            Ok(())
        }
    }

    /// Record a successful request — resets the failure counter.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.tripped_at.store(0, Ordering::Relaxed);
    }

    /// Record a failed request — increments the failure counter.
    /// If the threshold is reached, trips the circuit open.
    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.threshold {
            self.tripped_at.store(epoch_secs(), Ordering::Relaxed);
            warn!(
                "[circuit-breaker] Tripped after {} consecutive failures — cooling down {}s",
                prev + 1,
                self.cooldown_secs
            );
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ═════════════════════════════════════════════════════════════════════════════
// Tests
// ═════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for s in [429, 500, 502, 503, 504, 529] {
            assert!(is_retryable_status(s), "{} should be retryable", s);
        }
        for s in [200, 400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(s), "{} should not be retryable", s);
        }
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(5));
        assert_eq!(parse_retry_after(" 30 "), Some(30));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn jitter_stays_in_band() {
        for _ in 0..100 {
            let v = apply_jitter(1000);
            assert!((750..=1250).contains(&v), "jittered {} out of band", v);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_and_caps() {
        // base 1s, doubling, cap 8s (±25% jitter)
        let d0 = retry_delay(0, None).await.as_millis() as u64;
        let d1 = retry_delay(1, None).await.as_millis() as u64;
        let d3 = retry_delay(3, None).await.as_millis() as u64;
        assert!((750..=1250).contains(&d0));
        assert!((1500..=2500).contains(&d1));
        // attempt 3 → 8s base, capped at 8s
        assert!((6000..=10_000).contains(&d3));
    }

    #[test]
    fn breaker_trips_and_recovers() {
        let cb = CircuitBreaker::new(3, 60);
        assert!(cb.check().is_ok());
        cb.record_failure();
        cb.record_failure();
        assert!(cb.check().is_ok());
        cb.record_failure();
        assert!(cb.check().is_err());
        cb.record_success();
        assert!(cb.check().is_ok());
    }
}

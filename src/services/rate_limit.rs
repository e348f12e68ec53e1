// src/services/rate_limit.rs
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

struct LimiterState {
    in_flight: usize,
    last_admit: Option<Instant>,
}

/// Admission control for outbound provider calls, shared by all workers.
///
/// Two rules are enforced together: at most `max_in_flight` concurrent
/// calls, and at least `min_spacing` between consecutive admissions.
/// Admission is serialized through the internal mutex, so two workers can
/// never observe the same spacing slot.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    released: Condvar,
    max_in_flight: usize,
    min_spacing: Duration,
}

impl RateLimiter {
    pub fn new(max_in_flight: usize, min_spacing: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                in_flight: 0,
                last_admit: None,
            }),
            released: Condvar::new(),
            max_in_flight: max_in_flight.max(1),
            min_spacing,
        }
    }

    /// Block until both the concurrency cap and the spacing rule admit a
    /// call. The returned permit releases the slot on drop.
    pub fn acquire(&self) -> RateLimitPermit<'_> {
        let mut state = self.state.lock();
        loop {
            if state.in_flight >= self.max_in_flight {
                self.released.wait(&mut state);
                continue;
            }
            let now = Instant::now();
            let remaining = match state.last_admit {
                None => None,
                Some(last) => self.min_spacing.checked_sub(now.duration_since(last)),
            };
            match remaining {
                None | Some(Duration::ZERO) => {
                    state.in_flight += 1;
                    state.last_admit = Some(now);
                    return RateLimitPermit { limiter: self };
                }
                Some(wait) => {
                    // Sleep without the lock, then re-check: another worker
                    // may have been admitted in the meantime.
                    MutexGuard::unlocked(&mut state, || std::thread::sleep(wait));
                }
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

/// RAII slot handed out by [`RateLimiter::acquire`].
pub struct RateLimitPermit<'a> {
    limiter: &'a RateLimiter,
}

impl Drop for RateLimitPermit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

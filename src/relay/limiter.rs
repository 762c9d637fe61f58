//! Sliding-window command rate limiting.
//!
//! Each scope keeps the timestamps of the commands it admitted during the
//! trailing period. Windows are pruned lazily when a command is checked.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Rate limiting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared by every user.
    Global,
    /// One Discord user.
    User(u64),
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Try again after this long.
    Rejected(Duration),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Timestamps admitted for one scope.
#[derive(Debug, Default)]
struct RateWindow {
    times: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.times.front() {
            if now.saturating_duration_since(oldest) >= period {
                self.times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check without recording. Assumes `prune` was called.
    fn check(&self, now: Instant, limit: usize, period: Duration) -> Admission {
        if self.times.len() < limit {
            return Admission::Admitted;
        }
        match self.times.front() {
            Some(&oldest) => Admission::Rejected((oldest + period).saturating_duration_since(now)),
            // limit == 0 never admits; validation rejects that config
            None => Admission::Rejected(period),
        }
    }
}

/// Limits for one kind of scope.
#[derive(Debug, Clone, Copy)]
struct Limit {
    count: usize,
    period: Duration,
}

/// Sliding-window rate limiter over a global scope and optional per-user scopes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    global_limit: Limit,
    user_limit: Option<Limit>,
    global: Arc<Mutex<RateWindow>>,
    users: Arc<Mutex<HashMap<u64, Arc<Mutex<RateWindow>>>>>,
}

impl RateLimiter {
    /// `user_limit` enables the per-user scope with the same period.
    pub fn new(limit: u32, period: Duration, user_limit: Option<u32>) -> Self {
        Self {
            global_limit: Limit {
                count: limit as usize,
                period,
            },
            user_limit: user_limit.map(|count| Limit {
                count: count as usize,
                period,
            }),
            global: Arc::new(Mutex::new(RateWindow::default())),
            users: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Admit a command only if every scope in `scopes` admits it.
    ///
    /// Windows are locked in the order given, so callers list the global
    /// scope first and each scope at most once. Nothing is recorded on
    /// rejection; the retry delay is the longest among the rejecting scopes.
    /// A user scope without a configured limit admits everything.
    pub fn admit(&self, scopes: &[Scope], now: Instant) -> Admission {
        let windows: Vec<_> = scopes.iter().filter_map(|&scope| self.window(scope)).collect();
        let mut locked: Vec<_> = windows
            .iter()
            .map(|(window, limit)| (window.lock(), *limit))
            .collect();

        let mut retry_after: Option<Duration> = None;
        for (window, limit) in locked.iter_mut() {
            window.prune(now, limit.period);
            if let Admission::Rejected(delay) = window.check(now, limit.count, limit.period) {
                retry_after = Some(retry_after.map_or(delay, |d| d.max(delay)));
            }
        }

        let admission = retry_after.map_or(Admission::Admitted, Admission::Rejected);
        if admission.is_admitted() {
            for (window, _) in locked.iter_mut() {
                window.times.push_back(now);
            }
        }
        admission
    }

    /// Admit a command from `user_id` against the global and user windows.
    pub fn admit_user(&self, user_id: u64, now: Instant) -> Admission {
        self.admit(&[Scope::Global, Scope::User(user_id)], now)
    }

    /// Drop per-user windows that no longer hold any timestamps.
    pub fn prune_idle(&self, now: Instant) {
        let Some(limit) = self.user_limit else {
            return;
        };
        self.users.lock().retain(|_, window| {
            let mut window = window.lock();
            window.prune(now, limit.period);
            !window.times.is_empty()
        });
    }

    fn window(&self, scope: Scope) -> Option<(Arc<Mutex<RateWindow>>, Limit)> {
        match scope {
            Scope::Global => Some((Arc::clone(&self.global), self.global_limit)),
            Scope::User(id) => {
                let limit = self.user_limit?;
                let window = Arc::clone(self.users.lock().entry(id).or_default());
                Some((window, limit))
            }
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.users.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_limit_then_reject() {
        let limiter = RateLimiter::new(3, secs(10), None);
        let t0 = Instant::now();

        for i in 0..3 {
            assert_eq!(limiter.admit(&[Scope::Global], t0 + secs(i)), Admission::Admitted);
        }
        assert_eq!(
            limiter.admit(&[Scope::Global], t0 + secs(4)),
            Admission::Rejected(secs(6))
        );
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, secs(5), None);
        let t0 = Instant::now();

        assert!(limiter.admit(&[Scope::Global], t0).is_admitted());
        assert!(limiter.admit(&[Scope::Global], t0 + secs(1)).is_admitted());
        assert_eq!(
            limiter.admit(&[Scope::Global], t0 + secs(2)),
            Admission::Rejected(secs(3))
        );
        // Entries exactly one period old have expired.
        assert!(limiter.admit(&[Scope::Global], t0 + secs(6)).is_admitted());
        assert!(limiter.admit(&[Scope::Global], t0 + secs(6)).is_admitted());
        assert_eq!(
            limiter.admit(&[Scope::Global], t0 + secs(7)),
            Admission::Rejected(secs(4))
        );
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::new(1, secs(5), None);
        let t0 = Instant::now();

        assert!(limiter.admit(&[Scope::Global], t0).is_admitted());
        for i in 1..5 {
            assert!(!limiter.admit(&[Scope::Global], t0 + secs(i)).is_admitted());
        }
        assert!(limiter.admit(&[Scope::Global], t0 + secs(5)).is_admitted());
    }

    #[test]
    fn test_user_scope_disabled_by_default() {
        let limiter = RateLimiter::new(1, secs(5), None);
        let t0 = Instant::now();
        for _ in 0..10 {
            assert!(limiter.admit(&[Scope::User(7)], t0).is_admitted());
        }
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn test_admit_user_needs_both_scopes() {
        let limiter = RateLimiter::new(3, secs(10), Some(1));
        let t0 = Instant::now();

        assert!(limiter.admit_user(1, t0).is_admitted());
        // User 1 is out of budget even though the global window has room.
        assert_eq!(limiter.admit_user(1, t0 + secs(1)), Admission::Rejected(secs(9)));
        assert!(limiter.admit_user(2, t0 + secs(1)).is_admitted());
        assert!(limiter.admit_user(3, t0 + secs(2)).is_admitted());
        // Global window is now full.
        assert_eq!(limiter.admit_user(4, t0 + secs(3)), Admission::Rejected(secs(7)));
    }

    #[test]
    fn test_admit_user_rejection_leaves_windows_untouched() {
        let limiter = RateLimiter::new(1, secs(10), Some(5));
        let t0 = Instant::now();

        assert!(limiter.admit_user(1, t0).is_admitted());
        assert!(!limiter.admit_user(2, t0 + secs(1)).is_admitted());
        // User 2's rejected attempt must not count against it later.
        assert!(limiter.admit_user(2, t0 + secs(10)).is_admitted());
    }

    #[test]
    fn test_retry_after_is_longest() {
        let limiter = RateLimiter::new(1, secs(10), Some(1));
        let t0 = Instant::now();

        assert!(limiter.admit_user(1, t0).is_admitted());
        assert_eq!(limiter.admit_user(1, t0 + secs(4)), Admission::Rejected(secs(6)));
    }

    #[test]
    fn test_prune_idle_users() {
        let limiter = RateLimiter::new(10, secs(5), Some(2));
        let t0 = Instant::now();

        limiter.admit_user(1, t0);
        limiter.admit_user(2, t0 + secs(3));
        assert_eq!(limiter.tracked_users(), 2);

        limiter.prune_idle(t0 + secs(6));
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_concurrent_admission() {
        let limiter = RateLimiter::new(50, secs(60), None);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.admit(&[Scope::Global], now).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}

//! Process-local rate limiter.
//!
//! Counters live in this process only: when several server processes share
//! one logical app, each enforces its own budget and the effective limit is
//! multiplied by the process count. Use a shared-store driver for
//! multi-process deployments.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{ConsumeResult, Consumption, RateLimiterDriver, WINDOW};

struct Window {
    started_at: Instant,
    consumed: i64,
}

pub struct MemoryRateLimiter {
    windows: DashMap<String, Mutex<Window>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterDriver for MemoryRateLimiter {
    async fn consume(&self, key: &str, max_per_minute: i64, points: u32) -> ConsumeResult {
        if max_per_minute < 0 {
            return ConsumeResult::Unlimited;
        }

        let entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| {
                Mutex::new(Window {
                    started_at: Instant::now(),
                    consumed: 0,
                })
            });

        // Check-and-consume under the entry lock so racing calls serialize.
        let mut window = entry.lock();

        let now = Instant::now();
        let elapsed = now.duration_since(window.started_at);
        if elapsed >= WINDOW {
            window.started_at = now;
            window.consumed = 0;
        }

        let reset_after = WINDOW.saturating_sub(now.duration_since(window.started_at));
        let remaining = max_per_minute - window.consumed;

        if i64::from(points) <= remaining {
            window.consumed += i64::from(points);
            ConsumeResult::Granted(Consumption {
                limit: max_per_minute,
                remaining: max_per_minute - window.consumed,
                reset_after,
            })
        } else {
            ConsumeResult::Denied(Consumption {
                limit: max_per_minute,
                remaining,
                reset_after,
            })
        }
    }
}

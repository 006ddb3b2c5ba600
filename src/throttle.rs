// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded in-process throttle for audit rows written on behalf of
//! unauthenticated callers.
//!
//! Each key (a username or moderator name) gets at most one admitted
//! failure per window. Failures inside the window are only counted, and the
//! count is handed to the next admitted one. Keys are held in an LRU so a
//! flood of distinct names cannot grow memory without bound.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Default number of distinct keys remembered.
pub const DEFAULT_THROTTLE_CAPACITY: usize = 4096;

/// Default spacing between admitted failures for one key.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(60);

struct Window {
    opened: Instant,
    suppressed: u32,
}

pub struct FailureThrottle {
    seen: Mutex<LruCache<String, Window>>,
    window: Duration,
}

impl FailureThrottle {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            seen: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            window,
        }
    }

    /// Count a failure for `key`.
    ///
    /// Returns `Some(suppressed)` when this failure should be recorded, with
    /// the number of failures swallowed since the last recorded one, or
    /// `None` while the key's window is still open.
    pub fn admit(&self, key: &str) -> Option<u32> {
        let Ok(mut seen) = self.seen.lock() else {
            return Some(0);
        };

        if let Some(window) = seen.get_mut(key) {
            if window.opened.elapsed() < self.window {
                window.suppressed = window.suppressed.saturating_add(1);
                return None;
            }
            let suppressed = window.suppressed;
            window.opened = Instant::now();
            window.suppressed = 0;
            return Some(suppressed);
        }

        seen.put(
            key.to_string(),
            Window {
                opened: Instant::now(),
                suppressed: 0,
            },
        );
        Some(0)
    }
}

impl Default for FailureThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_CAPACITY, DEFAULT_THROTTLE_WINDOW)
    }
}

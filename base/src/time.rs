// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Monotonic-clock helpers.
//!
//! The supervisor needs a timestamp that has an exact "never" sentinel (zero)
//! and supports millisecond arithmetic with explicit rounding, which
//! `std::time::Instant` doesn't expose. So, as in the original
//! `TimespecUtils.c`, we model time as a `CLOCK_MONOTONIC` timespec rather
//! than wrapping `Instant`.

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A `CLOCK_MONOTONIC` timestamp. The all-zero value is reserved to mean
/// "never" (see `StdioStream::last_flush` in the supervisor crate) and is
/// distinguishable from any real reading: `CLOCK_MONOTONIC` starts running
/// before this process exists, so an actual reading of exactly zero seconds
/// and zero nanoseconds cannot occur in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonotonicTime {
    pub secs: i64,
    pub nanos: i64,
}

impl MonotonicTime {
    pub const ZERO: MonotonicTime = MonotonicTime { secs: 0, nanos: 0 };

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    /// Adds `delta_ms` (may be negative) to `self`, normalizing `nanos` back
    /// into `[0, 1_000_000_000)`.
    pub fn add_millis(&self, delta_ms: i64) -> MonotonicTime {
        let mut secs = self.secs + delta_ms / 1000;
        let mut nanos = self.nanos + (delta_ms % 1000) * NANOS_PER_MILLI;

        // Round division towards negative infinity so nanos always lands in
        // [0, NANOS_PER_SEC), matching normalizeTimespec() in the original.
        let excess_secs = nanos.div_euclid(NANOS_PER_SEC);
        secs += excess_secs;
        nanos -= excess_secs * NANOS_PER_SEC;

        MonotonicTime { secs, nanos }
    }

    /// Milliseconds from `self` to `other` (may be negative).
    pub fn millis_until(&self, other: MonotonicTime) -> i64 {
        (other.secs - self.secs) * 1000 + (other.nanos - self.nanos) / NANOS_PER_MILLI
    }
}

/// Reads `CLOCK_MONOTONIC`.
pub fn monotonic_now() -> MonotonicTime {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid, appropriately sized out-parameter.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    MonotonicTime {
        secs: ts.tv_sec as i64,
        nanos: ts.tv_nsec as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_exact() {
        assert!(MonotonicTime::ZERO.is_zero());
        assert!(!MonotonicTime {
            secs: 0,
            nanos: 1
        }
        .is_zero());
        assert!(!MonotonicTime {
            secs: 1,
            nanos: 0
        }
        .is_zero());
    }

    #[test]
    fn add_then_diff_round_trips() {
        let t = MonotonicTime {
            secs: 100,
            nanos: 900_000_000,
        };
        for delta in [-2_147_000_000i64, -1500, -1, 0, 1, 1500, 2_147_000_000] {
            let added = t.add_millis(delta);
            assert_eq!(t.millis_until(added), delta);
            assert!(added.nanos >= 0 && added.nanos < NANOS_PER_SEC);
        }
    }

    #[test]
    fn add_millis_normalizes_negative_nanos() {
        let t = MonotonicTime { secs: 5, nanos: 100 };
        let result = t.add_millis(-1);
        assert!(result.nanos >= 0 && result.nanos < NANOS_PER_SEC);
        assert_eq!(result.secs, 4);
        assert_eq!(result.nanos, 999_000_100);
    }

    #[test]
    fn monotonic_now_is_nonzero_and_normalized() {
        let now = monotonic_now();
        assert!(!now.is_zero());
        assert!(now.nanos >= 0 && now.nanos < NANOS_PER_SEC);
    }
}

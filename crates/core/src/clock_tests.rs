// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock tests

use super::*;

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn fake_clock_stands_still() {
    let clock = FakeClock::new();
    assert_eq!(clock.now(), clock.now());
}

#[test]
fn fake_clock_advances_by_request() {
    let clock = FakeClock::new();
    let start = clock.now();
    clock.advance(Duration::from_secs(10));
    assert_eq!(clock.now() - start, Duration::from_secs(10));
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.now(), other.now());
}

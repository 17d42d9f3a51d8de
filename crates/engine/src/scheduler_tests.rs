// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tests

use super::*;

const SEC: Duration = Duration::from_secs(1);

#[test]
fn unexpired_timers_do_not_fire() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), 5 * SEC, now);

    assert!(scheduler.fired(now + 4 * SEC).is_empty());
    assert!(!scheduler.is_empty());
}

#[test]
fn expired_timers_fire_once() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), 5 * SEC, now);

    assert_eq!(scheduler.fired(now + 5 * SEC), vec![JobId(1)]);
    assert!(scheduler.fired(now + 10 * SEC).is_empty());
    assert!(scheduler.is_empty());
}

#[test]
fn fired_returns_earliest_first() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), 5 * SEC, now);
    scheduler.set(JobId(2), 2 * SEC, now);

    assert_eq!(scheduler.fired(now + 10 * SEC), vec![JobId(2), JobId(1)]);
}

#[test]
fn cancel_disarms() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), SEC, now);
    scheduler.cancel(JobId(1));
    assert!(scheduler.fired(now + 2 * SEC).is_empty());
}

#[test]
fn set_rearms_existing_timer() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), SEC, now);
    scheduler.set(JobId(1), 10 * SEC, now);
    assert!(scheduler.fired(now + 5 * SEC).is_empty());
}

#[test]
fn next_deadline_is_the_minimum() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    assert!(scheduler.next_deadline().is_none());

    scheduler.set(JobId(1), 5 * SEC, now);
    scheduler.set(JobId(2), 2 * SEC, now);
    assert_eq!(scheduler.next_deadline(), Some(now + 2 * SEC));
}

#[test]
fn remaining_saturates_at_zero() {
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.set(JobId(1), 2 * SEC, now);

    assert_eq!(scheduler.remaining(JobId(1), now + SEC), Some(SEC));
    assert_eq!(scheduler.remaining(JobId(1), now + 5 * SEC), Some(Duration::ZERO));
    assert_eq!(scheduler.remaining(JobId(2), now), None);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Re-exec state snapshot
//!
//! Serialises the complete supervisor graph so the binary can replace
//! itself without losing track of anything it supervises.

mod snapshot;

pub use snapshot::{capture, Restored, Snapshot, SnapshotError, SNAPSHOT_VERSION};

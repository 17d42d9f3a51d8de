// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervision domains
//!
//! Events and job classes may be scoped to a session: the system-wide
//! domain (no session) or a per-user/chroot domain. Events carrying a
//! session only affect classes registered in the same session.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Index into the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub usize);

/// A supervision domain beyond the system-wide one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owning user, if this is a per-user domain.
    pub user: Option<u32>,
    /// Root directory, if this is a chroot domain.
    pub chroot: Option<PathBuf>,
}

impl Session {
    pub fn for_user(user: u32) -> Self {
        Self {
            user: Some(user),
            chroot: None,
        }
    }

    pub fn for_chroot(chroot: PathBuf) -> Self {
        Self {
            user: None,
            chroot: Some(chroot),
        }
    }
}

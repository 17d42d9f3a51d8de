// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced to control callers

use crate::process::ProcessType;
use thiserror::Error;

/// Errors reported by the supervisor core to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("{0} is already started")]
    AlreadyStarted(String),

    #[error("{0} is already stopped")]
    AlreadyStopped(String),

    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("event failed: {0}")]
    EventFailed(String),

    #[error("failed to spawn {job} {process} process: {message}")]
    SpawnFailed {
        job: String,
        process: ProcessType,
        message: String,
    },

    #[error("failed to expand instance for {class}: {message}")]
    BadInstance { class: String, message: String },
}

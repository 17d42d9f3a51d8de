// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket protocol
//!
//! Length-prefixed (u32, big endian) JSON frames over a unix socket,
//! one request/response pair per connection. A `wait` request holds the
//! connection open until the supervisor resolves the reply.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use warden_core::CoreError;

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a frame; anything larger is a broken or hostile peer.
const MAX_MESSAGE: u32 = 1 << 20;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {0} bytes")]
    TooLarge(u32),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Requests accepted by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Ping,
    Status,
    List,
    Start {
        name: String,
        env: Vec<String>,
        wait: bool,
    },
    Stop {
        name: String,
        env: Vec<String>,
        wait: bool,
    },
    Restart {
        name: String,
        env: Vec<String>,
        wait: bool,
    },
    Emit {
        name: String,
        env: Vec<String>,
        wait: bool,
    },
    Reload,
    Reexec,
    Shutdown,
}

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub instance: String,
    pub goal: String,
    pub state: String,
    pub pid: Option<i32>,
}

/// Error kinds surfaced over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownJob,
    AlreadyStarted,
    AlreadyStopped,
    PermissionDenied,
    JobFailed,
    EventFailed,
    SpawnFailed,
    BadRequest,
    Internal,
}

impl From<&CoreError> for ErrorKind {
    fn from(error: &CoreError) -> Self {
        match error {
            CoreError::UnknownJob(_) => ErrorKind::UnknownJob,
            CoreError::AlreadyStarted(_) => ErrorKind::AlreadyStarted,
            CoreError::AlreadyStopped(_) => ErrorKind::AlreadyStopped,
            CoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CoreError::JobFailed(_) => ErrorKind::JobFailed,
            CoreError::EventFailed(_) => ErrorKind::EventFailed,
            CoreError::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            CoreError::BadInstance { .. } => ErrorKind::BadRequest,
        }
    }
}

/// Responses sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Pong,
    Ok,
    Status {
        version: u32,
        uptime_secs: u64,
        classes: usize,
        instances: usize,
        events_pending: usize,
    },
    Jobs {
        jobs: Vec<JobInfo>,
    },
    Restarting,
    ShuttingDown,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn error(error: &CoreError) -> Self {
        Response::Error {
            kind: error.into(),
            message: error.to_string(),
        }
    }
}

/// Encode a value as a raw JSON frame body (no length prefix).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a frame body.
pub fn decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(data)?)
}

/// Read one length-prefixed frame.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix);
    if len > MAX_MESSAGE {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed frame.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(data.len()).map_err(|_| ProtocolError::TooLarge(u32::MAX))?;
    if len > MAX_MESSAGE {
        return Err(ProtocolError::TooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

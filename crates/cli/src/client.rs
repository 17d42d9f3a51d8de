// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UnixStream;
use warden_daemon::protocol::{self, ProtocolError, Request, Response};

/// Timeout for requests that resolve immediately. Wait-style requests
/// block as long as the transition takes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running (socket {0})")]
    DaemonNotRunning(PathBuf),

    #[error("request timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// One-shot control connection.
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and read the response. `wait` disables the
    /// response timeout for requests that block on job transitions.
    pub async fn request(&self, request: &Request, wait: bool) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::DaemonNotRunning(self.socket_path.clone()))?;

        let frame = protocol::encode(request)?;
        protocol::write_message(&mut stream, &frame).await?;

        let reply = if wait {
            protocol::read_message(&mut stream).await?
        } else {
            tokio::time::timeout(REQUEST_TIMEOUT, protocol::read_message(&mut stream))
                .await
                .map_err(|_| ClientError::Timeout)??
        };
        Ok(protocol::decode(&reply)?)
    }
}

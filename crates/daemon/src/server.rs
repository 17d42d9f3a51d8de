// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.
//!
//! Each connection is one request/response exchange. Connections are
//! handled on their own tasks and funnel requests to the main task over
//! a channel, so all supervisor mutation stays single-threaded; a wait
//! request simply leaves its response channel pending.

use std::time::Duration;

use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use warden_daemon::protocol::{self, ProtocolError, Request, Response};

/// A request paired with where to send its response.
pub type ControlRequest = (Request, oneshot::Sender<Response>);

/// Time allowed for a client to produce its request.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single client connection.
pub async fn handle_connection(stream: UnixStream, requests: mpsc::Sender<ControlRequest>) {
    let (mut reader, mut writer) = stream.into_split();

    let frame = match tokio::time::timeout(READ_TIMEOUT, protocol::read_message(&mut reader)).await
    {
        Ok(Ok(frame)) => frame,
        Ok(Err(ProtocolError::ConnectionClosed)) => {
            debug!("client disconnected before sending a request");
            return;
        }
        Ok(Err(error)) => {
            error!(%error, "failed to read request");
            return;
        }
        Err(_) => {
            error!("request read timeout");
            return;
        }
    };

    let request: Request = match protocol::decode(&frame) {
        Ok(request) => request,
        Err(error) => {
            error!(%error, "malformed request");
            return;
        }
    };
    debug!(?request, "received request");

    let (reply_tx, reply_rx) = oneshot::channel();
    if requests.send((request, reply_tx)).await.is_err() {
        // Main loop is gone; nothing useful to answer with.
        return;
    }

    // Wait-style requests resolve whenever the supervisor says so; no
    // timeout here.
    let Ok(response) = reply_rx.await else {
        debug!("daemon dropped the reply channel");
        return;
    };

    debug!(?response, "sending response");
    let encoded = match protocol::encode(&response) {
        Ok(encoded) => encoded,
        Err(error) => {
            error!(%error, "failed to encode response");
            return;
        }
    };
    if let Err(error) = protocol::write_message(&mut writer, &encoded).await {
        error!(%error, "failed to write response");
    }
}

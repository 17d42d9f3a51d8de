// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response formatting

use warden_daemon::protocol::Response;

/// Print a response the way an operator expects to read it. Errors from
/// the daemon become a non-zero exit.
pub fn print_response(response: &Response) -> anyhow::Result<()> {
    match response {
        Response::Pong => println!("alive"),
        Response::Ok => {}
        Response::Restarting => println!("restarting"),
        Response::ShuttingDown => println!("shutting down"),

        Response::Status {
            version,
            uptime_secs,
            classes,
            instances,
            events_pending,
        } => {
            println!("protocol version {}", version);
            println!("up {}s", uptime_secs);
            println!(
                "{} classes, {} instances, {} events pending",
                classes, instances, events_pending
            );
        }

        Response::Jobs { jobs } => {
            for job in jobs {
                let name = if job.instance.is_empty() {
                    job.name.clone()
                } else {
                    format!("{} ({})", job.name, job.instance)
                };
                match job.pid {
                    Some(pid) => {
                        println!("{} {}/{}, process {}", name, job.goal, job.state, pid)
                    }
                    None => println!("{} {}/{}", name, job.goal, job.state),
                }
            }
        }

        Response::Error { kind, message } => {
            anyhow::bail!("{} ({:?})", message, kind);
        }
    }
    Ok(())
}

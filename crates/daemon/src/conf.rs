// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definition loader
//!
//! Reads `*.toml` files from the configuration directory and produces
//! immutable `JobClass` templates. The class name is the file stem.
//!
//! ```toml
//! description = "ssh daemon"
//! respawn = true
//! start_on = { all = ["filesystem", { event = "net-up", args = ["IFACE=eth0"] }] }
//! stop_on = "shutdown"
//!
//! [process.main]
//! exec = "/usr/sbin/sshd -D"
//!
//! [process.pre-start]
//! script = "test -d /run/sshd || mkdir /run/sshd"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use warden_core::{
    Console, EventOperator, ExpectMode, JobClass, Matcher, NormalExit, ProcessCommand,
    ProcessType, Rlimit,
};

/// Errors from definition loading.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("{class}: unknown process type {process}")]
    UnknownProcess { class: String, process: String },

    #[error("{class}: process {process} needs exactly one of exec or script")]
    BadProcess { class: String, process: String },

    #[error("{class}: unknown expect mode {expect}")]
    BadExpect { class: String, expect: String },

    #[error("{class}: unknown console mode {console}")]
    BadConsole { class: String, console: String },

    #[error("{class}: unknown signal {signal}")]
    BadSignal { class: String, signal: String },
}

/// A start/stop predicate expression.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OnExpr {
    Name(String),
    Match {
        event: String,
        #[serde(default)]
        args: Vec<String>,
    },
    All {
        all: Vec<OnExpr>,
    },
    Any {
        any: Vec<OnExpr>,
    },
}

impl OnExpr {
    fn build(&self) -> EventOperator {
        match self {
            OnExpr::Name(name) => EventOperator::match_name(name.clone()),
            OnExpr::Match { event, args } => {
                let matchers = args
                    .iter()
                    .map(|arg| match arg.split_once('=') {
                        Some((key, value)) => Matcher::keyed(key, value),
                        None => Matcher::literal(arg.clone()),
                    })
                    .collect();
                EventOperator::Match {
                    name: event.clone(),
                    matchers,
                    value: false,
                    captured: None,
                }
            }
            OnExpr::All { all } => EventOperator::all(all.iter().map(OnExpr::build).collect()),
            OnExpr::Any { any } => EventOperator::any(any.iter().map(OnExpr::build).collect()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NormalExitDef {
    Code(i32),
    Signal(String),
}

#[derive(Debug, Clone, Deserialize)]
struct ProcessDef {
    exec: Option<String>,
    script: Option<String>,
}

/// On-disk job definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobDef {
    description: Option<String>,
    instance: Option<String>,
    #[serde(default)]
    task: bool,
    expect: Option<String>,
    #[serde(default)]
    respawn: bool,
    /// `[count, interval_secs]`
    respawn_limit: Option<(u32, u64)>,
    kill_signal: Option<String>,
    kill_timeout: Option<u64>,
    #[serde(default)]
    normal_exit: Vec<NormalExitDef>,
    #[serde(default)]
    export: Vec<String>,
    #[serde(default)]
    emits: Vec<String>,
    umask: Option<u32>,
    nice: Option<i8>,
    oom_score: Option<i16>,
    /// `resource = [soft, hard]`
    limits: Option<BTreeMap<String, (u64, u64)>>,
    chroot: Option<PathBuf>,
    chdir: Option<PathBuf>,
    setuid: Option<String>,
    setgid: Option<String>,
    console: Option<String>,
    #[serde(default)]
    env: Vec<String>,
    start_on: Option<OnExpr>,
    stop_on: Option<OnExpr>,
    #[serde(default)]
    process: BTreeMap<String, ProcessDef>,
}

/// Parse one definition into a class. `default_console` applies when the
/// definition is silent.
pub fn load_class(
    name: &str,
    content: &str,
    path: &Path,
    default_console: Console,
) -> Result<JobClass, ConfError> {
    let def: JobDef = toml::from_str(content).map_err(|source| ConfError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;

    let mut class = JobClass::new(name);
    class.description = def.description;
    class.instance = def.instance;
    class.task = def.task;
    class.respawn.enabled = def.respawn;
    if let Some((limit, interval)) = def.respawn_limit {
        class.respawn.limit = limit;
        class.respawn.interval = Duration::from_secs(interval);
    }

    if let Some(expect) = def.expect {
        class.expect = match expect.as_str() {
            "daemon" => ExpectMode::Daemon,
            "fork" => ExpectMode::Fork,
            "stop" => ExpectMode::Stop,
            other => {
                return Err(ConfError::BadExpect {
                    class: name.to_string(),
                    expect: other.to_string(),
                })
            }
        };
    }

    if let Some(signal) = def.kill_signal {
        if warden_core::process::signal_number(&signal).is_none() {
            return Err(ConfError::BadSignal {
                class: name.to_string(),
                signal,
            });
        }
        class.kill_signal = signal;
    }
    if let Some(timeout) = def.kill_timeout {
        class.kill_timeout = Duration::from_secs(timeout);
    }

    class.normal_exit = def
        .normal_exit
        .into_iter()
        .map(|exit| match exit {
            NormalExitDef::Code(code) => NormalExit::Code(code),
            NormalExitDef::Signal(signal) => NormalExit::Signal(signal),
        })
        .collect();

    class.export = def.export;
    class.emits = def.emits;
    if let Some(umask) = def.umask {
        class.umask = umask;
    }
    class.nice = def.nice;
    class.oom_score = def.oom_score;
    class.limits = def
        .limits
        .unwrap_or_default()
        .into_iter()
        .map(|(resource, (soft, hard))| Rlimit {
            resource,
            soft,
            hard,
        })
        .collect();
    class.chroot = def.chroot;
    class.chdir = def.chdir;
    class.setuid = def.setuid;
    class.setgid = def.setgid;

    class.console = match def.console {
        Some(console) => Console::parse(&console).ok_or_else(|| ConfError::BadConsole {
            class: name.to_string(),
            console,
        })?,
        None => default_console,
    };

    class.env = def.env;
    class.start_on = def.start_on.as_ref().map(OnExpr::build);
    class.stop_on = def.stop_on.as_ref().map(OnExpr::build);

    for (process, command) in def.process {
        let ptype = match process.as_str() {
            "pre-start" => ProcessType::PreStart,
            "main" => ProcessType::Main,
            "post-start" => ProcessType::PostStart,
            "pre-stop" => ProcessType::PreStop,
            "post-stop" => ProcessType::PostStop,
            other => {
                return Err(ConfError::UnknownProcess {
                    class: name.to_string(),
                    process: other.to_string(),
                })
            }
        };
        let command = match (command.exec, command.script) {
            (Some(exec), None) => ProcessCommand::exec(exec),
            (None, Some(script)) => ProcessCommand::script(script),
            _ => {
                return Err(ConfError::BadProcess {
                    class: name.to_string(),
                    process,
                })
            }
        };
        class.set_process(ptype, command);
    }

    Ok(class)
}

/// Scan a directory for `*.toml` definitions. Unparsable files are
/// skipped with a warning so one broken job cannot take out the boot.
pub fn load_dir(dir: &Path, default_console: Console) -> Result<Vec<JobClass>, ConfError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "configuration directory missing");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConfError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut classes = Vec::new();
    for path in paths {
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "unreadable job definition");
                continue;
            }
        };
        match load_class(name, &content, &path, default_console) {
            Ok(class) => classes.push(class),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "bad job definition");
            }
        }
    }
    Ok(classes)
}

#[cfg(test)]
#[path = "conf_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end lifecycle scenarios driven through the public API.

use warden_adapters::FakeSpawner;
use warden_core::{
    CoreError, EventOperator, ExitStatus, FakeClock, Goal, JobClass, ProcessCommand, ProcessType,
    State,
};
use warden_engine::{Reply, Supervisor};

fn supervisor() -> (Supervisor<FakeSpawner, FakeClock>, FakeSpawner) {
    let spawner = FakeSpawner::new();
    let mut sup = Supervisor::new(spawner.clone(), FakeClock::new());
    sup.enable_event_trace();
    (sup, spawner)
}

fn names(trace: &[(String, Vec<String>)]) -> Vec<String> {
    trace.iter().map(|(name, _)| name.clone()).collect()
}

/// A one-shot task produces the full lifecycle event sequence and leaves
/// no instance behind.
#[test]
fn simple_task_lifecycle() {
    let (mut sup, spawner) = supervisor();
    let mut hello = JobClass::new("hello");
    hello.task = true;
    hello.set_process(ProcessType::Main, ProcessCommand::exec("/bin/true"));
    hello.start_on = Some(EventOperator::match_name("startup"));
    sup.register_class(hello);

    sup.emit("startup", vec![], None);
    sup.poll();
    sup.handle_child_exit(spawner.last_pid().unwrap(), ExitStatus::Code(0));
    sup.poll();

    let trace = sup.take_event_trace();
    assert_eq!(
        names(&trace),
        vec!["startup", "starting", "started", "stopping", "stopped"]
    );
    for (name, env) in &trace[1..] {
        assert!(env.contains(&"JOB=hello".to_string()), "{} missing JOB", name);
        assert!(
            env.contains(&"INSTANCE=".to_string()),
            "{} missing INSTANCE",
            name
        );
    }
    assert!(sup.core().jobs.is_empty());
}

/// A service with a pre-start hook reaches RUNNING with a live main pid,
/// and a waiting start caller is answered at `started`, not at exit.
#[test]
fn service_with_pre_start() {
    let (mut sup, spawner) = supervisor();
    let mut svc = JobClass::new("svc");
    svc.set_process(ProcessType::PreStart, ProcessCommand::exec("/bin/true"));
    svc.set_process(ProcessType::Main, ProcessCommand::exec("/bin/sleep 100"));
    svc.start_on = Some(EventOperator::match_name("startup"));
    sup.register_class(svc);

    sup.start_job("svc", vec![], None, Some(1)).unwrap();
    assert!(sup.poll().is_empty());

    // Pre-start completes; main spawns; the caller unblocks at started.
    let pre_start = spawner.calls()[0].clone();
    assert_eq!(pre_start.process, ProcessType::PreStart);
    sup.handle_child_exit(pre_start.pid, ExitStatus::Code(0));
    let replies = sup.poll();
    assert_eq!(
        replies,
        vec![Reply {
            id: 1,
            result: Ok(())
        }]
    );

    let (_, job) = sup.core().jobs.iter().next().unwrap();
    assert_eq!(job.goal, Goal::Start);
    assert_eq!(job.state, State::Running);
    assert!(job.pid_of(ProcessType::Main).unwrap() > 0);
}

/// An event named by both predicates stops the running process first and
/// then starts a replacement.
#[test]
fn stop_event_racing_start() {
    let (mut sup, spawner) = supervisor();
    let mut svc = JobClass::new("svc");
    svc.set_process(ProcessType::Main, ProcessCommand::exec("/bin/sleep 100"));
    svc.start_on = Some(EventOperator::match_name("foo"));
    svc.stop_on = Some(EventOperator::match_name("foo"));
    sup.register_class(svc);

    // Not running: it just starts.
    sup.emit("foo", vec![], None);
    sup.poll();
    let first_pid = spawner.last_pid().unwrap();
    let trace = sup.take_event_trace();
    assert_eq!(names(&trace), vec!["foo", "starting", "started"]);

    // Running: stop fires first, the start follows after teardown.
    sup.emit("foo", vec![], None);
    sup.poll();
    sup.handle_child_exit(first_pid, ExitStatus::Signal(15));
    sup.poll();

    let second_pid = spawner.last_pid().unwrap();
    assert_ne!(first_pid, second_pid);
    let trace = sup.take_event_trace();
    assert_eq!(
        names(&trace),
        vec!["foo", "stopping", "starting", "started"]
    );
}

/// A waiting emit is answered only when every chained job settles, and a
/// failure surfaces as EventFailed naming the culprit.
#[test]
fn blocked_emit_chain() {
    let (mut sup, spawner) = supervisor();
    let mut svc = JobClass::new("svc");
    svc.set_process(ProcessType::Main, ProcessCommand::exec("/bin/sleep 100"));
    svc.start_on = Some(EventOperator::match_name("custom"));
    sup.register_class(svc);

    sup.emit_with_reply("custom", vec![], None, 10);
    assert_eq!(
        sup.poll(),
        vec![Reply {
            id: 10,
            result: Ok(())
        }]
    );

    // Same shape, but the dependent job dies at spawn.
    let mut bad = JobClass::new("bad");
    bad.set_process(ProcessType::Main, ProcessCommand::exec("/bin/nope"));
    bad.start_on = Some(EventOperator::match_name("trouble"));
    sup.register_class(bad);
    spawner.fail_process("bad", ProcessType::Main);

    sup.emit_with_reply("trouble", vec![], None, 11);
    assert_eq!(
        sup.poll(),
        vec![Reply {
            id: 11,
            result: Err(CoreError::EventFailed("bad".to_string()))
        }]
    );
}

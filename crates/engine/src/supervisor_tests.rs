// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor unit tests

use super::*;
use std::time::Duration;
use warden_adapters::FakeSpawner;
use warden_core::{EventOperator, FakeClock, JobClass, ProcessCommand};

fn supervisor() -> (Supervisor<FakeSpawner, FakeClock>, FakeSpawner, FakeClock) {
    let spawner = FakeSpawner::new();
    let clock = FakeClock::new();
    let mut sup = Supervisor::new(spawner.clone(), clock.clone());
    sup.enable_event_trace();
    (sup, spawner, clock)
}

fn service(name: &str) -> JobClass {
    let mut class = JobClass::new(name);
    class.set_process(ProcessType::Main, ProcessCommand::exec("/bin/sleep 100"));
    class.start_on = Some(EventOperator::match_name("startup"));
    class
}

fn task(name: &str) -> JobClass {
    let mut class = JobClass::new(name);
    class.task = true;
    class.set_process(ProcessType::Main, ProcessCommand::exec("/bin/true"));
    class.start_on = Some(EventOperator::match_name("startup"));
    class
}

fn event_names(trace: &[(String, Vec<String>)]) -> Vec<&str> {
    trace.iter().map(|(name, _)| name.as_str()).collect()
}

fn running_job(sup: &Supervisor<FakeSpawner, FakeClock>) -> (JobId, i32) {
    let (id, job) = sup
        .core()
        .jobs
        .iter()
        .find(|(_, j)| j.state == State::Running)
        .expect("a running job");
    (id, job.pid_of(ProcessType::Main).expect("main pid"))
}

#[test]
fn startup_starts_matching_service() {
    let (mut sup, spawner, _) = supervisor();
    sup.register_class(service("svc"));

    sup.emit("startup", vec![], None);
    sup.poll();

    let (_, pid) = running_job(&sup);
    assert!(pid > 0);
    let calls = spawner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].process, ProcessType::Main);

    let trace = sup.take_event_trace();
    assert_eq!(
        event_names(&trace),
        vec!["startup", "starting", "started"]
    );
}

#[test]
fn lifecycle_events_carry_job_and_instance() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));

    sup.emit("startup", vec![], None);
    sup.poll();

    let trace = sup.take_event_trace();
    let (_, starting_env) = &trace[1];
    assert!(starting_env.contains(&"JOB=svc".to_string()));
    assert!(starting_env.contains(&"INSTANCE=".to_string()));
}

#[test]
fn task_runs_to_completion_and_instance_is_destroyed() {
    let (mut sup, spawner, _) = supervisor();
    sup.register_class(task("hello"));

    sup.emit("startup", vec![], None);
    sup.poll();

    let pid = spawner.last_pid().expect("spawned main");
    sup.handle_child_exit(pid, ExitStatus::Code(0));
    sup.poll();

    assert!(sup.core().jobs.is_empty());

    let trace = sup.take_event_trace();
    assert_eq!(
        event_names(&trace),
        vec!["startup", "starting", "started", "stopping", "stopped"]
    );
    let (_, stopping_env) = &trace[3];
    assert!(stopping_env.contains(&"RESULT=ok".to_string()));
    let (_, stopped_env) = &trace[4];
    assert!(stopped_env.contains(&"RESULT=ok".to_string()));
}

#[test]
fn pre_start_runs_before_main() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("svc");
    class.set_process(ProcessType::PreStart, ProcessCommand::exec("/bin/true"));
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();

    // Blocked on the pre-start process.
    let calls = spawner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].process, ProcessType::PreStart);

    sup.handle_child_exit(calls[0].pid, ExitStatus::Code(0));
    sup.poll();

    let calls = spawner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].process, ProcessType::Main);
    let (_, pid) = running_job(&sup);
    assert_eq!(pid, calls[1].pid);
}

#[test]
fn pre_start_failure_marks_job_failed_and_stops() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("svc");
    class.set_process(ProcessType::PreStart, ProcessCommand::exec("/bin/false"));
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();

    let calls = spawner.calls();
    sup.handle_child_exit(calls[0].pid, ExitStatus::Code(1));
    sup.poll();

    // Main never ran; job wound down as failed.
    assert_eq!(spawner.calls().len(), 1);
    assert!(sup.core().jobs.is_empty());

    let trace = sup.take_event_trace();
    let names = event_names(&trace);
    assert!(names.contains(&"stopping"));
    let (_, stopping_env) = trace
        .iter()
        .find(|(name, _)| name == "stopping")
        .expect("stopping event");
    assert!(stopping_env.contains(&"RESULT=failed".to_string()));
    assert!(stopping_env.contains(&"PROCESS=pre-start".to_string()));
    assert!(stopping_env.contains(&"EXIT_STATUS=1".to_string()));
    // The event that started the failed job derives a /failed event.
    assert!(names.contains(&"startup/failed"));
}

#[test]
fn spawn_failure_reports_process_without_exit_detail() {
    let (mut sup, spawner, _) = supervisor();
    spawner.fail_process("svc", ProcessType::Main);
    sup.register_class(service("svc"));

    sup.emit("startup", vec![], None);
    sup.poll();

    assert!(sup.core().jobs.is_empty());
    let trace = sup.take_event_trace();
    let (_, stopping_env) = trace
        .iter()
        .find(|(name, _)| name == "stopping")
        .expect("stopping event");
    assert!(stopping_env.contains(&"RESULT=failed".to_string()));
    assert!(stopping_env.contains(&"PROCESS=main".to_string()));
    assert!(!stopping_env.iter().any(|e| e.starts_with("EXIT_")));
}

#[test]
fn signal_death_reports_exit_signal_name() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));
    sup.emit("startup", vec![], None);
    sup.poll();

    let (_, pid) = running_job(&sup);
    sup.handle_child_exit(pid, ExitStatus::Signal(11));
    sup.poll();

    let trace = sup.take_event_trace();
    let (_, stopping_env) = trace
        .iter()
        .find(|(name, _)| name == "stopping")
        .expect("stopping event");
    assert!(stopping_env.contains(&"EXIT_SIGNAL=SEGV".to_string()));
}

#[test]
fn exported_keys_are_appended_to_lifecycle_events() {
    let (mut sup, _, _) = supervisor();
    let mut class = service("svc");
    class.env = vec!["PORT=8080".to_string()];
    class.export = vec!["PORT".to_string()];
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();

    let trace = sup.take_event_trace();
    let (_, starting_env) = &trace[1];
    assert!(starting_env.contains(&"PORT=8080".to_string()));
}

#[test]
fn stop_event_kills_running_service() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("svc");
    class.stop_on = Some(EventOperator::match_name("shutdown"));
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();
    let (_, pid) = running_job(&sup);

    sup.emit("shutdown", vec![], None);
    sup.poll();

    // Signal sent, kill timer armed, waiting on the reaper.
    assert_eq!(spawner.kills(), vec![(pid, "TERM".to_string())]);
    assert!(sup.next_timer_deadline().is_some());

    sup.handle_child_exit(pid, ExitStatus::Signal(15));
    sup.poll();
    assert!(sup.core().jobs.is_empty());
}

#[test]
fn kill_timeout_escalates_to_sigkill() {
    let (mut sup, spawner, clock) = supervisor();
    let mut class = service("svc");
    class.stop_on = Some(EventOperator::match_name("shutdown"));
    class.kill_timeout = Duration::from_secs(5);
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();
    let (_, pid) = running_job(&sup);

    sup.emit("shutdown", vec![], None);
    sup.poll();

    clock.advance(Duration::from_secs(5));
    sup.fire_timers();

    assert_eq!(
        spawner.kills(),
        vec![(pid, "TERM".to_string()), (pid, "KILL".to_string())]
    );

    sup.handle_child_exit(pid, ExitStatus::Signal(9));
    sup.poll();
    assert!(sup.core().jobs.is_empty());
}

#[test]
fn same_event_stopping_and_starting_replaces_process() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = JobClass::new("svc");
    class.set_process(ProcessType::Main, ProcessCommand::exec("/bin/sleep 100"));
    class.start_on = Some(EventOperator::match_name("foo"));
    class.stop_on = Some(EventOperator::match_name("foo"));
    sup.register_class(class);

    // Not running: starts, then the stop predicate is matched per
    // instance only once the instance exists on a later event.
    sup.emit("foo", vec![], None);
    sup.poll();
    let (_, first_pid) = running_job(&sup);

    // Running: stop matches first, then start, replacing the process.
    sup.emit("foo", vec![], None);
    sup.poll();
    sup.handle_child_exit(first_pid, ExitStatus::Signal(15));
    sup.poll();

    let (_, second_pid) = running_job(&sup);
    assert_ne!(first_pid, second_pid);
    assert_eq!(spawner.kills().first(), Some(&(first_pid, "TERM".to_string())));
}

#[test]
fn pre_stop_abort_returns_to_running_without_stopping_event() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("db");
    class.set_process(ProcessType::PreStop, ProcessCommand::script("exit 1"));
    class.stop_on = Some(EventOperator::match_name("maintenance"));
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();
    let (job_id, main_pid) = running_job(&sup);
    sup.take_event_trace();

    sup.emit("maintenance", vec![], None);
    sup.poll();

    // Pre-stop script is running.
    let calls = spawner.calls();
    let pre_stop = calls.last().unwrap();
    assert_eq!(pre_stop.process, ProcessType::PreStop);

    // The script wrapper aborts the stop before exiting.
    sup.start_job("db", vec![], None, None).unwrap();
    sup.handle_child_exit(pre_stop.pid, ExitStatus::Code(1));
    sup.poll();

    let job = sup.core().jobs.get(job_id).expect("job survived");
    assert_eq!(job.state, State::Running);
    assert_eq!(job.goal, Goal::Start);
    assert_eq!(job.pid_of(ProcessType::Main), Some(main_pid));

    // No stopping event was emitted for the aborted stop.
    let trace = sup.take_event_trace();
    assert!(!event_names(&trace).contains(&"stopping"));
}

#[test]
fn respawn_restarts_dead_main_without_pre_stop() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("svc");
    class.respawn.enabled = true;
    class.set_process(ProcessType::PreStop, ProcessCommand::exec("/bin/true"));
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();
    let (_, first_pid) = running_job(&sup);
    sup.take_event_trace();

    sup.handle_child_exit(first_pid, ExitStatus::Code(1));
    sup.poll();

    let (_, second_pid) = running_job(&sup);
    assert_ne!(first_pid, second_pid);

    // Pre-stop was skipped on the way down.
    assert!(spawner
        .calls()
        .iter()
        .all(|call| call.process != ProcessType::PreStop));

    // No stopped event: the cycle turns around at post-stop, never
    // reaching waiting.
    let trace = sup.take_event_trace();
    assert_eq!(
        event_names(&trace),
        vec!["stopping", "starting", "started"]
    );
}

#[test]
fn respawn_rate_limit_settles_to_failed_stop() {
    let (mut sup, _, _) = supervisor();
    let mut class = service("svc");
    class.respawn.enabled = true;
    class.respawn.limit = 2;
    class.respawn.interval = Duration::from_secs(5);
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();

    // Burn through the limit without advancing the clock.
    for _ in 0..3 {
        let (_, pid) = running_job(&sup);
        sup.handle_child_exit(pid, ExitStatus::Code(1));
        sup.poll();
    }

    assert!(sup.core().jobs.is_empty());
    let trace = sup.take_event_trace();
    let (_, stopping_env) = trace
        .iter()
        .rev()
        .find(|(name, _)| name == "stopping")
        .expect("final stopping event");
    assert!(stopping_env.contains(&"RESULT=failed".to_string()));
    assert!(stopping_env.contains(&"PROCESS=respawn".to_string()));
}

#[test]
fn respawn_window_resets_after_interval() {
    let (mut sup, _, clock) = supervisor();
    let mut class = service("svc");
    class.respawn.enabled = true;
    class.respawn.limit = 1;
    class.respawn.interval = Duration::from_secs(5);
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();

    for _ in 0..3 {
        clock.advance(Duration::from_secs(10));
        let (_, pid) = running_job(&sup);
        sup.handle_child_exit(pid, ExitStatus::Code(1));
        sup.poll();
    }

    // Each death fell in a fresh window; the job keeps respawning.
    assert_eq!(sup.core().jobs.len(), 1);
}

#[test]
fn normal_exit_codes_do_not_respawn() {
    let (mut sup, _, _) = supervisor();
    let mut class = service("svc");
    class.respawn.enabled = true;
    class.normal_exit = vec![warden_core::NormalExit::Code(2)];
    sup.register_class(class);

    sup.emit("startup", vec![], None);
    sup.poll();
    let (_, pid) = running_job(&sup);

    sup.handle_child_exit(pid, ExitStatus::Code(2));
    sup.poll();

    assert!(sup.core().jobs.is_empty());
    let trace = sup.take_event_trace();
    let (_, stopped_env) = trace
        .iter()
        .find(|(name, _)| name == "stopped")
        .expect("stopped event");
    assert!(stopped_env.contains(&"RESULT=ok".to_string()));
}

#[test]
fn start_job_reports_already_started() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));
    sup.start_job("svc", vec![], None, None).unwrap();

    assert_eq!(
        sup.start_job("svc", vec![], None, None),
        Err(CoreError::AlreadyStarted("svc".to_string()))
    );
}

#[test]
fn stop_job_reports_already_stopped_and_unknown() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));

    assert_eq!(
        sup.stop_job("svc", vec![], None, None),
        Err(CoreError::UnknownJob("svc".to_string()))
    );
    assert_eq!(
        sup.stop_job("ghost", vec![], None, None),
        Err(CoreError::UnknownJob("ghost".to_string()))
    );
}

#[test]
fn start_wait_reply_resolves_at_started_not_exit() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));

    sup.start_job("svc", vec![], None, Some(7)).unwrap();
    let replies = sup.poll();

    // Service: reply resolves once running, before the process exits.
    assert_eq!(
        replies,
        vec![Reply {
            id: 7,
            result: Ok(())
        }]
    );
    let (_, job) = sup.core().jobs.iter().next().unwrap();
    assert_eq!(job.state, State::Running);
}

#[test]
fn task_start_wait_reply_resolves_at_completion() {
    let (mut sup, spawner, _) = supervisor();
    sup.register_class(task("hello"));

    sup.start_job("hello", vec![], None, Some(9)).unwrap();
    assert!(sup.poll().is_empty());

    sup.handle_child_exit(spawner.last_pid().unwrap(), ExitStatus::Code(0));
    let replies = sup.poll();
    assert_eq!(
        replies,
        vec![Reply {
            id: 9,
            result: Ok(())
        }]
    );
}

#[test]
fn failed_start_answers_waiting_caller_with_job_failed() {
    let (mut sup, spawner, _) = supervisor();
    spawner.fail_process("svc", ProcessType::Main);
    sup.register_class(service("svc"));

    sup.start_job("svc", vec![], None, Some(3)).unwrap();
    let replies = sup.poll();

    assert_eq!(
        replies,
        vec![Reply {
            id: 3,
            result: Err(CoreError::JobFailed("svc".to_string()))
        }]
    );
}

#[test]
fn emit_wait_reply_carries_event_failure() {
    let (mut sup, spawner, _) = supervisor();
    spawner.fail_process("svc", ProcessType::Main);
    let mut class = service("svc");
    class.start_on = Some(EventOperator::match_name("custom"));
    sup.register_class(class);

    sup.emit_with_reply("custom", vec![], None, 11);
    let replies = sup.poll();

    // The reply names the job that failed the event.
    assert_eq!(
        replies,
        vec![Reply {
            id: 11,
            result: Err(CoreError::EventFailed("svc".to_string()))
        }]
    );
}

#[test]
fn emit_wait_reply_resolves_ok_when_jobs_settle() {
    let (mut sup, _, _) = supervisor();
    let mut class = service("svc");
    class.start_on = Some(EventOperator::match_name("custom"));
    sup.register_class(class);

    sup.emit_with_reply("custom", vec![], None, 12);
    let replies = sup.poll();
    assert_eq!(
        replies,
        vec![Reply {
            id: 12,
            result: Ok(())
        }]
    );
}

#[test]
fn restart_replaces_running_process() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));
    sup.start_job("svc", vec![], None, None).unwrap();
    sup.poll();
    let (_, first_pid) = running_job(&sup);

    sup.restart_job("svc", vec![], None, Some(5)).unwrap();
    sup.poll();
    sup.handle_child_exit(first_pid, ExitStatus::Signal(15));
    let replies = sup.poll();

    let (_, second_pid) = running_job(&sup);
    assert_ne!(first_pid, second_pid);
    assert_eq!(
        replies,
        vec![Reply {
            id: 5,
            result: Ok(())
        }]
    );
}

#[test]
fn instanced_class_expands_template_per_start() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = JobClass::new("getty");
    class.instance = Some("$TTY".to_string());
    class.set_process(ProcessType::Main, ProcessCommand::exec("/sbin/getty"));
    sup.register_class(class);

    sup.start_job("getty", vec!["TTY=tty1".to_string()], None, None)
        .unwrap();
    sup.start_job("getty", vec!["TTY=tty2".to_string()], None, None)
        .unwrap();
    sup.poll();

    assert_eq!(sup.core().jobs.len(), 2);
    let instances: Vec<String> = spawner.calls().iter().map(|c| c.instance.clone()).collect();
    assert_eq!(instances, vec!["tty1", "tty2"]);

    // Starting the same instance again is an error.
    assert!(matches!(
        sup.start_job("getty", vec!["TTY=tty1".to_string()], None, None),
        Err(CoreError::AlreadyStarted(_))
    ));
}

#[test]
fn bad_instance_template_is_an_error() {
    let (mut sup, _, _) = supervisor();
    let mut class = JobClass::new("getty");
    class.instance = Some("$TTY".to_string());
    class.set_process(ProcessType::Main, ProcessCommand::exec("/sbin/getty"));
    sup.register_class(class);

    assert!(matches!(
        sup.start_job("getty", vec![], None, None),
        Err(CoreError::BadInstance { .. })
    ));
}

#[test]
fn event_descriptors_ride_the_start_environment() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("svc");
    class.start_on = Some(EventOperator::match_name("socket-ready"));
    sup.register_class(class);

    sup.emit_with_fd("socket-ready", vec![], None, 7);
    sup.poll();

    let call = spawner.calls().last().cloned().unwrap();
    assert!(call.env.contains(&"WARDEN_FDS=7".to_string()));
}

#[test]
fn session_scoped_event_only_reaches_matching_classes() {
    let (mut sup, _, _) = supervisor();
    let mut system = service("system-svc");
    system.start_on = Some(EventOperator::match_name("go"));
    sup.register_class(system);

    let mut scoped = service("user-svc");
    scoped.start_on = Some(EventOperator::match_name("go"));
    scoped.session = Some(warden_core::SessionId(0));
    sup.register_class(scoped);

    sup.emit("go", vec![], Some(warden_core::SessionId(0)));
    sup.poll();

    // Only the session's class started.
    assert_eq!(sup.core().jobs.len(), 1);
    let (id, _) = sup.core().jobs.iter().next().unwrap();
    assert_eq!(sup.core().job_name(id), "user-svc");
}

#[test]
fn session_mismatch_is_permission_denied() {
    let (mut sup, _, _) = supervisor();
    let mut scoped = service("user-svc");
    scoped.session = Some(warden_core::SessionId(0));
    sup.register_class(scoped);

    assert_eq!(
        sup.start_job("user-svc", vec![], None, None),
        Err(CoreError::PermissionDenied("user-svc".to_string()))
    );
}

#[test]
fn reload_marks_vanished_class_deleted_until_instances_stop() {
    let (mut sup, _, _) = supervisor();
    sup.register_class(service("svc"));
    sup.start_job("svc", vec![], None, None).unwrap();
    sup.poll();
    let (job_id, pid) = running_job(&sup);

    // Reload with an empty definition set.
    sup.reload_classes(vec![]);
    let class_id = sup.core().jobs.get(job_id).unwrap().class;
    assert!(sup.core().classes.get(class_id).unwrap().deleted);

    // The class (and the job) go away once the instance stops.
    sup.stop_job("svc", vec![], None, None).unwrap();
    sup.poll();
    sup.handle_child_exit(pid, ExitStatus::Signal(15));
    sup.poll();

    assert!(sup.core().jobs.is_empty());
    assert!(sup.core().classes.get(class_id).is_none());
}

#[test]
fn reload_keeps_unchanged_definitions() {
    let (mut sup, _, _) = supervisor();
    let id = sup.register_class(service("svc"));
    sup.reload_classes(vec![service("svc")]);
    assert_eq!(sup.core().classes.visible("svc"), Some(id));
}

#[test]
fn blocker_invariant_holds_through_a_lifecycle() {
    let (mut sup, spawner, _) = supervisor();
    sup.register_class(task("hello"));

    sup.emit("startup", vec![], None);
    sup.poll();
    assert!(sup.core().blocker_counts_consistent());

    sup.handle_child_exit(spawner.last_pid().unwrap(), ExitStatus::Code(0));
    sup.poll();
    assert!(sup.core().blocker_counts_consistent());
    assert!(sup.core().events.is_empty());
}

#[test]
fn starting_event_blocks_transition_until_finished() {
    let (mut sup, _, _) = supervisor();
    // A listener holds the starting event open.
    let mut listener = JobClass::new("listener");
    listener.task = true;
    listener
        .set_process(ProcessType::Main, ProcessCommand::exec("/bin/true"));
    listener.start_on = Some(EventOperator::match_name("starting"));
    sup.register_class(listener);
    sup.register_class(service("svc"));

    sup.start_job("svc", vec![], None, None).unwrap();
    sup.poll();

    // svc is still in starting: the listener task holds its event.
    let svc = sup
        .core()
        .jobs
        .iter()
        .find(|(id, _)| sup.core().job_name(*id) == "svc")
        .map(|(_, job)| job.clone())
        .unwrap();
    assert_eq!(svc.state, State::Starting);
    assert!(svc.blocker.is_some());
}

#[test]
fn trace_completion_advances_expect_class() {
    let (mut sup, spawner, _) = supervisor();
    let mut class = service("daemonish");
    class.expect = ExpectMode::Daemon;
    sup.register_class(class);

    sup.start_job("daemonish", vec![], None, None).unwrap();
    sup.poll();

    let (job_id, job) = sup.core().jobs.iter().next().unwrap();
    assert_eq!(job.state, State::Spawned);
    assert_eq!(job.trace_state, TraceState::Active);

    let spawned = spawner.last_pid().unwrap();
    sup.on_trace_complete(job_id, Ok(spawned + 2));
    sup.poll();

    let (_, job) = sup.core().jobs.iter().next().unwrap();
    assert_eq!(job.state, State::Running);
    assert_eq!(job.pid_of(ProcessType::Main), Some(spawned + 2));
}

#[test]
fn stop_while_starting_routes_through_stopping() {
    let (mut sup, _, _) = supervisor();
    // Listener holds the starting event so svc stays blocked in starting.
    let mut listener = JobClass::new("listener");
    listener.task = true;
    listener
        .set_process(ProcessType::Main, ProcessCommand::exec("/bin/true"));
    listener.start_on = Some(EventOperator::match_name("starting"));
    sup.register_class(listener);
    sup.register_class(service("svc"));

    sup.start_job("svc", vec![], None, None).unwrap();
    sup.poll();

    // Cancel while blocked in starting.
    sup.stop_job("svc", vec![], None, None).unwrap();

    // Let the listener finish so the starting event resolves.
    let listener_pid = sup
        .core()
        .jobs
        .iter()
        .find(|(id, _)| sup.core().job_name(*id) == "listener")
        .and_then(|(_, job)| job.pid_of(ProcessType::Main))
        .unwrap();
    sup.handle_child_exit(listener_pid, ExitStatus::Code(0));
    sup.poll();

    // svc went down the stopping path without ever spawning main.
    assert!(sup
        .core()
        .jobs
        .iter()
        .all(|(id, _)| sup.core().job_name(id) != "svc"));
}

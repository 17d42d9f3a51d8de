// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor runtime
//!
//! Owns the core graph and drives it: event queue polling, the per-job
//! (goal, state) machine with its entry actions, the kill discipline,
//! the child reaper, respawn rate limiting, and the control operations.
//!
//! Everything here is synchronous and runs on the caller's thread. The
//! impossible-transition checks panic rather than propagate: a confused
//! PID 1 is worse than a restarted one, and re-exec recovery exists.

use crate::scheduler::Scheduler;
use crate::{
    FDS_KEY, START_EVENTS_KEY, STARTED_EVENT, STARTING_EVENT, STOP_EVENTS_KEY, STOPPED_EVENT,
    STOPPING_EVENT,
};
use std::time::{Duration, Instant};
use warden_adapters::{SpawnRequest, Spawner};
use warden_core::process::signal_name;
use warden_core::{
    environ, Blocked, ClassId, Clock, Core, CoreError, EventId, ExitStatus, ExpectMode, Goal,
    Job, JobClass, JobId, Progress, ProcessType, ReplyId, SessionId, State, TraceState,
};

/// A resolved control-request reply, handed back to the host for
/// delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub id: ReplyId,
    pub result: Result<(), CoreError>,
}

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub class: String,
    pub instance: String,
    pub goal: Goal,
    pub state: State,
    pub pid: Option<i32>,
}

/// The supervisor: core graph plus the collaborators that drive it.
pub struct Supervisor<S: Spawner, C: Clock> {
    core: Core,
    spawner: S,
    clock: C,
    timers: Scheduler,
    replies: Vec<Reply>,
}

impl<S: Spawner, C: Clock> Supervisor<S, C> {
    pub fn new(spawner: S, clock: C) -> Self {
        Self::with_core(Core::new(), spawner, clock)
    }

    /// Build around an existing graph (snapshot restore). Kill timers are
    /// re-armed separately via `restore_kill_timers`.
    pub fn with_core(core: Core, spawner: S, clock: C) -> Self {
        Self {
            core,
            spawner,
            clock,
            timers: Scheduler::new(),
            replies: Vec::new(),
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Record `(name, env)` of every event emission, for diagnostics.
    pub fn enable_event_trace(&mut self) {
        self.core.events.enable_trace();
    }

    /// Drain the recorded emissions.
    pub fn take_event_trace(&mut self) -> Vec<(String, Vec<String>)> {
        self.core.events.take_trace()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Remaining kill-timer durations, for the re-exec snapshot.
    pub fn kill_timers(&self) -> Vec<(JobId, Duration)> {
        self.timers.all_remaining(self.clock.now())
    }

    /// Re-arm kill timers restored from a snapshot.
    pub fn restore_kill_timers(&mut self, timers: Vec<(JobId, Duration)>) {
        let now = self.clock.now();
        for (job, remaining) in timers {
            if self.core.jobs.get(job).is_some() {
                self.timers.set(job, remaining, now);
            }
        }
    }

    /// Earliest armed timer deadline, for the host's sleep.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire due kill timers.
    pub fn fire_timers(&mut self) {
        let now = self.clock.now();
        for job in self.timers.fired(now) {
            self.handle_timeout(job);
        }
    }

    // ----- class management -------------------------------------------

    /// Register a single class definition.
    pub fn register_class(&mut self, class: JobClass) -> ClassId {
        self.core.classes.register(class)
    }

    /// Reconcile the registry against a freshly loaded definition set.
    /// Vanished classes are marked deleted (destroyed once instance-free);
    /// changed definitions take over once the old instances stop.
    pub fn reload_classes(&mut self, classes: Vec<JobClass>) {
        let new_names: std::collections::HashSet<String> =
            classes.iter().map(|c| c.name.clone()).collect();

        for id in self.core.classes.ids() {
            let Some(class) = self.core.classes.get(id) else {
                continue;
            };
            if !class.deleted && !new_names.contains(&class.name) {
                self.core.classes.mark_deleted(id);
            }
        }

        for class in classes {
            match self.core.classes.visible(&class.name) {
                Some(old_id) => {
                    let unchanged = self
                        .core
                        .classes
                        .get(old_id)
                        .is_some_and(|old| *old == class);
                    if unchanged {
                        continue;
                    }
                    self.core.classes.mark_deleted(old_id);
                    self.core.classes.register(class);
                }
                None => {
                    self.core.classes.register(class);
                }
            }
        }
    }

    // ----- event emission ---------------------------------------------

    /// Enqueue an external event.
    pub fn emit(
        &mut self,
        name: impl Into<String>,
        env: Vec<String>,
        session: Option<SessionId>,
    ) -> EventId {
        self.core.events.emit(name, env, session)
    }

    /// Enqueue an external event carrying a descriptor (socket
    /// activation); jobs started by it receive the descriptor number in
    /// their environment.
    pub fn emit_with_fd(
        &mut self,
        name: impl Into<String>,
        env: Vec<String>,
        session: Option<SessionId>,
        fd: i32,
    ) -> EventId {
        let id = self.core.events.emit(name, env, session);
        if let Some(event) = self.core.events.get_mut(id) {
            event.fd = Some(fd);
        }
        id
    }

    /// Enqueue an external event whose emitter waits for it to finish.
    pub fn emit_with_reply(
        &mut self,
        name: impl Into<String>,
        env: Vec<String>,
        session: Option<SessionId>,
        reply: ReplyId,
    ) -> EventId {
        let id = self.core.events.emit(name, env, session);
        if let Some(event) = self.core.events.get_mut(id) {
            event.blocking.push(Blocked::EmitReply(reply));
        }
        id
    }

    // ----- control operations -----------------------------------------

    /// Start an instance of a class, creating it if needed. With a reply
    /// handle, the caller is answered when the job reaches its rest state.
    pub fn start_job(
        &mut self,
        name: &str,
        extra_env: Vec<String>,
        session: Option<SessionId>,
        reply: Option<ReplyId>,
    ) -> Result<(), CoreError> {
        let class_id = self.lookup_class(name, session)?;

        let class = self.core.classes.get(class_id).expect("visible class");
        let mut env = class.env.clone();
        environ::merge(&mut env, &extra_env);
        let instance = self.expand_instance(class_id, &env)?;

        let job_id = match self.core.classes.instance(class_id, &instance) {
            Some(job_id) => job_id,
            None => self.new_instance(class_id, &instance),
        };

        let goal = self.core.jobs.get(job_id).expect("registered instance").goal;
        if goal == Goal::Start {
            return Err(CoreError::AlreadyStarted(self.core.job_name(job_id)));
        }
        self.core
            .jobs
            .get_mut(job_id)
            .expect("registered instance")
            .start_env = Some(env);

        self.job_finished(job_id, false);
        if let Some(reply) = reply {
            self.core
                .jobs
                .get_mut(job_id)
                .expect("registered instance")
                .blocking
                .push(Blocked::StartReply(reply));
        }
        self.change_goal(job_id, Goal::Start);
        Ok(())
    }

    /// Stop a running instance.
    pub fn stop_job(
        &mut self,
        name: &str,
        extra_env: Vec<String>,
        session: Option<SessionId>,
        reply: Option<ReplyId>,
    ) -> Result<(), CoreError> {
        let class_id = self.lookup_class(name, session)?;

        let class = self.core.classes.get(class_id).expect("visible class");
        let mut env = class.env.clone();
        environ::merge(&mut env, &extra_env);
        let instance = self.expand_instance(class_id, &env)?;

        let job_id = self
            .core
            .classes
            .instance(class_id, &instance)
            .ok_or_else(|| CoreError::UnknownJob(name.to_string()))?;

        let goal = self.core.jobs.get(job_id).expect("registered instance").goal;
        if goal == Goal::Stop {
            return Err(CoreError::AlreadyStopped(self.core.job_name(job_id)));
        }
        self.core
            .jobs
            .get_mut(job_id)
            .expect("registered instance")
            .stop_env = Some(extra_env);

        self.job_finished(job_id, false);
        if let Some(reply) = reply {
            self.core
                .jobs
                .get_mut(job_id)
                .expect("registered instance")
                .blocking
                .push(Blocked::StopReply(reply));
        }
        self.change_goal(job_id, Goal::Stop);
        Ok(())
    }

    /// Stop and start an instance in one motion. The goal sequencing means
    /// a class with a pre-stop script can still abort the stop half.
    pub fn restart_job(
        &mut self,
        name: &str,
        extra_env: Vec<String>,
        session: Option<SessionId>,
        reply: Option<ReplyId>,
    ) -> Result<(), CoreError> {
        let class_id = self.lookup_class(name, session)?;

        let class = self.core.classes.get(class_id).expect("visible class");
        let mut env = class.env.clone();
        environ::merge(&mut env, &extra_env);
        let instance = self.expand_instance(class_id, &env)?;

        let job_id = self
            .core
            .classes
            .instance(class_id, &instance)
            .ok_or_else(|| CoreError::UnknownJob(name.to_string()))?;

        let goal = self.core.jobs.get(job_id).expect("registered instance").goal;
        if goal == Goal::Stop {
            return Err(CoreError::AlreadyStopped(self.core.job_name(job_id)));
        }
        self.core
            .jobs
            .get_mut(job_id)
            .expect("registered instance")
            .start_env = Some(env);

        self.job_finished(job_id, false);
        if let Some(reply) = reply {
            self.core
                .jobs
                .get_mut(job_id)
                .expect("registered instance")
                .blocking
                .push(Blocked::RestartReply(reply));
        }
        self.change_goal(job_id, Goal::Stop);
        self.change_goal(job_id, Goal::Start);
        Ok(())
    }

    /// Every class and instance, for `list`.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        let mut rows = Vec::new();
        let mut ids = self.core.classes.ids();
        ids.sort_by_key(|id| self.core.classes.get(*id).map(|c| c.name.clone()));

        for class_id in ids {
            let Some(class) = self.core.classes.get(class_id) else {
                continue;
            };
            let instances = self.core.classes.instances(class_id);
            if instances.is_empty() {
                if !class.deleted {
                    rows.push(JobSnapshot {
                        class: class.name.clone(),
                        instance: String::new(),
                        goal: Goal::Stop,
                        state: State::Waiting,
                        pid: None,
                    });
                }
                continue;
            }
            for (instance, job_id) in instances {
                let Some(job) = self.core.jobs.get(job_id) else {
                    continue;
                };
                rows.push(JobSnapshot {
                    class: class.name.clone(),
                    instance,
                    goal: job.goal,
                    state: job.state,
                    pid: job.pid_of(ProcessType::Main),
                });
            }
        }
        rows
    }

    fn lookup_class(
        &self,
        name: &str,
        session: Option<SessionId>,
    ) -> Result<ClassId, CoreError> {
        let class_id = self
            .core
            .classes
            .visible(name)
            .ok_or_else(|| CoreError::UnknownJob(name.to_string()))?;
        let class = self.core.classes.get(class_id).expect("visible class");
        if class.session != session {
            return Err(CoreError::PermissionDenied(name.to_string()));
        }
        Ok(class_id)
    }

    fn expand_instance(
        &self,
        class_id: ClassId,
        env: &[String],
    ) -> Result<String, CoreError> {
        let class = self.core.classes.get(class_id).expect("visible class");
        match &class.instance {
            None => Ok(String::new()),
            Some(template) => {
                environ::expand(template, env).map_err(|e| CoreError::BadInstance {
                    class: class.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn new_instance(&mut self, class_id: ClassId, instance: &str) -> JobId {
        let class = self.core.classes.get(class_id).expect("visible class");
        let job = Job::new(class_id, class, instance);
        let job_id = self.core.jobs.insert(job);
        self.core.classes.add_instance(class_id, instance, job_id);
        tracing::debug!(job = %self.core.job_name(job_id), "new instance");
        job_id
    }

    // ----- queue polling ----------------------------------------------

    /// Drain the event queue to quiescence and return any resolved
    /// control replies.
    pub fn poll(&mut self) -> Vec<Reply> {
        loop {
            let mut again = false;

            for id in self.core.events.ids() {
                let Some(progress) = self.core.events.get(id).map(|e| e.progress) else {
                    continue;
                };
                match progress {
                    Progress::Pending => {
                        self.event_pending(id);
                        again = true;
                        self.finish_if_unblocked(id);
                    }
                    Progress::Handling => {
                        if self.finish_if_unblocked(id) {
                            again = true;
                        }
                    }
                    Progress::Finished => {
                        self.event_finished(id);
                        again = true;
                    }
                }
            }

            if !again {
                break;
            }
        }
        std::mem::take(&mut self.replies)
    }

    fn finish_if_unblocked(&mut self, id: EventId) -> bool {
        let unblocked = self
            .core
            .events
            .get(id)
            .is_some_and(|event| event.blockers == 0);
        if unblocked {
            if let Some(event) = self.core.events.get_mut(id) {
                event.progress = Progress::Finished;
            }
            self.event_finished(id);
        }
        unblocked
    }

    fn event_pending(&mut self, id: EventId) {
        let event = self.core.events.get_mut(id).expect("pending event");
        tracing::info!(event = %event.name, "handling event");
        event.progress = Progress::Handling;
        self.match_event_against_jobs(id);
    }

    /// Stop matching first, then start matching, for every visible class.
    /// Stop-before-start makes an event naming both predicates replace a
    /// running process rather than start-then-stop it.
    fn match_event_against_jobs(&mut self, id: EventId) {
        for class_id in self.core.classes.visible_ids() {
            let Some(class) = self.core.classes.get(class_id) else {
                continue;
            };
            let Some(event) = self.core.events.get(id) else {
                return;
            };
            if event.session.is_some() && class.session != event.session {
                continue;
            }

            for (_, job_id) in self.core.classes.instances(class_id) {
                self.match_stop(id, job_id);
            }
            self.match_start(id, class_id);
        }
    }

    fn match_stop(&mut self, id: EventId, job_id: JobId) {
        let Some(job) = self.core.jobs.get_mut(job_id) else {
            return;
        };
        let Some(mut stop_on) = job.stop_on.take() else {
            return;
        };
        let event = self.core.events.get(id).expect("handled event");
        stop_on.handle(id, event, Some(&job.env));

        if !stop_on.value() {
            job.stop_on = Some(stop_on);
            return;
        }

        if job.goal == Goal::Stop {
            stop_on.reset();
            job.stop_on = Some(stop_on);
            return;
        }

        let mut stop_env = Vec::new();
        stop_on.environment(&mut stop_env, STOP_EVENTS_KEY);
        job.stop_env = Some(stop_env);
        let matched = stop_on.matched_events();
        stop_on.reset();
        job.stop_on = Some(stop_on);

        self.job_finished(job_id, false);
        self.block_events(job_id, &matched);
        self.change_goal(job_id, Goal::Stop);
    }

    fn match_start(&mut self, id: EventId, class_id: ClassId) {
        let Some(class) = self.core.classes.get_mut(class_id) else {
            return;
        };
        let Some(mut start_on) = class.start_on.take() else {
            return;
        };
        let event = self.core.events.get(id).expect("handled event");
        start_on.handle(id, event, None);

        if !start_on.value() {
            class.start_on = Some(start_on);
            return;
        }

        let mut env = class.env.clone();
        start_on.environment(&mut env, START_EVENTS_KEY);
        let class_name = class.name.clone();
        let template = class.instance.clone();
        let matched = start_on.matched_events();
        start_on.reset();
        class.start_on = Some(start_on);

        // Descriptors from the matched events ride along in the start
        // environment.
        let fds: Vec<String> = matched
            .iter()
            .filter_map(|event| self.core.events.get(*event).and_then(|e| e.fd))
            .map(|fd| fd.to_string())
            .collect();
        if !fds.is_empty() {
            environ::set(&mut env, FDS_KEY, &fds.join(" "));
        }

        let instance = match &template {
            None => String::new(),
            Some(template) => match environ::expand(template, &env) {
                Ok(instance) => instance,
                Err(error) => {
                    tracing::warn!(
                        class = %class_name,
                        %error,
                        "failed to obtain instance"
                    );
                    return;
                }
            },
        };

        let job_id = match self.core.classes.instance(class_id, &instance) {
            Some(job_id) => job_id,
            None => self.new_instance(class_id, &instance),
        };

        let job = self.core.jobs.get_mut(job_id).expect("registered instance");
        if job.goal == Goal::Start {
            return;
        }
        job.start_env = Some(env);

        self.job_finished(job_id, false);
        self.block_events(job_id, &matched);
        self.change_goal(job_id, Goal::Start);
    }

    fn block_events(&mut self, job_id: JobId, events: &[EventId]) {
        for event in events {
            self.core.events.block(*event);
            self.core
                .jobs
                .get_mut(job_id)
                .expect("registered instance")
                .blocking
                .push(Blocked::Event(*event));
        }
    }

    fn event_finished(&mut self, id: EventId) {
        let event = self.core.events.get_mut(id).expect("finished event");
        debug_assert_eq!(event.progress, Progress::Finished);
        let failed = event.failed;
        let name = event.name.clone();
        let failed_by = event.failed_by.clone();
        let blocking = std::mem::take(&mut event.blocking);

        for record in blocking {
            match record {
                Blocked::Job(job_id) => {
                    if let Some(job) = self.core.jobs.get_mut(job_id) {
                        debug_assert_eq!(job.blocker, Some(id));
                        job.blocker = None;
                        let next = self.next_state_of(job_id);
                        self.change_state(job_id, next);
                    }
                }
                Blocked::Event(nested) => {
                    if failed {
                        if let Some(event) = self.core.events.get_mut(nested) {
                            event.failed = true;
                            if event.failed_by.is_none() {
                                event.failed_by = failed_by.clone();
                            }
                        }
                    }
                    self.core.events.unblock(nested);
                }
                Blocked::EmitReply(reply) => {
                    let result = if failed {
                        Err(CoreError::EventFailed(
                            failed_by.clone().unwrap_or_else(|| name.clone()),
                        ))
                    } else {
                        Ok(())
                    };
                    self.replies.push(Reply { id: reply, result });
                }
                Blocked::StartReply(_) | Blocked::StopReply(_) | Blocked::RestartReply(_) => {
                    unreachable!("job replies never attach to events")
                }
            }
        }

        let event = self.core.events.free(id);
        tracing::debug!(event = %event.name, "finished event");

        if event.failed && !event.name.ends_with("/failed") {
            let failed_name = format!("{}/failed", event.name);
            self.core
                .events
                .emit(failed_name, event.env.clone(), event.session);
        }
    }

    // ----- goal and state changes -------------------------------------

    /// Change the intent a job is driven toward. The natural rest states
    /// need induction to get moving; anything mid-flight re-reads the
    /// goal when its current script or event completes.
    fn change_goal(&mut self, job_id: JobId, goal: Goal) {
        let Some(job) = self.core.jobs.get_mut(job_id) else {
            return;
        };
        if job.goal == goal {
            return;
        }
        let old = job.goal;
        job.goal = goal;
        tracing::info!(
            job = %self.core.job_name(job_id),
            from = %old,
            to = %goal,
            "goal changed"
        );

        let state = self.core.jobs.get(job_id).expect("live job").state;
        match goal {
            Goal::Start if state == State::Waiting => {
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
            Goal::Stop if state == State::Running => {
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
            _ => {}
        }
    }

    /// The legal successor for a job's current (state, goal). Entering a
    /// respawn flip cell also flips the goal back to start.
    fn next_state_of(&mut self, job_id: JobId) -> State {
        let job = self.core.jobs.get(job_id).expect("live job");
        let class = self.core.classes.get(job.class).expect("job class");
        let has_main = class.has_process(ProcessType::Main);
        let next = job.next_state(has_main, job.main_alive());

        if job.goal == Goal::Respawn
            && matches!(job.state, State::PostStart | State::PreStop)
        {
            self.core.jobs.get_mut(job_id).expect("live job").goal = Goal::Start;
        }
        next
    }

    /// Walk the job through entry actions until it blocks on an event, a
    /// process, or a rest state. WAITING entry destroys the job.
    fn change_state(&mut self, job_id: JobId, mut target: State) {
        loop {
            let Some(job) = self.core.jobs.get(job_id) else {
                return;
            };
            if job.state == target {
                return;
            }
            assert!(job.blocker.is_none(), "state change while blocked on event");

            let old_state = job.state;
            tracing::info!(
                job = %self.core.job_name(job_id),
                from = %old_state,
                to = %target,
                "state changed"
            );
            self.core.jobs.get_mut(job_id).expect("live job").state = target;

            match target {
                State::Starting => {
                    let job = self.core.jobs.get_mut(job_id).expect("live job");
                    assert!(
                        matches!(job.goal, Goal::Start | Goal::Respawn),
                        "starting entry without a start goal"
                    );
                    if job.goal == Goal::Respawn {
                        job.goal = Goal::Start;
                    }
                    if let Some(env) = job.start_env.take() {
                        job.env = env;
                    }
                    job.stop_env = None;
                    job.failed = false;
                    job.failed_process = None;
                    job.exit_status = None;

                    let event = self.emit_job_event(job_id, State::Starting, true);
                    self.core.jobs.get_mut(job_id).expect("live job").blocker = Some(event);
                    return;
                }

                State::PreStart => {
                    if self.class_has(job_id, ProcessType::PreStart) {
                        if self.run_process(job_id, ProcessType::PreStart).is_ok() {
                            return;
                        }
                        self.job_failed(job_id, Some(ProcessType::PreStart), None);
                        self.change_goal(job_id, Goal::Stop);
                        target = self.next_state_of(job_id);
                    } else {
                        target = self.next_state_of(job_id);
                    }
                }

                State::Spawned => {
                    if self.class_has(job_id, ProcessType::Main) {
                        if self.run_process(job_id, ProcessType::Main).is_ok() {
                            let expect = self
                                .class_of(job_id)
                                .map(|c| c.expect)
                                .unwrap_or(ExpectMode::None);
                            if expect == ExpectMode::None {
                                target = self.next_state_of(job_id);
                            } else {
                                // Hold here until the fork tracer settles
                                // the real main pid.
                                self.core
                                    .jobs
                                    .get_mut(job_id)
                                    .expect("live job")
                                    .trace_state = TraceState::Active;
                                return;
                            }
                        } else {
                            self.job_failed(job_id, Some(ProcessType::Main), None);
                            self.change_goal(job_id, Goal::Stop);
                            target = self.next_state_of(job_id);
                        }
                    } else {
                        target = self.next_state_of(job_id);
                    }
                }

                State::PostStart => {
                    if self.class_has(job_id, ProcessType::PostStart) {
                        if self.run_process(job_id, ProcessType::PostStart).is_ok() {
                            return;
                        }
                        // Post-start failure is not fatal.
                        target = self.next_state_of(job_id);
                    } else {
                        target = self.next_state_of(job_id);
                    }
                }

                State::Running => {
                    if old_state == State::PreStop {
                        // The pre-stop script aborted the stop.
                        let job = self.core.jobs.get_mut(job_id).expect("live job");
                        job.stop_env = None;
                        self.job_finished(job_id, false);
                    } else {
                        self.emit_job_event(job_id, State::Running, false);
                        let task = self.class_of(job_id).map(|c| c.task).unwrap_or(false);
                        if !task {
                            // Services are "done" once running; tasks keep
                            // their waiters until completion.
                            self.job_finished(job_id, false);
                        }
                    }
                }

                State::PreStop => {
                    if self.class_has(job_id, ProcessType::PreStop) {
                        if self.run_process(job_id, ProcessType::PreStop).is_ok() {
                            return;
                        }
                        target = self.next_state_of(job_id);
                    } else {
                        target = self.next_state_of(job_id);
                    }
                }

                State::Stopping => {
                    let event = self.emit_job_event(job_id, State::Stopping, true);
                    self.core.jobs.get_mut(job_id).expect("live job").blocker = Some(event);
                    return;
                }

                State::Killed => {
                    let main_alive = self
                        .core
                        .jobs
                        .get(job_id)
                        .is_some_and(|job| job.main_alive());
                    if self.class_has(job_id, ProcessType::Main) && main_alive {
                        self.kill_process(job_id, ProcessType::Main);
                        return;
                    }
                    target = self.next_state_of(job_id);
                }

                State::PostStop => {
                    if self.class_has(job_id, ProcessType::PostStop) {
                        if self.run_process(job_id, ProcessType::PostStop).is_ok() {
                            return;
                        }
                        self.job_failed(job_id, Some(ProcessType::PostStop), None);
                        self.change_goal(job_id, Goal::Stop);
                        target = self.next_state_of(job_id);
                    } else {
                        target = self.next_state_of(job_id);
                    }
                }

                State::Waiting => {
                    let job = self.core.jobs.get(job_id).expect("live job");
                    assert_eq!(job.goal, Goal::Stop, "waiting entry without a stop goal");

                    self.emit_job_event(job_id, State::Waiting, false);
                    self.job_finished(job_id, false);

                    let job = self.core.jobs.get(job_id).expect("live job");
                    let class_id = job.class;
                    let instance = job.name.clone();

                    self.core.classes.remove_instance(class_id, &instance);
                    self.timers.cancel(job_id);
                    self.core.jobs.remove(job_id);

                    if self.core.classes.reconsider(class_id) {
                        tracing::debug!("deleted class destroyed with last instance");
                    }
                    return;
                }
            }
        }
    }

    // ----- hook execution ---------------------------------------------

    fn class_of(&self, job_id: JobId) -> Option<&JobClass> {
        let job = self.core.jobs.get(job_id)?;
        self.core.classes.get(job.class)
    }

    fn class_has(&self, job_id: JobId, ptype: ProcessType) -> bool {
        self.class_of(job_id)
            .is_some_and(|class| class.has_process(ptype))
    }

    /// Ask the spawner to run a hook. On success the pid is recorded; on
    /// failure the caller drives the failure path.
    fn run_process(&mut self, job_id: JobId, ptype: ProcessType) -> Result<(), ()> {
        let job = self.core.jobs.get(job_id).expect("live job");
        let class = self.core.classes.get(job.class).expect("job class");
        let command = class
            .process(ptype)
            .cloned()
            .expect("caller checked the process table");

        let mut env = job.env.clone();
        if ptype == ProcessType::PreStop {
            if let Some(stop_env) = &job.stop_env {
                environ::merge(&mut env, stop_env);
            }
        }
        environ::set(&mut env, "WARDEN_JOB", &class.name);
        environ::set(&mut env, "WARDEN_INSTANCE", &job.name);

        let request = SpawnRequest {
            class: class.name.clone(),
            instance: job.name.clone(),
            process: ptype,
            command,
            env,
            umask: class.umask,
            nice: class.nice,
            oom_score: class.oom_score,
            limits: class.limits.clone(),
            chroot: class.chroot.clone(),
            chdir: class.chdir.clone(),
            setuid: class.setuid.clone(),
            setgid: class.setgid.clone(),
            console: class.console,
        };

        match self.spawner.spawn(&request) {
            Ok(pid) => {
                self.core
                    .jobs
                    .get_mut(job_id)
                    .expect("live job")
                    .set_pid(ptype, pid);
                tracing::info!(
                    job = %self.core.job_name(job_id),
                    process = %ptype,
                    pid,
                    "process started"
                );
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    job = %self.core.job_name(job_id),
                    process = %ptype,
                    %error,
                    "failed to spawn process"
                );
                Err(())
            }
        }
    }

    /// Send the class's kill signal and arm the kill timer.
    fn kill_process(&mut self, job_id: JobId, ptype: ProcessType) {
        let Some(job) = self.core.jobs.get(job_id) else {
            return;
        };
        let Some(pid) = job.pid_of(ptype) else {
            return;
        };
        let class = self.core.classes.get(job.class).expect("job class");
        let signal = class.kill_signal.clone();
        let timeout = class.kill_timeout;

        tracing::info!(
            job = %self.core.job_name(job_id),
            process = %ptype,
            pid,
            signal = %signal,
            "sending signal"
        );
        if let Err(error) = self.spawner.kill(pid, &signal) {
            // Racing a natural death; the reaper sorts it out.
            tracing::warn!(pid, %error, "kill failed");
        }
        self.timers.set(job_id, timeout, self.clock.now());
    }

    /// Kill-timer expiry: the polite signal did not work.
    pub fn handle_timeout(&mut self, job_id: JobId) {
        let Some(job) = self.core.jobs.get(job_id) else {
            return;
        };
        if job.state != State::Killed {
            return;
        }
        let Some(pid) = job.pid_of(ProcessType::Main) else {
            return;
        };
        tracing::warn!(
            job = %self.core.job_name(job_id),
            pid,
            "kill timeout expired, sending KILL"
        );
        if let Err(error) = self.spawner.kill(pid, "KILL") {
            tracing::warn!(pid, %error, "kill failed");
        }
    }

    // ----- failure and completion -------------------------------------

    /// Record the first failure of a job. `process` of `None` marks a
    /// respawn-loop failure; `status` of `None` marks a spawn failure.
    fn job_failed(
        &mut self,
        job_id: JobId,
        process: Option<ProcessType>,
        status: Option<i32>,
    ) {
        let Some(job) = self.core.jobs.get_mut(job_id) else {
            return;
        };
        if job.failed {
            return;
        }
        job.failed = true;
        job.failed_process = process;
        job.exit_status = status;
        self.job_finished(job_id, true);
    }

    /// Resolve everything waiting on this job: release held events
    /// (propagating failure) and answer pending control callers.
    fn job_finished(&mut self, job_id: JobId, failed: bool) {
        let Some(job) = self.core.jobs.get_mut(job_id) else {
            return;
        };
        let blocking = std::mem::take(&mut job.blocking);
        if blocking.is_empty() {
            return;
        }
        let name = self.core.job_name(job_id);

        for record in blocking {
            match record {
                Blocked::Event(event) => {
                    if failed {
                        if let Some(event) = self.core.events.get_mut(event) {
                            event.failed = true;
                            event.failed_by = Some(name.clone());
                        }
                    }
                    self.core.events.unblock(event);
                }
                Blocked::StartReply(reply)
                | Blocked::StopReply(reply)
                | Blocked::RestartReply(reply) => {
                    let result = if failed {
                        Err(CoreError::JobFailed(name.clone()))
                    } else {
                        Ok(())
                    };
                    self.replies.push(Reply { id: reply, result });
                }
                Blocked::Job(_) | Blocked::EmitReply(_) => {
                    unreachable!("job blocking lists hold events and job replies only")
                }
            }
        }
    }

    // ----- lifecycle events -------------------------------------------

    /// Emit the lifecycle event for a state: JOB/INSTANCE always, RESULT
    /// plus failure detail on the stop pair, and the class's exported
    /// keys.
    fn emit_job_event(&mut self, job_id: JobId, state: State, block: bool) -> EventId {
        let job = self.core.jobs.get(job_id).expect("live job");
        let class = self.core.classes.get(job.class).expect("job class");

        let (name, stop) = match state {
            State::Starting => (STARTING_EVENT, false),
            State::Running => (STARTED_EVENT, false),
            State::Stopping => (STOPPING_EVENT, true),
            State::Waiting => (STOPPED_EVENT, true),
            _ => unreachable!("no lifecycle event for {}", state),
        };

        let mut env = Vec::new();
        environ::set(&mut env, "JOB", &class.name);
        environ::set(&mut env, "INSTANCE", &job.name);

        if stop {
            if job.failed {
                environ::set(&mut env, "RESULT", "failed");
                match (job.failed_process, job.exit_status) {
                    (Some(process), Some(status)) => {
                        environ::set(&mut env, "PROCESS", process.name());
                        if (status & !0xff) != 0 {
                            let signal = status >> 8;
                            match signal_name(signal) {
                                Some(name) => environ::set(&mut env, "EXIT_SIGNAL", name),
                                None => {
                                    environ::set(&mut env, "EXIT_SIGNAL", &signal.to_string())
                                }
                            }
                        } else {
                            environ::set(&mut env, "EXIT_STATUS", &status.to_string());
                        }
                    }
                    (Some(process), None) => {
                        // Spawn failure: no exit detail to report.
                        environ::set(&mut env, "PROCESS", process.name());
                    }
                    (None, _) => {
                        environ::set(&mut env, "PROCESS", "respawn");
                    }
                }
            } else {
                environ::set(&mut env, "RESULT", "ok");
            }
        }

        for key in &class.export {
            if let Some(value) = environ::lookup(&job.env, key) {
                let entry = format!("{}={}", key, value);
                environ::add(&mut env, &entry);
            }
        }

        let session = class.session;
        let event = self.core.events.emit(name, env, session);
        if block {
            self.core
                .events
                .get_mut(event)
                .expect("fresh event")
                .blocking
                .push(Blocked::Job(job_id));
        }
        event
    }

    // ----- reaper -----------------------------------------------------

    /// Child-exit entry point: locate the job by pid, clear the slot, and
    /// drive the appropriate transition.
    pub fn handle_child_exit(&mut self, pid: i32, status: ExitStatus) {
        let Some((job_id, ptype)) = self.core.find_pid(pid) else {
            tracing::debug!(pid, "reaped untracked process");
            return;
        };
        let name = self.core.job_name(job_id);
        match status {
            ExitStatus::Code(code) => {
                tracing::info!(job = %name, process = %ptype, pid, code, "process exited")
            }
            ExitStatus::Signal(signal) => tracing::info!(
                job = %name,
                process = %ptype,
                pid,
                signal = signal_name(signal).unwrap_or("?"),
                "process killed by signal"
            ),
        }

        self.core
            .jobs
            .get_mut(job_id)
            .expect("job owning pid")
            .clear_pid(ptype);

        match ptype {
            ProcessType::Main => {
                self.timers.cancel(job_id);
                self.main_exited(job_id, status);
            }
            ProcessType::PreStart | ProcessType::PostStop => {
                if status != ExitStatus::Code(0) {
                    self.job_failed(job_id, Some(ptype), Some(status.encode()));
                    self.change_goal(job_id, Goal::Stop);
                }
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
            ProcessType::PostStart | ProcessType::PreStop => {
                if status != ExitStatus::Code(0) {
                    tracing::warn!(job = %name, process = %ptype, "helper process failed");
                }
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
        }
    }

    /// The main process went away: decide between respawn, failure, and a
    /// plain stop, then drive whatever transition is due.
    fn main_exited(&mut self, job_id: JobId, status: ExitStatus) {
        let job = self.core.jobs.get(job_id).expect("live job");
        let class = self.core.classes.get(job.class).expect("job class");
        let state = job.state;
        let goal = job.goal;
        let normal = class.exit_is_normal(status);
        let respawnable = class.respawn.enabled;
        let encoded = status.encode();

        match state {
            State::Running if goal == Goal::Start => {
                if respawnable && !normal {
                    if self.respawn_limited(job_id) {
                        tracing::warn!(
                            job = %self.core.job_name(job_id),
                            "respawning too fast, stopped"
                        );
                        self.job_failed(job_id, None, None);
                        self.change_goal(job_id, Goal::Stop);
                    } else {
                        tracing::warn!(
                            job = %self.core.job_name(job_id),
                            "main process ended, respawning"
                        );
                        self.change_goal(job_id, Goal::Respawn);
                        let next = self.next_state_of(job_id);
                        self.change_state(job_id, next);
                    }
                } else {
                    if !normal {
                        self.job_failed(job_id, Some(ProcessType::Main), Some(encoded));
                    }
                    self.change_goal(job_id, Goal::Stop);
                }
            }
            State::Killed => {
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
            State::Stopping | State::PreStop => {
                // Blocked on the stopping event or the pre-stop script;
                // KILLED will see the cleared pid and move on.
            }
            _ => {
                // Died somewhere in the start sequence while a hook runs.
                if goal != Goal::Stop {
                    if !normal {
                        self.job_failed(job_id, Some(ProcessType::Main), Some(encoded));
                    }
                    self.change_goal(job_id, Goal::Stop);
                }
            }
        }
    }

    /// Bump the respawn window; true when the class's rate limit is
    /// exceeded.
    fn respawn_limited(&mut self, job_id: JobId) -> bool {
        let now = self.clock.now();
        let (limit, interval) = {
            let class = self.class_of(job_id).expect("job class");
            (class.respawn.limit, class.respawn.interval)
        };
        let job = self.core.jobs.get_mut(job_id).expect("live job");

        if let Some(window) = job.respawn_time {
            if now.duration_since(window) < interval {
                job.respawn_count += 1;
                return job.respawn_count > limit;
            }
        }
        job.respawn_time = Some(now);
        job.respawn_count = 1;
        false
    }

    // ----- fork tracer contract ---------------------------------------

    /// The external fork tracer settled (or failed to settle) the real
    /// main pid for an `expect` class.
    pub fn on_trace_complete(&mut self, job_id: JobId, result: Result<i32, String>) {
        let Some(job) = self.core.jobs.get_mut(job_id) else {
            return;
        };
        if job.state != State::Spawned || job.trace_state != TraceState::Active {
            return;
        }
        job.trace_state = TraceState::Done;

        match result {
            Ok(pid) => {
                job.set_pid(ProcessType::Main, pid);
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
            Err(error) => {
                tracing::warn!(
                    job = %self.core.job_name(job_id),
                    %error,
                    "fork tracer failed"
                );
                self.job_failed(job_id, Some(ProcessType::Main), None);
                self.change_goal(job_id, Goal::Stop);
                let next = self.next_state_of(job_id);
                self.change_state(job_id, next);
            }
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;

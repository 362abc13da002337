//! The execution engine - SELECT→BUILD→EXECUTE→DETECT→UPDATE
//!
//! A single driver task owns the loop. Control arrives on an mpsc channel
//! (start/pause/resume/stop/continue); everything the engine learns goes out
//! through the event bus. One child process at a time, two reader tasks per
//! iteration feeding the dialect-matched parser, three detectors racing over
//! the event stream. The first terminal signal wins the iteration.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ralph_core::signal::FatalKind;
use ralph_core::{
    EngineEvent, EngineState, EngineTuning, Error, Iteration, IterationOutcome, ResumePolicy,
    Result, SessionConfig, SessionSnapshot, Signal, SubagentNode, Task, TaskFilter,
};
use ralph_parser::{ParsedEvent, SignalScanner, StreamParser, SubagentTree, TreeDelta};
use ralph_plugins::{AgentHandle, AgentRunner, ExecOptions, OutputPipe, Tracker};

use crate::audit::AuditLog;
use crate::bus::EventBus;
use crate::lock::SessionLock;
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::select::select_task;
use crate::snapshot;

// ---------------------------------------------------------------------------
// Control surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Pause { force: bool },
    Resume,
    Stop { force: bool },
    /// Re-enter Selecting from Complete (new tasks were added externally).
    Continue,
}

/// Cheap handle for steering a running engine.
#[derive(Clone)]
pub struct EngineController {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineController {
    pub async fn start(&self) -> bool {
        self.send(EngineCommand::Start).await
    }

    pub async fn pause(&self, force: bool) -> bool {
        self.send(EngineCommand::Pause { force }).await
    }

    pub async fn resume(&self) -> bool {
        self.send(EngineCommand::Resume).await
    }

    pub async fn stop(&self, force: bool) -> bool {
        self.send(EngineCommand::Stop { force }).await
    }

    pub async fn continue_execution(&self) -> bool {
        self.send(EngineCommand::Continue).await
    }

    async fn send(&self, cmd: EngineCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

pub struct EngineParams {
    pub session: SessionConfig,
    pub tuning: EngineTuning,
    /// Prompt template; None = built-in default.
    pub template: Option<String>,
    pub filter: TaskFilter,
    pub exec_options: ExecOptions,
    /// Take over a live session lock (`--force`).
    pub force_lock: bool,
}

pub struct Engine {
    session: SessionConfig,
    tuning: EngineTuning,
    template: String,
    filter: TaskFilter,
    exec_options: ExecOptions,
    force_lock: bool,

    runner: Arc<dyn AgentRunner>,
    tracker: Box<dyn Tracker>,
    audit: AuditLog,

    bus: EventBus,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    cmd_open: bool,

    state: EngineState,
    history: Vec<Iteration>,
    fetch_seq: u64,
    lock: Option<SessionLock>,
    pause_requested: bool,
    stop_force: Option<bool>,
}

enum WaitOutcome {
    Proceed,
    Shutdown,
}

/// Per-task attempt bookkeeping. Rate-limit sleeps never count as retries.
#[derive(Debug, Clone, Copy, Default)]
struct Attempts {
    errors: u32,
    rate_limits: u32,
}

struct PendingRetry {
    task: Task,
    attempts: Attempts,
}

impl Engine {
    pub fn new(
        params: EngineParams,
        runner: Arc<dyn AgentRunner>,
        tracker: Box<dyn Tracker>,
        audit: AuditLog,
    ) -> (Self, EngineController) {
        let (tx, cmd_rx) = mpsc::channel(32);
        let bus = EventBus::new(params.tuning.subscriber_queue);
        let engine = Self {
            session: params.session,
            tuning: params.tuning,
            template: params.template.unwrap_or_else(|| prompt::DEFAULT_TEMPLATE.to_string()),
            filter: params.filter,
            exec_options: params.exec_options,
            force_lock: params.force_lock,
            runner,
            tracker,
            audit,
            bus,
            cmd_rx,
            cmd_open: true,
            state: EngineState::Ready,
            history: Vec::new(),
            fetch_seq: 0,
            lock: None,
            pause_requested: false,
            stop_force: None,
        };
        (engine, EngineController { tx })
    }

    pub fn subscribe(&mut self, id: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        self.bus.subscribe(id)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn history(&self) -> &[Iteration] {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    /// Run the loop until stopped, complete with no controller, or fatal.
    /// Consumes the engine; the iteration history is the result.
    pub async fn run(mut self) -> Result<Vec<Iteration>> {
        self.lock = Some(SessionLock::acquire(
            &self.session.lock_path,
            self.force_lock,
        )?);
        self.audit.record("session_started", true);
        info!(
            "session {} started in {} (agent={}, tracker={})",
            self.session.id,
            self.session.cwd.display(),
            self.session.agent,
            self.session.tracker
        );

        let result = self.drive().await;

        if let Err(e) = &result {
            self.audit
                .record_with("session_failed", false, Some(e.to_string()), None);
        }
        self.audit.record("session_stopped", true);
        if let Some(lock) = self.lock.take() {
            let _ = lock.release();
        }
        info!("session {} finished: {}", self.session.id, self.state);

        result.map(|_| self.history)
    }

    async fn drive(&mut self) -> Result<()> {
        // A Running resume policy enters the loop on its own; the default
        // holds in Ready until the controller says start.
        if self.session.resume != ResumePolicy::Running
            && matches!(self.wait_for_start().await, WaitOutcome::Shutdown)
        {
            self.enter_stopped();
            return Ok(());
        }

        let policy = RetryPolicy::new(
            self.tuning.max_retries,
            Duration::from_secs(self.tuning.backoff_base_secs),
            Duration::from_secs(self.tuning.backoff_cap_secs),
        );
        let mut pending_retry: Option<PendingRetry> = None;

        loop {
            self.drain_commands();
            if self.stop_force.is_some() {
                self.enter_stopped();
                return Ok(());
            }
            if self.pause_requested {
                match self.enter_paused().await {
                    WaitOutcome::Proceed => {}
                    WaitOutcome::Shutdown => {
                        self.enter_stopped();
                        return Ok(());
                    }
                }
            }

            // Iteration cap: 0 = unlimited.
            if self.tuning.iterations > 0 && self.history.len() as u32 >= self.tuning.iterations {
                debug!("iteration cap {} reached", self.tuning.iterations);
                match self.complete_and_wait().await {
                    WaitOutcome::Proceed => continue,
                    WaitOutcome::Shutdown => return Ok(()),
                }
            }

            // SELECT - or resume the task we owe a retry.
            let (task, attempts) = match pending_retry.take() {
                Some(p) => (p.task, p.attempts),
                None => {
                    self.set_state(EngineState::Selecting);
                    let tasks = match self.fetch_tasks(&policy).await? {
                        Some(tasks) => tasks,
                        None => {
                            self.enter_stopped();
                            return Ok(());
                        }
                    };
                    match select_task(&tasks) {
                        Some(task) => (task.clone(), Attempts::default()),
                        None => {
                            if self.history.is_empty() {
                                self.seal_empty_iteration().await;
                            }
                            match self.complete_and_wait().await {
                                WaitOutcome::Proceed => continue,
                                WaitOutcome::Shutdown => return Ok(()),
                            }
                        }
                    }
                }
            };

            // BUILD.
            self.set_state(EngineState::Building);
            let prompt_text = prompt::render(&self.template, &task);

            // EXECUTE + DETECT.
            let number = self.history.len() as u32 + 1;
            let run = self.run_iteration(number, &task, &prompt_text).await;
            let immediate_fatal = run.immediate_fatal();

            // Seal before UPDATE so observers always see the iteration first.
            let iteration = Iteration {
                number,
                task_id: Some(task.id.clone()),
                started_at: run.started_at,
                ended_at: run.ended_at,
                outcome: run.outcome,
                output: run.output,
                output_truncated: run.truncated,
                subagents: run.subagents,
            };
            self.seal_iteration(iteration).await;

            // UPDATE.
            match run.outcome {
                IterationOutcome::Completed => {
                    self.complete_task(&task).await;
                }
                IterationOutcome::RateLimited => {
                    let mut attempts = attempts;
                    attempts.rate_limits += 1;
                    let hint = match &run.signal {
                        Some(Signal::RateLimited { retry_after_secs }) => {
                            retry_after_secs.unwrap_or(0)
                        }
                        _ => 0,
                    };
                    let delay = policy.delay(attempts.rate_limits).max(Duration::from_secs(hint));
                    self.audit.record_with(
                        "rate_limited",
                        true,
                        None,
                        Some(serde_json::json!({"sleep_secs": delay.as_secs(), "task": task.id})),
                    );
                    if !self.countdown_sleep(delay).await {
                        self.enter_stopped();
                        return Ok(());
                    }
                    pending_retry = Some(PendingRetry { task, attempts });
                }
                IterationOutcome::Error => {
                    if let Some(fatal) = immediate_fatal {
                        return Err(self.fail(fatal));
                    }
                    let mut attempts = attempts;
                    attempts.errors += 1;
                    if policy.exhausted(attempts.errors) {
                        let err = Error::runner(
                            self.session.agent.clone(),
                            format!("retry budget exhausted after {} attempts", attempts.errors),
                        );
                        return Err(self.fail(err));
                    }
                    let delay = policy.delay(attempts.errors);
                    debug!(
                        "iteration {number} errored (attempt {}), backing off {}s",
                        attempts.errors,
                        delay.as_secs()
                    );
                    if !self.plain_sleep(delay).await {
                        self.enter_stopped();
                        return Ok(());
                    }
                    pending_retry = Some(PendingRetry { task, attempts });
                }
                IterationOutcome::Interrupted => {
                    if self.stop_force.is_some() {
                        self.enter_stopped();
                        return Ok(());
                    }
                    // pause(force): hold the task for the resume
                    pending_retry = Some(PendingRetry { task, attempts });
                }
                IterationOutcome::NoTask => unreachable!("executed iterations carry a task"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // One iteration: child process, readers, parser, detectors
    // -----------------------------------------------------------------------

    async fn run_iteration(&mut self, number: u32, task: &Task, prompt_text: &str) -> IterationRun {
        let started_at = Utc::now();
        let mut run = IterationRun::new(started_at);

        let mut handle = match self.runner.execute(prompt_text, &self.exec_options).await {
            Ok(h) => h,
            Err(e) => {
                run.signal = Some(match &e {
                    Error::MissingBinary { binary } => Signal::Fatal {
                        kind: FatalKind::MissingBinary,
                        message: format!("{binary}: not found"),
                    },
                    other => Signal::Fatal {
                        kind: FatalKind::PluginCrash,
                        message: other.to_string(),
                    },
                });
                run.outcome = IterationOutcome::Error;
                run.ended_at = Utc::now();
                return run;
            }
        };

        self.set_state(EngineState::Executing {
            iteration: number,
            child_pid: handle.pid(),
            started_at,
        });
        self.bus.publish(&EngineEvent::IterationStarted {
            iteration: number,
            task: Some(task.clone()),
        });
        self.audit.record_with(
            "iteration_started",
            true,
            None,
            Some(serde_json::json!({"iteration": number, "task": task.id})),
        );

        // Reader tasks: one per pipe, byte chunks in arrival order.
        let cancel = CancellationToken::new();
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<(usize, Vec<u8>)>(64);
        let mut readers: Vec<JoinHandle<()>> = Vec::new();
        if let Some(stdout) = handle.take_stdout() {
            readers.push(spawn_reader(stdout, 0, chunk_tx.clone(), cancel.clone()));
        }
        if let Some(stderr) = handle.take_stderr() {
            readers.push(spawn_reader(stderr, 1, chunk_tx.clone(), cancel.clone()));
        }
        drop(chunk_tx);

        let dialect = self.runner.meta().dialect;
        let mut parsers = [StreamParser::new(dialect), StreamParser::new(dialect)];
        let mut tree = SubagentTree::new();
        let mut scanner = SignalScanner::new();

        let completion_grace = Duration::from_secs(self.tuning.completion_grace_secs);
        let stop_grace = Duration::from_secs(self.tuning.stop_grace_secs);
        // After the child is reaped, readers get a short window to drain any
        // buffered output before being cancelled (a grandchild may be
        // holding the pipe open).
        let drain_guard = Duration::from_secs(1);

        let mut timer: Pin<Box<tokio::time::Sleep>> =
            Box::pin(tokio::time::sleep(Duration::ZERO));
        let mut timer_armed: Option<TimerPurpose> = None;
        let mut reaped: Option<i32> = None;
        let mut interrupted = false;

        loop {
            let cmd_open = self.cmd_open;
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv(), if cmd_open => match cmd {
                    Some(EngineCommand::Stop { force }) => {
                        self.stop_force = Some(force);
                        interrupted = true;
                        self.set_state(EngineState::Stopping);
                        if reaped.is_none() {
                            reaped = Some(if force {
                                let _ = handle.kill().await;
                                handle.wait().await.unwrap_or(-1)
                            } else {
                                handle.interrupt(stop_grace).await.unwrap_or(-1)
                            });
                        }
                        timer.as_mut().reset(tokio::time::Instant::now() + drain_guard);
                        timer_armed = Some(TimerPurpose::DrainGuard);
                    }
                    Some(EngineCommand::Pause { force: true }) => {
                        self.pause_requested = true;
                        interrupted = true;
                        if reaped.is_none() {
                            reaped = Some(handle.interrupt(stop_grace).await.unwrap_or(-1));
                        }
                        timer.as_mut().reset(tokio::time::Instant::now() + drain_guard);
                        timer_armed = Some(TimerPurpose::DrainGuard);
                    }
                    Some(EngineCommand::Pause { force: false }) => self.pause_requested = true,
                    Some(EngineCommand::Resume) => self.pause_requested = false,
                    Some(_) => {}
                    None => self.cmd_open = false,
                },

                _ = &mut timer, if timer_armed.is_some() => {
                    match timer_armed.take() {
                        Some(TimerPurpose::CompletionGrace) => {
                            // Sentinel seen but the child lingers: interrupt.
                            if reaped.is_none() {
                                reaped = Some(handle.interrupt(stop_grace).await.unwrap_or(-1));
                            }
                            timer.as_mut().reset(tokio::time::Instant::now() + drain_guard);
                            timer_armed = Some(TimerPurpose::DrainGuard);
                        }
                        Some(TimerPurpose::DrainGuard) | None => cancel.cancel(),
                    }
                }

                chunk = chunk_rx.recv() => match chunk {
                    Some((source, bytes)) => {
                        self.capture_chunk(number, &bytes, &mut run);
                        parsers[source].push(&bytes);
                        let fired = self.pump_events(
                            number,
                            &mut parsers[source],
                            &mut tree,
                            &mut scanner,
                            &mut run,
                        );
                        if let Some(signal) = fired {
                            match signal {
                                Signal::Completion => {
                                    if reaped.is_none() && timer_armed.is_none() {
                                        timer.as_mut().reset(
                                            tokio::time::Instant::now() + completion_grace,
                                        );
                                        timer_armed = Some(TimerPurpose::CompletionGrace);
                                    }
                                }
                                Signal::RateLimited { .. } => {
                                    if reaped.is_none() {
                                        reaped = Some(
                                            handle.interrupt(stop_grace).await.unwrap_or(-1),
                                        );
                                    }
                                    timer.as_mut().reset(tokio::time::Instant::now() + drain_guard);
                                    timer_armed = Some(TimerPurpose::DrainGuard);
                                }
                                Signal::Fatal { .. } => {
                                    if reaped.is_none() {
                                        let _ = handle.kill().await;
                                        reaped = Some(handle.wait().await.unwrap_or(-1));
                                    }
                                    timer.as_mut().reset(tokio::time::Instant::now() + drain_guard);
                                    timer_armed = Some(TimerPurpose::DrainGuard);
                                }
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        // End of stream: flush partial lines, then drain the queues.
        for parser in parsers.iter_mut() {
            parser.finish();
            self.pump_events(number, parser, &mut tree, &mut scanner, &mut run);
        }

        let exit_code = match reaped {
            Some(code) => code,
            None => handle.wait().await.unwrap_or(-1),
        };
        run.exit_code = Some(exit_code);

        if run.signal.is_none() {
            if let Some(sig) = scanner.check_exit_code(exit_code) {
                self.bus.publish(&EngineEvent::DetectorFired {
                    iteration: number,
                    signal: sig.clone(),
                });
                run.signal = Some(sig);
            }
        }

        for node in tree.finalize() {
            self.bus.publish(&EngineEvent::SubagentFinished {
                iteration: number,
                node,
            });
        }
        run.subagents = tree.into_nodes();

        for reader in readers {
            let _ = reader.await;
        }

        run.outcome = if interrupted {
            IterationOutcome::Interrupted
        } else {
            match &run.signal {
                Some(Signal::Completion) => IterationOutcome::Completed,
                Some(Signal::RateLimited { .. }) => IterationOutcome::RateLimited,
                Some(Signal::Fatal { .. }) => IterationOutcome::Error,
                None if exit_code == 0 => IterationOutcome::Completed,
                None => IterationOutcome::Error,
            }
        };
        run.ended_at = Utc::now();
        run
    }

    /// Drain parser events: detectors, tree deltas, subscriber fan-out.
    /// Returns a signal the first time one fires in this iteration.
    fn pump_events(
        &mut self,
        number: u32,
        parser: &mut StreamParser,
        tree: &mut SubagentTree,
        scanner: &mut SignalScanner,
        run: &mut IterationRun,
    ) -> Option<Signal> {
        let mut fired = None;
        while let Some(ev) = parser.next_event() {
            if let Some(sig) = scanner.scan(&ev) {
                self.bus.publish(&EngineEvent::DetectorFired {
                    iteration: number,
                    signal: sig.clone(),
                });
                self.audit.record_with(
                    "detector_fired",
                    true,
                    None,
                    Some(serde_json::json!({"iteration": number, "signal": sig.name()})),
                );
                run.signal = Some(sig.clone());
                fired = Some(sig);
            }
            match &ev {
                ParsedEvent::Structured(se) => match tree.apply(se) {
                    Some(TreeDelta::Spawned(node)) => {
                        self.bus.publish(&EngineEvent::SubagentSpawned {
                            iteration: number,
                            node,
                        });
                    }
                    Some(TreeDelta::Updated(node)) => {
                        self.bus.publish(&EngineEvent::SubagentUpdated {
                            iteration: number,
                            node,
                        });
                    }
                    Some(TreeDelta::Finished(node)) => {
                        self.bus.publish(&EngineEvent::SubagentFinished {
                            iteration: number,
                            node,
                        });
                    }
                    Some(TreeDelta::Unmatched(call_id)) => {
                        debug!("result for unknown call id {call_id}");
                    }
                    None => {}
                },
                ParsedEvent::ParseError { reason, .. } => {
                    // Never fatal, never user-visible by default.
                    debug!("parse error: {reason}");
                }
                ParsedEvent::Line { .. } => {}
            }
        }
        fired
    }

    fn capture_chunk(&mut self, number: u32, bytes: &[u8], run: &mut IterationRun) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.bus.publish(&EngineEvent::OutputAppended {
            iteration: number,
            chunk: text.clone(),
        });

        if run.truncated {
            return;
        }
        if run.output.len() + text.len() > self.tuning.output_capture_bytes {
            run.truncated = true;
            self.bus.publish(&EngineEvent::OutputTruncated {
                iteration: number,
                dropped_bytes: text.len(),
            });
        } else {
            run.output.push_str(&text);
        }
    }

    // -----------------------------------------------------------------------
    // SELECT / UPDATE helpers
    // -----------------------------------------------------------------------

    /// Fetch the task snapshot with transient-error retries. `Ok(None)`
    /// means a stop arrived while backing off.
    async fn fetch_tasks(&mut self, policy: &RetryPolicy) -> Result<Option<Vec<Task>>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.fetch_seq += 1;
            match self.tracker.get_tasks(&self.filter).await {
                Ok(tasks) => {
                    debug!("fetch #{} returned {} tasks", self.fetch_seq, tasks.len());
                    return Ok(Some(tasks));
                }
                Err(e) if e.is_retryable() && !policy.exhausted(attempt) => {
                    let delay = policy.delay(attempt);
                    warn!("tracker fetch failed ({e}), retrying in {}s", delay.as_secs());
                    self.audit
                        .record_with("tracker_error", false, Some(e.to_string()), None);
                    if !self.plain_sleep(delay).await {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    async fn complete_task(&mut self, task: &Task) {
        match self.tracker.complete_task(&task.id, None).await {
            Ok(outcome) => {
                let mut done = task.clone();
                done.status = ralph_core::TaskStatus::Completed;
                self.bus.publish(&EngineEvent::TaskUpdated { task: done });
                self.audit.record_with(
                    "task_completed",
                    true,
                    None,
                    Some(serde_json::json!({"task": task.id, "already": matches!(outcome, ralph_core::CompleteOutcome::AlreadyCompleted)})),
                );
            }
            Err(e) => {
                // Leave the tracker alone; the task stays pending and the
                // next SELECT will pick it up again.
                warn!("complete_task({}) failed: {e}", task.id);
                self.audit
                    .record_with("task_completed", false, Some(e.to_string()), None);
            }
        }
    }

    async fn seal_iteration(&mut self, iteration: Iteration) {
        self.history.push(iteration.clone());
        self.write_snapshot(&iteration).await;
        self.audit.record_with(
            "iteration_finished",
            true,
            None,
            Some(serde_json::json!({
                "iteration": iteration.number,
                "outcome": iteration.outcome.to_string(),
                "task": iteration.task_id,
            })),
        );
        self.bus
            .publish(&EngineEvent::IterationFinished { iteration });
    }

    /// A session whose very first SELECT finds nothing still seals one
    /// iteration so the snapshot records why nothing happened.
    async fn seal_empty_iteration(&mut self) {
        let now = Utc::now();
        self.seal_iteration(Iteration {
            number: 1,
            task_id: None,
            started_at: now,
            ended_at: now,
            outcome: IterationOutcome::NoTask,
            output: String::new(),
            output_truncated: false,
            subagents: Vec::new(),
        })
        .await;
    }

    async fn write_snapshot(&self, iteration: &Iteration) {
        let snap = SessionSnapshot {
            session_id: self.session.id.clone(),
            cwd: self.session.cwd.clone(),
            iterations: self.history.len() as u32,
            last_outcome: Some(iteration.outcome),
            last_task_id: iteration.task_id.clone(),
            state: self.state.name().to_string(),
            saved_at: Utc::now(),
        };
        let path = snapshot::snapshot_path(&self.session.cwd);
        if let Err(e) = snapshot::write_snapshot(&path, &snap).await {
            warn!("snapshot write failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // State transitions and waits
    // -----------------------------------------------------------------------

    fn set_state(&mut self, to: EngineState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to.clone());
        debug!("state: {from} → {to}");
        self.bus.publish(&EngineEvent::StateChanged { from, to });
    }

    fn enter_stopped(&mut self) {
        if !matches!(self.state, EngineState::Stopping) {
            self.set_state(EngineState::Stopping);
        }
        self.set_state(EngineState::Stopped);
    }

    fn fail(&mut self, error: Error) -> Error {
        let kind = match &error {
            Error::Auth { .. } => "auth",
            Error::MissingBinary { .. } => "missing_binary",
            Error::InvalidPrompt(_) => "invalid_prompt",
            Error::InvalidConfig(_) => "invalid_config",
            Error::PluginCrash(_) => "plugin_crash",
            _ => "transient",
        };
        self.bus.publish(&EngineEvent::FatalError {
            kind: kind.to_string(),
            message: error.to_string(),
            hint: fatal_hint(&error),
        });
        self.set_state(EngineState::Error {
            kind: kind.to_string(),
        });
        error
    }

    async fn wait_for_start(&mut self) -> WaitOutcome {
        loop {
            match self.cmd_rx.recv().await {
                Some(EngineCommand::Start)
                | Some(EngineCommand::Continue)
                | Some(EngineCommand::Resume) => return WaitOutcome::Proceed,
                Some(EngineCommand::Stop { .. }) | None => return WaitOutcome::Shutdown,
                Some(_) => {}
            }
        }
    }

    async fn enter_paused(&mut self) -> WaitOutcome {
        let prev = self.state.clone();
        self.set_state(EngineState::Paused {
            prev: Box::new(prev),
        });
        self.audit.record("paused", true);
        loop {
            match self.cmd_rx.recv().await {
                Some(EngineCommand::Resume) | Some(EngineCommand::Continue) => {
                    self.pause_requested = false;
                    self.audit.record("resumed", true);
                    return WaitOutcome::Proceed;
                }
                Some(EngineCommand::Stop { force }) => {
                    self.stop_force = Some(force);
                    return WaitOutcome::Shutdown;
                }
                None => return WaitOutcome::Shutdown,
                Some(_) => {}
            }
        }
    }

    /// Terminal-unless-resumed: wait in Complete for continue_execution().
    async fn complete_and_wait(&mut self) -> WaitOutcome {
        self.set_state(EngineState::Complete);
        if !self.cmd_open {
            return WaitOutcome::Shutdown;
        }
        loop {
            match self.cmd_rx.recv().await {
                Some(EngineCommand::Continue) => return WaitOutcome::Proceed,
                Some(EngineCommand::Stop { force }) => {
                    self.stop_force = Some(force);
                    self.enter_stopped();
                    return WaitOutcome::Shutdown;
                }
                None => {
                    self.cmd_open = false;
                    return WaitOutcome::Shutdown;
                }
                Some(_) => {}
            }
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(EngineCommand::Stop { force }) => self.stop_force = Some(force),
                Ok(EngineCommand::Pause { .. }) => self.pause_requested = true,
                Ok(EngineCommand::Resume) => self.pause_requested = false,
                Ok(_) => {}
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.cmd_open = false;
                    break;
                }
            }
        }
    }

    /// Sleep that stays responsive to stop. Returns false when stopping.
    async fn plain_sleep(&mut self, duration: Duration) -> bool {
        self.interruptible_sleep(duration, false).await
    }

    /// Rate-limit sleep with a per-second countdown event.
    async fn countdown_sleep(&mut self, duration: Duration) -> bool {
        self.interruptible_sleep(duration, true).await
    }

    async fn interruptible_sleep(&mut self, duration: Duration, countdown: bool) -> bool {
        let mut remaining = duration.as_secs().max(1);
        while remaining > 0 {
            if countdown {
                self.bus.publish(&EngineEvent::RateLimitCountdown {
                    remaining_secs: remaining,
                });
            }
            let cmd_open = self.cmd_open;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => remaining -= 1,
                cmd = self.cmd_rx.recv(), if cmd_open => match cmd {
                    Some(EngineCommand::Stop { force }) => {
                        self.stop_force = Some(force);
                        return false;
                    }
                    Some(EngineCommand::Pause { .. }) => self.pause_requested = true,
                    Some(EngineCommand::Resume) => self.pause_requested = false,
                    Some(_) => {}
                    None => self.cmd_open = false,
                },
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerPurpose {
    CompletionGrace,
    DrainGuard,
}

// ---------------------------------------------------------------------------
// Iteration scratch state
// ---------------------------------------------------------------------------

struct IterationRun {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    outcome: IterationOutcome,
    output: String,
    truncated: bool,
    subagents: Vec<SubagentNode>,
    signal: Option<Signal>,
    exit_code: Option<i32>,
}

impl IterationRun {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ended_at: started_at,
            outcome: IterationOutcome::Error,
            output: String::new(),
            truncated: false,
            subagents: Vec::new(),
            signal: None,
            exit_code: None,
        }
    }

    /// Fatal kinds that bypass the retry policy entirely.
    fn immediate_fatal(&self) -> Option<Error> {
        match &self.signal {
            Some(Signal::Fatal { kind, message }) => match kind {
                FatalKind::Auth => Some(Error::auth(message.clone())),
                FatalKind::MissingBinary => Some(Error::MissingBinary {
                    binary: message.clone(),
                }),
                FatalKind::InvalidPrompt => Some(Error::InvalidPrompt(message.clone())),
                FatalKind::ToolError | FatalKind::PluginCrash => None,
            },
            _ => None,
        }
    }
}

fn fatal_hint(error: &Error) -> Option<String> {
    match error {
        Error::Auth { .. } => Some("log in with the vendor CLI, then re-run".to_string()),
        Error::MissingBinary { binary } => {
            Some(format!("install {binary} or set the binary setup answer"))
        }
        Error::SessionLocked { .. } => Some("use --force to take over the session".to_string()),
        _ => None,
    }
}

fn spawn_reader(
    pipe: OutputPipe,
    source: usize,
    tx: mpsc::Sender<(usize, Vec<u8>)>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    use tokio::io::AsyncReadExt;
    tokio::spawn(async move {
        let mut pipe = pipe;
        let mut buf = [0u8; 8192];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                read = pipe.read(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send((source, buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                },
            }
        }
    })
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobManager: runs the registered job while this process leads
//!
//! A single control loop owns the run handle. It reacts to leadership
//! statuses, to commands from the public handle, and to the run finishing.
//! The job itself runs on its own task, so the loop is never blocked by job
//! execution; it only waits on a job during teardown, bounded by the grace
//! period.

use crate::error::ManagerError;
use crate::job::{Job, JobResult, JobScope};
use std::sync::{Arc, Mutex};
use tenure_core::{FencingToken, JobManagerConfig, LeadershipStatus, StatusReceiver};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// How a run ended from the manager's point of view
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job returned on its own
    Completed(JobResult),
    /// The job panicked; the panic was contained to its task
    Panicked(String),
    /// The job ignored cancellation for the whole grace period and was
    /// left running
    Abandoned,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed(result) => write!(f, "{}", result),
            RunOutcome::Panicked(message) => write!(f, "panicked: {}", message),
            RunOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Terminal record of one run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub job: String,
    pub token: FencingToken,
    pub outcome: RunOutcome,
    /// False when the run's term was over by the time it ended; results
    /// from such a run must not be acted upon
    pub authoritative: bool,
}

/// Result of `JobManager::stop`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    Idle,
    /// The run wound down within the grace period
    Stopped(RunReport),
    /// The run outlived the grace period and was detached
    Abandoned(RunReport),
}

/// The run currently in flight
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveRun {
    pub job: String,
    pub token: FencingToken,
}

/// One in-flight execution of a job
struct JobRunHandle {
    job: String,
    token: FencingToken,
    cancel: CancellationToken,
    done: JoinHandle<JobResult>,
}

enum Command {
    Start {
        job: Arc<dyn Job>,
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    Stop {
        reply: oneshot::Sender<StopOutcome>,
    },
    ActiveRun {
        reply: oneshot::Sender<Option<ActiveRun>>,
    },
    Shutdown {
        reply: oneshot::Sender<StopOutcome>,
    },
}

type ReportSubscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<RunReport>>>>;

/// Receives a `RunReport` for every run that ends
pub struct ReportReceiver {
    rx: mpsc::UnboundedReceiver<RunReport>,
}

impl ReportReceiver {
    /// Next report; `None` once the manager has shut down
    pub async fn recv(&mut self) -> Option<RunReport> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RunReport> {
        self.rx.try_recv().ok()
    }
}

/// Handle to the job manager's control loop
pub struct JobManager {
    commands: mpsc::UnboundedSender<Command>,
    reports: ReportSubscribers,
    task: JoinHandle<()>,
}

impl JobManager {
    /// Spawn the control loop, following the given status stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: JobManagerConfig, statuses: StatusReceiver) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let reports: ReportSubscribers = Arc::new(Mutex::new(Vec::new()));

        let control = ControlLoop {
            config,
            status: LeadershipStatus::Unknown("no status yet".to_string()),
            job: None,
            run: None,
            last_token: None,
            reports: Arc::clone(&reports),
            commands: command_rx,
            stop_waiters: Vec::new(),
            closing: false,
        };
        let task = tokio::spawn(control.run(statuses));

        Self {
            commands,
            reports,
            task,
        }
    }

    /// Register the job. Registering the same job name again is a no-op.
    pub async fn start(&self, job: Arc<dyn Job>) -> Result<(), ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { job, reply })?;
        rx.await.map_err(|_| ManagerError::Closed)?
    }

    /// Unregister the job, winding down any run within the grace period.
    /// A stop that arrives while a run is already being torn down is
    /// answered by that teardown.
    pub async fn stop(&self) -> Result<StopOutcome, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| ManagerError::Closed)
    }

    pub async fn active_run(&self) -> Result<Option<ActiveRun>, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ActiveRun { reply })?;
        rx.await.map_err(|_| ManagerError::Closed)
    }

    pub fn subscribe_reports(&self) -> ReportReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        ReportReceiver { rx }
    }

    /// Stop any run and end the control loop
    pub async fn shutdown(self) -> Result<StopOutcome, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        let outcome = rx.await.map_err(|_| ManagerError::Closed)?;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "job manager loop ended abnormally");
        }
        Ok(outcome)
    }

    fn send(&self, command: Command) -> Result<(), ManagerError> {
        self.commands.send(command).map_err(|_| ManagerError::Closed)
    }
}

enum Wake {
    Status(Option<LeadershipStatus>),
    Command(Option<Command>),
    Finished(Result<JobResult, JoinError>),
}

enum TeardownWake {
    Finished(Result<JobResult, JoinError>),
    GraceOver,
    Command(Option<Command>),
}

struct ControlLoop {
    config: JobManagerConfig,
    /// Latest status observed from the elector
    status: LeadershipStatus,
    job: Option<Arc<dyn Job>>,
    run: Option<JobRunHandle>,
    /// Token of the most recently started run
    last_token: Option<FencingToken>,
    reports: ReportSubscribers,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Stop and shutdown requests answered by the teardown in progress
    stop_waiters: Vec<oneshot::Sender<StopOutcome>>,
    /// Set once shutdown was requested or every handle is gone
    closing: bool,
}

impl ControlLoop {
    async fn run(mut self, mut statuses: StatusReceiver) {
        let mut statuses_open = true;

        while !self.closing {
            let wake = tokio::select! {
                biased;
                status = statuses.recv(), if statuses_open => Wake::Status(status),
                command = self.commands.recv() => Wake::Command(command),
                joined = finished(&mut self.run) => Wake::Finished(joined),
            };

            match wake {
                Wake::Status(Some(status)) => self.on_status(status).await,
                Wake::Status(None) => {
                    statuses_open = false;
                    tracing::warn!("status stream closed, treating leadership as lost");
                    self.on_status(LeadershipStatus::Unknown("status stream closed".to_string()))
                        .await;
                }
                Wake::Command(Some(Command::Start { job, reply })) => {
                    let registered = self.register(job);
                    if registered.is_ok() {
                        self.maybe_start();
                    }
                    let _ = reply.send(registered);
                }
                Wake::Command(Some(Command::Stop { reply })) => {
                    let outcome = self.unregister().await;
                    let _ = reply.send(outcome);
                }
                Wake::Command(Some(Command::ActiveRun { reply })) => {
                    let _ = reply.send(self.run.as_ref().map(|run| ActiveRun {
                        job: run.job.clone(),
                        token: run.token,
                    }));
                }
                Wake::Command(Some(Command::Shutdown { reply })) => {
                    self.closing = true;
                    let outcome = self.unregister().await;
                    let _ = reply.send(outcome);
                }
                Wake::Command(None) => {
                    // Every handle is gone
                    self.closing = true;
                    self.unregister().await;
                }
                Wake::Finished(joined) => self.on_finished(joined),
            }
        }

        tracing::debug!("job manager loop exited");
    }

    async fn on_status(&mut self, status: LeadershipStatus) {
        self.status = status.clone();

        match status {
            LeadershipStatus::Leader(token) => {
                if let Some(run) = &self.run {
                    if run.token == token {
                        return;
                    }
                    tracing::warn!(
                        running = run.token.value(),
                        current = token.value(),
                        "leadership term changed under a running job"
                    );
                    self.teardown().await;
                }
                self.maybe_start();
            }
            LeadershipStatus::Follower | LeadershipStatus::Unknown(_) => {
                if self.run.is_some() {
                    tracing::info!(status = %self.status, "leadership lost, stopping job");
                    self.teardown().await;
                }
            }
        }
    }

    fn register(&mut self, job: Arc<dyn Job>) -> Result<(), ManagerError> {
        if let Some(current) = &self.job {
            if current.name() == job.name() {
                return Ok(());
            }
            return Err(ManagerError::AlreadyRegistered {
                current: current.name().to_string(),
                requested: job.name().to_string(),
            });
        }

        tracing::info!(job = job.name(), "job registered");
        self.job = Some(job);
        Ok(())
    }

    fn forget_job(&mut self) {
        if let Some(job) = self.job.take() {
            tracing::info!(job = job.name(), "job unregistered");
        }
    }

    async fn unregister(&mut self) -> StopOutcome {
        self.forget_job();
        stop_outcome(self.teardown().await)
    }

    /// Start a run if leading under a new term with a job registered
    fn maybe_start(&mut self) {
        let LeadershipStatus::Leader(token) = self.status else {
            return;
        };
        let Some(job) = &self.job else {
            return;
        };
        if self.run.is_some() {
            return;
        }
        if let Some(last) = self.last_token {
            if token <= last {
                tracing::debug!(
                    job = job.name(),
                    token = token.value(),
                    last = last.value(),
                    "already ran under this term, waiting for the next one"
                );
                return;
            }
        }

        let cancel = CancellationToken::new();
        let scope = JobScope::new(job.name(), token, cancel.clone());
        let runner = Arc::clone(job);
        let done = tokio::spawn(async move { runner.run(scope).await });

        tracing::info!(job = job.name(), token = token.value(), "job started");
        self.last_token = Some(token);
        self.run = Some(JobRunHandle {
            job: job.name().to_string(),
            token,
            cancel,
            done,
        });
    }

    /// Cancel the run and wait for it, up to the grace period. Commands
    /// keep being served meanwhile; stops are answered with this run's
    /// report.
    async fn teardown(&mut self) -> Option<RunReport> {
        let mut run = self.run.take()?;
        run.cancel.cancel();

        let grace = tokio::time::sleep(self.config.grace_period);
        tokio::pin!(grace);

        let outcome = loop {
            let wake = tokio::select! {
                biased;
                joined = &mut run.done => TeardownWake::Finished(joined),
                _ = &mut grace => TeardownWake::GraceOver,
                command = self.commands.recv(), if !self.closing => TeardownWake::Command(command),
            };

            match wake {
                TeardownWake::Finished(joined) => break outcome_of(joined),
                TeardownWake::GraceOver => {
                    // Dropping the handle detaches the task; it keeps running
                    tracing::error!(
                        job = %run.job,
                        token = run.token.value(),
                        grace_ms = self.config.grace_period.as_millis() as u64,
                        "job ignored cancellation past the grace period, possible split-brain"
                    );
                    break RunOutcome::Abandoned;
                }
                TeardownWake::Command(command) => self.during_teardown(command),
            }
        };

        let report = self.report(run, outcome);
        let outcome = stop_outcome(Some(report.clone()));
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
        Some(report)
    }

    /// Serve a command while a run is winding down; nothing starts until it
    /// is gone
    fn during_teardown(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Start { job, reply }) => {
                let _ = reply.send(self.register(job));
            }
            Some(Command::Stop { reply }) => {
                self.forget_job();
                self.stop_waiters.push(reply);
            }
            Some(Command::Shutdown { reply }) => {
                self.forget_job();
                self.stop_waiters.push(reply);
                self.closing = true;
            }
            Some(Command::ActiveRun { reply }) => {
                let _ = reply.send(None);
            }
            None => {
                self.forget_job();
                self.closing = true;
            }
        }
    }

    fn on_finished(&mut self, joined: Result<JobResult, JoinError>) {
        if let Some(run) = self.run.take() {
            self.report(run, outcome_of(joined));
        }
    }

    fn report(&self, run: JobRunHandle, outcome: RunOutcome) -> RunReport {
        let authoritative = self.status == LeadershipStatus::Leader(run.token);
        let report = RunReport {
            job: run.job,
            token: run.token,
            outcome,
            authoritative,
        };

        match (&report.outcome, report.authoritative) {
            (RunOutcome::Panicked(message), _) => tracing::error!(
                job = %report.job,
                token = report.token.value(),
                panic = %message,
                "job panicked"
            ),
            (RunOutcome::Completed(JobResult::Cancelled) | RunOutcome::Abandoned, _) => {
                tracing::info!(job = %report.job, token = report.token.value(), outcome = %report.outcome, "job run ended")
            }
            (_, true) => tracing::info!(
                job = %report.job,
                token = report.token.value(),
                outcome = %report.outcome,
                "job finished"
            ),
            (_, false) => tracing::warn!(
                job = %report.job,
                token = report.token.value(),
                outcome = %report.outcome,
                status = %self.status,
                "job finished outside its term, result discarded"
            ),
        }

        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(report.clone()).is_ok());
        report
    }
}

/// Resolves when the current run's task ends; pends forever without one
async fn finished(run: &mut Option<JobRunHandle>) -> Result<JobResult, JoinError> {
    match run {
        Some(run) => (&mut run.done).await,
        None => std::future::pending().await,
    }
}

fn stop_outcome(report: Option<RunReport>) -> StopOutcome {
    match report {
        None => StopOutcome::Idle,
        Some(report) if report.outcome == RunOutcome::Abandoned => StopOutcome::Abandoned(report),
        Some(report) => StopOutcome::Stopped(report),
    }
}

fn outcome_of(joined: Result<JobResult, JoinError>) -> RunOutcome {
    match joined {
        Ok(result) => RunOutcome::Completed(result),
        Err(e) if e.is_panic() => RunOutcome::Panicked(panic_message(e.into_panic())),
        Err(_) => RunOutcome::Abandoned,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

//! Detached child processes performing a disruption on behalf of the
//! supervisor.
//!
//! Each child is spawned with the supervisor's pid and the disruption
//! deadline. While the child runs, the supervisor sends it a `SIGCONT` at a
//! fixed interval so that the child can tell whether it is still being
//! supervised. Stopping a child sends `SIGTERM`, and `SIGKILL` once a grace
//! period has elapsed without the child exiting.

use crate::{
    process::{self, ProcessManager},
    watchdog::Watchdog,
};
use chaos_controller_core::{DisruptionArgs, DisruptionDuration};
use chrono::{DateTime, Utc};
use nix::{sys::signal::Signal, unistd::Pid};
use std::{
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::{
    process::Command,
    sync::watch,
    time::{self, Duration, Instant},
};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    /// How long a child must survive to be considered started.
    pub startup: Duration,
    pub heartbeat: Duration,
    /// Number of consecutive heartbeats a child may miss before it considers
    /// the supervisor gone.
    pub max_missed: u32,
    /// How long a child may take to exit after `SIGTERM`.
    pub kill_grace: Duration,
}

pub const HEARTBEAT_INTERVAL_FLAG: &str = "--heartbeat-interval";
pub const HEARTBEAT_MISSES_FLAG: &str = "--heartbeat-misses";

pub struct BackgroundProcessManager<P> {
    processes: Arc<P>,
    program: PathBuf,
    leading_args: Vec<String>,
    args: DisruptionArgs,
    deadline: DateTime<Utc>,
    timings: Timings,
}

/// A running child. Dropping it does not stop the child.
pub struct BackgroundProcess<P> {
    inner: Arc<Inner<P>>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("targeted container does not exist: {0}")]
    UnknownTargetContainer(String),

    #[error("unable to start background process: {0}")]
    Spawn(#[source] io::Error),

    #[error("background process exited before it was assigned a pid")]
    NoProcess,

    #[error("an error occurred during startup of background process: {0}")]
    Startup(ExitStatus),

    #[error("failed to wait for background process: {0}")]
    Wait(#[source] Arc<io::Error>),
}

pub type Exit = Result<ExitStatus, Arc<io::Error>>;

struct Inner<P> {
    pid: u32,
    processes: Arc<P>,
    stopped: AtomicBool,
    exit: watch::Receiver<Option<Exit>>,
    kill_grace: Duration,
}

// === impl Timings ===

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(1),
            heartbeat: Duration::from_secs(1),
            max_missed: Watchdog::DEFAULT_MAX_MISSED,
            kill_grace: Duration::from_secs(5),
        }
    }
}

// === impl BackgroundProcessManager ===

impl<P: ProcessManager> BackgroundProcessManager<P> {
    pub fn new(
        processes: Arc<P>,
        program: impl Into<PathBuf>,
        args: DisruptionArgs,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            processes,
            program: program.into(),
            leading_args: Vec::new(),
            args,
            deadline,
            timings: Timings::default(),
        }
    }

    /// Arguments placed before the disruption arguments, e.g. a script for
    /// an interpreter.
    pub fn with_leading_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.leading_args = args.into_iter().collect();
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Builds the child's arguments, restricted to `target_container`. The
    /// child is told how often to expect heartbeats.
    pub fn command_args(
        &self,
        target_container: &str,
        kind_args: impl IntoIterator<Item = String>,
    ) -> Result<Vec<String>, Error> {
        let narrowed = self
            .args
            .narrowed_to(target_container)
            .ok_or_else(|| Error::UnknownTargetContainer(target_container.to_string()))?;
        let args = DisruptionArgs {
            parent_pid: Some(self.processes.process_id()),
            deadline: Some(self.deadline),
            ..narrowed
        };
        let heartbeat = i64::try_from(self.timings.heartbeat.as_nanos()).unwrap_or(i64::MAX);
        let watchdog_args = [
            HEARTBEAT_INTERVAL_FLAG.to_string(),
            DisruptionDuration::from_nanos(heartbeat).to_string(),
            HEARTBEAT_MISSES_FLAG.to_string(),
            self.timings.max_missed.to_string(),
        ];
        Ok(args.create_cmd_args(watchdog_args.into_iter().chain(kind_args)))
    }

    /// Spawns a child for `target_container` and waits for it to start.
    ///
    /// A child that fails within the startup window fails the call. Once
    /// started, the child is sent a heartbeat until it exits or is stopped.
    pub async fn start(
        &self,
        target_container: &str,
        kind_args: impl IntoIterator<Item = String>,
    ) -> Result<BackgroundProcess<P>, Error> {
        let args = self.command_args(target_container, kind_args)?;
        info!(container = %target_container, ?args, "Starting child command");

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(Error::Spawn)?;
        let pid = child.id().ok_or(Error::NoProcess)?;

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let exit = child.wait().await.map_err(Arc::new);
            let _ = exit_tx.send(Some(exit));
        });

        let mut startup = exit_rx.clone();
        if let Ok(exit) = time::timeout(self.timings.startup, exited(&mut startup)).await {
            match exit {
                Some(Ok(status)) if status.success() => {
                    info!(pid, "Background process exited successfully during startup");
                }
                Some(Ok(status)) => return Err(Error::Startup(status)),
                Some(Err(error)) => return Err(Error::Wait(error)),
                None => return Err(Error::NoProcess),
            }
        }

        let inner = Arc::new(Inner {
            pid,
            processes: self.processes.clone(),
            stopped: AtomicBool::new(false),
            exit: exit_rx,
            kill_grace: self.timings.kill_grace,
        });
        tokio::spawn(
            keep_alive(inner.clone(), self.timings.heartbeat)
                .instrument(info_span!("keep_alive", pid, container = %target_container)),
        );
        debug!(pid, "Monitoring background process");

        Ok(BackgroundProcess { inner })
    }
}

// === impl BackgroundProcess ===

impl<P: ProcessManager> BackgroundProcess<P> {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Stops heartbeats and asks the child to terminate.
    ///
    /// Only the first call has an effect. The child is killed if it has not
    /// exited within the grace period.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Waits for the child to exit.
    pub async fn wait(&self) -> Option<Exit> {
        exited(&mut self.inner.exit.clone()).await
    }
}

// === impl Inner ===

impl<P: ProcessManager> Inner<P> {
    fn stop(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.exit.borrow().is_some() {
            debug!(pid = self.pid, "Background process already exited");
            return;
        }

        info!(pid = self.pid, "Sending SIGTERM to background process");
        let pid = match self.processes.find(self.pid) {
            Ok(pid) => pid,
            Err(error) => {
                warn!(%error, "Process not found, nothing to clean");
                return;
            }
        };
        if let Err(error) = self.processes.signal(pid, Signal::SIGTERM) {
            warn!(%error, "Failed to terminate background process");
            return;
        }

        tokio::spawn(self.clone().kill_after_grace(pid));
    }

    async fn kill_after_grace(self: Arc<Self>, pid: Pid) {
        let mut exit = self.exit.clone();
        if time::timeout(self.kill_grace, exited(&mut exit)).await.is_ok() {
            info!(pid = self.pid, "Background process has been terminated");
            return;
        }

        warn!(pid = self.pid, grace = ?self.kill_grace, "Background process did not exit, sending SIGKILL");
        if let Err(error) = self.processes.signal(pid, Signal::SIGKILL) {
            error!(%error, "Failed to kill background process");
        }
    }

    fn heartbeat(&self) -> Result<(), process::Error> {
        let pid = self.processes.find(self.pid)?;
        self.processes.signal(pid, Signal::SIGCONT)
    }
}

async fn keep_alive<P: ProcessManager>(inner: Arc<Inner<P>>, interval: Duration) {
    let mut exit_rx = inner.exit.clone();
    let mut ticks = time::interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            exit = exited(&mut exit_rx) => {
                match exit {
                    Some(Ok(status)) if status.success() => info!("Background command exited successfully"),
                    Some(Ok(status)) => error!(%status, "Background command exited with an error"),
                    Some(Err(error)) => error!(%error, "Failed to wait for background command"),
                    None => {}
                }
                return;
            }

            _ = ticks.tick() => {
                if inner.stopped.load(Ordering::Acquire) {
                    return;
                }
                if let Err(error) = inner.heartbeat() {
                    error!(%error, "Failed to notify background process, stopping it");
                    inner.stop();
                    return;
                }
                debug!("SIGCONT signal sent to child process");
            }
        }
    }
}

/// Resolves once the child has exited, or never if the wait task is gone
/// without reporting.
async fn exited(rx: &mut watch::Receiver<Option<Exit>>) -> Option<Exit> {
    match rx.wait_for(Option::is_some).await {
        Ok(exit) => (*exit).clone(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Manager;
    use chaos_controller_core::DisruptionLevel;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::{collections::BTreeMap, os::unix::process::ExitStatusExt};

    /// Records every signal before delivering it.
    #[derive(Default)]
    struct Recording {
        signals: Mutex<Vec<Signal>>,
        fail_heartbeats: bool,
    }

    impl ProcessManager for Recording {
        fn process_id(&self) -> u32 {
            42
        }

        fn find(&self, pid: u32) -> Result<Pid, process::Error> {
            Manager::new(false).find(pid)
        }

        fn signal(&self, pid: Pid, signal: Signal) -> Result<(), process::Error> {
            self.signals.lock().push(signal);
            if self.fail_heartbeats && signal == Signal::SIGCONT {
                return Err(process::Error::Signal {
                    pid,
                    signal,
                    source: nix::errno::Errno::EPERM,
                });
            }
            Manager::new(false).signal(pid, signal)
        }
    }

    impl Recording {
        fn count(&self, signal: Signal) -> usize {
            self.signals.lock().iter().filter(|s| **s == signal).count()
        }
    }

    const TIMINGS: Timings = Timings {
        startup: Duration::from_millis(200),
        heartbeat: Duration::from_millis(50),
        max_missed: 3,
        kill_grace: Duration::from_millis(500),
    };

    fn args() -> DisruptionArgs {
        DisruptionArgs {
            level: DisruptionLevel::Pod,
            target_containers: BTreeMap::from([
                ("app".to_string(), "containerd://app".to_string()),
                ("sidecar".to_string(), "containerd://sidecar".to_string()),
            ]),
            target_name: "web-0".to_string(),
            ..Default::default()
        }
    }

    fn deadline() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()
    }

    /// Runs `script` through the shell; the disruption arguments become its
    /// positional parameters.
    fn manager(processes: Arc<Recording>, script: &str) -> BackgroundProcessManager<Recording> {
        BackgroundProcessManager::new(processes, "/bin/sh", args(), deadline())
            .with_leading_args(["-c".to_string(), script.to_string(), "chaos-injector".to_string()])
            .with_timings(TIMINGS)
    }

    #[test]
    fn narrows_args_to_the_target_container() {
        let manager = manager(Default::default(), "true");
        let args = manager
            .command_args("sidecar", ["clock-skew".to_string(), "--offset".to_string(), "1m0s".to_string()])
            .unwrap();
        assert_eq!(
            args,
            [
                "--level",
                "pod",
                "--target-containers",
                "sidecar;containerd://sidecar",
                "--target-name",
                "web-0",
                "--log-context-target-name",
                "web-0",
                "--parent-pid",
                "42",
                "--deadline",
                "2030-01-02T03:04:05Z",
                "--heartbeat-interval",
                "50ms",
                "--heartbeat-misses",
                "3",
                "clock-skew",
                "--offset",
                "1m0s",
            ]
        );
    }

    #[tokio::test]
    async fn rejects_unknown_container() {
        let manager = manager(Default::default(), "true");
        let error = manager.start("db", Vec::new()).await.err().unwrap();
        assert!(matches!(error, Error::UnknownTargetContainer(c) if c == "db"));
    }

    #[tokio::test]
    async fn node_level_requires_a_targeted_container() {
        let node = DisruptionArgs {
            level: DisruptionLevel::Node,
            ..args()
        };
        let manager = BackgroundProcessManager::new(
            Arc::new(Recording::default()),
            "/bin/sh",
            node,
            deadline(),
        );
        let error = manager.start("does-not-exist", Vec::new()).await.err().unwrap();
        assert!(matches!(error, Error::UnknownTargetContainer(c) if c == "does-not-exist"));

        let args = manager.command_args("app", Vec::new()).unwrap();
        assert!(args.contains(&"app;containerd://app".to_string()));
        assert!(!args.iter().any(|a| a.contains("sidecar")));
    }

    #[tokio::test]
    async fn fails_when_child_exits_during_startup() {
        let manager = manager(Default::default(), "exit 3");
        match manager.start("app", Vec::new()).await {
            Err(Error::Startup(status)) => assert_eq!(status.code(), Some(3)),
            Err(error) => panic!("unexpected error: {error}"),
            Ok(_) => panic!("child must fail to start"),
        }
    }

    #[tokio::test]
    async fn child_exiting_successfully_during_startup_is_started() {
        let processes = Arc::new(Recording::default());
        let manager = manager(processes.clone(), "exit 0");
        let process = manager.start("app", Vec::new()).await.unwrap();
        let exit = process.wait().await.unwrap().unwrap();
        assert!(exit.success());

        process.stop();
        assert_eq!(processes.count(Signal::SIGTERM), 0);
    }

    #[tokio::test]
    async fn stop_terminates_once() {
        let processes = Arc::new(Recording::default());
        let manager = manager(processes.clone(), "exec sleep 30");
        let process = manager.start("app", Vec::new()).await.unwrap();

        time::sleep(TIMINGS.heartbeat * 3).await;
        assert!(processes.count(Signal::SIGCONT) >= 1);

        process.stop();
        process.stop();
        assert!(process.is_stopped());

        let exit = process.wait().await.unwrap().unwrap();
        assert_eq!(exit.signal(), Some(Signal::SIGTERM as i32));
        assert_eq!(processes.count(Signal::SIGTERM), 1);
        assert_eq!(processes.count(Signal::SIGKILL), 0);
    }

    #[tokio::test]
    async fn kills_child_ignoring_sigterm() {
        let processes = Arc::new(Recording::default());
        let manager = manager(processes.clone(), "trap '' TERM; exec sleep 30");
        let process = manager.start("app", Vec::new()).await.unwrap();

        process.stop();
        let exit = time::timeout(TIMINGS.kill_grace * 4, process.wait())
            .await
            .expect("child must be killed")
            .unwrap()
            .unwrap();
        assert_eq!(exit.signal(), Some(Signal::SIGKILL as i32));
        assert_eq!(processes.count(Signal::SIGTERM), 1);
        assert_eq!(processes.count(Signal::SIGKILL), 1);
    }

    #[tokio::test]
    async fn failed_heartbeat_stops_child() {
        let processes = Arc::new(Recording {
            fail_heartbeats: true,
            ..Default::default()
        });
        let manager = manager(processes.clone(), "exec sleep 30");
        let process = manager.start("app", Vec::new()).await.unwrap();

        let exit = time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("child must be stopped")
            .unwrap()
            .unwrap();
        assert!(process.is_stopped());
        assert_eq!(exit.signal(), Some(Signal::SIGTERM as i32));
        assert_eq!(processes.count(Signal::SIGCONT), 1);
    }
}

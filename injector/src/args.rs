use crate::{
    background::{BackgroundProcess, BackgroundProcessManager, Timings},
    process::{Manager, ProcessManager},
    watchdog::{Expiry, Watchdog},
};
use anyhow::{anyhow, bail, ensure, Context, Result};
use chaos_controller_core::{
    args::parse_target_containers, DisruptionArgs, DisruptionDuration, DisruptionKindName,
    DisruptionLevel, PulseArgs,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use futures::prelude::*;
use nix::sys::signal::Signal;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};
use tokio::{
    signal::unix::{signal, SignalKind},
    time::Duration,
};
use tokio_stream::wrappers::SignalStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runs a disruption against every targeted container.
///
/// Without `--parent-pid`, the injector supervises one child per target
/// container. With it, the injector is such a child: it holds its disruption
/// until it is terminated, loses its supervisor, or reaches its deadline.
#[derive(Debug, Parser)]
#[clap(name = "chaos-injector", about = "Injects chaos disruptions into containers")]
pub struct Args {
    #[clap(long, default_value = "chaos_injector=info,warn", env = "CHAOS_INJECTOR_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(long, default_value = "pod")]
    level: DisruptionLevel,

    /// Comma-separated `<name>;<id>` pairs.
    #[clap(long, default_value = "", value_parser = parse_target_containers)]
    target_containers: BTreeMap<String, String>,

    #[clap(long, default_value = "")]
    target_name: String,

    #[clap(long, default_value = "")]
    target_node_name: String,

    #[clap(long, default_value = "")]
    target_pod_ip: String,

    #[clap(long, default_value = "")]
    chaos_namespace: String,

    #[clap(long, default_value = "")]
    log_context_disruption_name: String,

    #[clap(long, default_value = "")]
    log_context_disruption_namespace: String,

    #[clap(long, default_value = "")]
    log_context_target_name: String,

    #[clap(long, default_value = "")]
    log_context_target_node_name: String,

    #[clap(long)]
    not_injected_before: Option<DateTime<Utc>>,

    #[clap(long)]
    pulse_initial_delay: Option<DisruptionDuration>,

    #[clap(long)]
    pulse_active_duration: Option<DisruptionDuration>,

    #[clap(long)]
    pulse_dormant_duration: Option<DisruptionDuration>,

    /// Semicolon-separated hosts that a network disruption must not affect.
    #[clap(long, value_delimiter = ';')]
    allowed_hosts: Vec<String>,

    #[clap(long)]
    dry_run: bool,

    #[clap(long)]
    on_init: bool,

    /// Pid of the supervising injector. Set on children only.
    #[clap(long)]
    parent_pid: Option<u32>,

    /// Time at which the disruption must be over.
    #[clap(long)]
    deadline: Option<DateTime<Utc>>,

    /// Binary run for each child. Defaults to the current executable.
    #[clap(long)]
    child_binary: Option<PathBuf>,

    #[clap(long, default_value = "1s")]
    heartbeat_interval: DisruptionDuration,

    /// How long a child must survive to be considered started.
    #[clap(long, default_value = "1s")]
    startup_timeout: DisruptionDuration,

    /// How long a child may take to exit once asked to before it is killed.
    #[clap(long, default_value = "5s")]
    kill_grace_period: DisruptionDuration,

    /// Number of consecutive heartbeats a child may miss before it considers
    /// its supervisor gone.
    #[clap(long, default_value_t = Watchdog::DEFAULT_MAX_MISSED)]
    heartbeat_misses: u32,

    /// The disruption kind followed by its own flags.
    #[clap(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let disruption = self.disruption_args()?;
        let timings = self.timings()?;
        let kind = disruption
            .kind
            .ok_or_else(|| anyhow!("a disruption kind must be specified"))?;

        let Self {
            log_level,
            log_format,
            child_binary,
            command,
            log_context_target_name,
            log_context_target_node_name,
            ..
        } = self;
        log_format.try_init(log_level)?;

        let span = info_span!(
            "injector",
            %kind,
            disruption = %disruption.disruption_name,
            ns = %disruption.disruption_namespace,
            target = %log_context_target_name,
            node = %log_context_target_node_name,
        );

        match disruption.parent_pid {
            Some(parent_pid) => {
                let watchdog = Watchdog {
                    // Dry-run supervisors do not signal their children.
                    heartbeat: (!disruption.dry_run).then_some(timings.heartbeat),
                    max_missed: timings.max_missed,
                    deadline: disruption.deadline,
                };
                disrupt(kind, parent_pid, watchdog).instrument(span).await
            }
            None => {
                let program = match child_binary {
                    Some(program) => program,
                    None => std::env::current_exe()
                        .context("failed to resolve the injector executable")?,
                };
                supervise(program, disruption, command, timings)
                    .instrument(span)
                    .await
            }
        }
    }

    fn disruption_args(&self) -> Result<DisruptionArgs> {
        let kind = match self.command.first() {
            Some(kind) => Some(kind.parse::<DisruptionKindName>()?),
            None => None,
        };

        let pulse = match (self.pulse_active_duration, self.pulse_dormant_duration) {
            (Some(active), Some(dormant)) => Some(PulseArgs {
                initial_delay: self
                    .pulse_initial_delay
                    .unwrap_or(DisruptionDuration::ZERO),
                active,
                dormant,
            }),
            (None, None) => None,
            _ => bail!("pulse requires both --pulse-active-duration and --pulse-dormant-duration"),
        };

        Ok(DisruptionArgs {
            level: self.level,
            kind,
            target_containers: self.target_containers.clone(),
            target_name: self.target_name.clone(),
            target_node_name: self.target_node_name.clone(),
            target_pod_ip: self.target_pod_ip.clone(),
            disruption_name: self.log_context_disruption_name.clone(),
            disruption_namespace: self.log_context_disruption_namespace.clone(),
            chaos_namespace: self.chaos_namespace.clone(),
            dry_run: self.dry_run,
            on_init: self.on_init,
            pulse,
            not_injected_before: self.not_injected_before,
            allowed_hosts: self.allowed_hosts.clone(),
            parent_pid: self.parent_pid,
            deadline: self.deadline,
        })
    }

    fn timings(&self) -> Result<Timings> {
        let positive = |flag: &str, d: DisruptionDuration| -> Result<Duration> {
            let d = d.to_std().filter(|d| !d.is_zero());
            d.ok_or_else(|| anyhow!("--{flag} must be positive"))
        };
        Ok(Timings {
            startup: positive("startup-timeout", self.startup_timeout)?,
            heartbeat: positive("heartbeat-interval", self.heartbeat_interval)?,
            max_missed: self.heartbeat_misses,
            kill_grace: positive("kill-grace-period", self.kill_grace_period)?,
        })
    }
}

/// Starts one child per target container and stops them all on shutdown.
async fn supervise(
    program: PathBuf,
    disruption: DisruptionArgs,
    command: Vec<String>,
    timings: Timings,
) -> Result<()> {
    let deadline = disruption
        .deadline
        .ok_or_else(|| anyhow!("--deadline is required to supervise a disruption"))?;
    ensure!(
        !disruption.target_containers.is_empty(),
        "at least one target container must be specified"
    );

    let containers: Vec<String> = match disruption.level {
        DisruptionLevel::Pod => disruption.target_containers.keys().cloned().collect(),
        // A node is disrupted once, whatever its containers.
        DisruptionLevel::Node => disruption.target_containers.keys().take(1).cloned().collect(),
    };

    let processes = Arc::new(Manager::new(disruption.dry_run));
    let manager = BackgroundProcessManager::new(processes, program, disruption, deadline)
        .with_timings(timings);

    let mut children = Vec::with_capacity(containers.len());
    for container in &containers {
        match manager.start(container, command.clone()).await {
            Ok(child) => {
                info!(%container, pid = child.pid(), "Background process started");
                children.push(child);
            }
            Err(error) => {
                error!(%container, %error, "Failed to start background process");
                stop_all(&children).await;
                return Err(error.into());
            }
        }
    }

    let shutdown = shutdown()?;
    tokio::select! {
        () = shutdown => info!("Stopping background processes"),
        _ = future::join_all(children.iter().map(|child| child.wait())) => {
            info!("Every background process exited");
        }
    }

    let failed = stop_all(&children).await;
    ensure!(failed == 0, "{failed} background process(es) failed");
    Ok(())
}

/// Stops every child and waits for them to exit. Returns the number of
/// children that did not exit successfully.
async fn stop_all<P: ProcessManager>(children: &[BackgroundProcess<P>]) -> usize {
    for child in children {
        child.stop();
    }

    let mut failed = 0;
    for child in children {
        match child.wait().await {
            Some(Ok(status)) if status.success() => debug!(pid = child.pid(), "Exited"),
            Some(Ok(status)) => {
                warn!(pid = child.pid(), %status, "Background process exited with an error");
                failed += 1;
            }
            Some(Err(error)) => {
                warn!(pid = child.pid(), %error, "Failed to wait for background process");
                failed += 1;
            }
            None => {}
        }
    }
    failed
}

/// Holds the disruption in place until the watchdog expires.
async fn disrupt(kind: DisruptionKindName, parent_pid: u32, watchdog: Watchdog) -> Result<()> {
    let heartbeats = SignalStream::new(
        signal(SignalKind::from_raw(Signal::SIGCONT as i32))
            .context("failed to register SIGCONT handler")?,
    );
    let shutdown = shutdown()?;

    info!(parent_pid, deadline = ?watchdog.deadline, "Injecting disruption");
    match watchdog.run(heartbeats, shutdown).await {
        Expiry::Terminated => info!("Received termination signal"),
        Expiry::SupervisorLost => warn!(parent_pid, "Supervisor is gone"),
        Expiry::DeadlineReached => info!("Disruption deadline reached"),
    }
    info!(%kind, "Cleaning disruption");
    Ok(())
}

/// Completes on the first SIGTERM or SIGINT.
fn shutdown() -> Result<impl Future<Output = ()>> {
    let mut term = signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = term.recv() => debug!("Received SIGTERM"),
            _ = int.recv() => debug!("Received SIGINT"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: Vec<String>) -> Args {
        Args::try_parse_from(std::iter::once("chaos-injector".to_string()).chain(args))
            .expect("arguments must parse")
    }

    fn disruption() -> DisruptionArgs {
        DisruptionArgs {
            level: DisruptionLevel::Pod,
            kind: Some(DisruptionKindName::NetworkDisruption),
            target_containers: BTreeMap::from([
                ("app".to_string(), "containerd://app".to_string()),
                ("sidecar".to_string(), "containerd://sidecar".to_string()),
            ]),
            target_name: "web-0".to_string(),
            target_node_name: "node-a".to_string(),
            target_pod_ip: "10.0.0.12".to_string(),
            disruption_name: "drop".to_string(),
            disruption_namespace: "default".to_string(),
            chaos_namespace: "chaos-engineering".to_string(),
            dry_run: true,
            on_init: false,
            pulse: Some(PulseArgs {
                initial_delay: DisruptionDuration::from_secs(10),
                active: DisruptionDuration::from_mins(1),
                dormant: DisruptionDuration::from_secs(30),
            }),
            not_injected_before: Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 0, 0).unwrap()),
            allowed_hosts: vec!["10.0.0.1".to_string(), "kube-dns".to_string()],
            parent_pid: Some(7),
            deadline: Some(Utc.with_ymd_and_hms(2030, 1, 2, 4, 0, 0).unwrap()),
        }
    }

    #[test]
    fn parses_rendered_child_args() {
        let expected = disruption();
        let rendered = expected.create_cmd_args([
            "network-disruption".to_string(),
            "--drop".to_string(),
            "50".to_string(),
        ]);

        let args = parse(rendered);
        assert_eq!(args.disruption_args().unwrap(), expected);
        assert_eq!(args.command, ["network-disruption", "--drop", "50"]);
        assert_eq!(args.log_context_target_name, "web-0");
    }

    #[test]
    fn children_expect_the_supervisor_heartbeat() {
        let timings = Timings {
            heartbeat: Duration::from_secs(10),
            max_missed: 2,
            ..Default::default()
        };
        let manager = BackgroundProcessManager::new(
            Arc::new(Manager::new(true)),
            "/bin/true",
            DisruptionArgs {
                parent_pid: None,
                ..disruption()
            },
            Utc.with_ymd_and_hms(2030, 1, 2, 4, 0, 0).unwrap(),
        )
        .with_timings(timings);

        let child = parse(
            manager
                .command_args("app", ["cpu-pressure".to_string()])
                .unwrap(),
        );
        assert!(child.parent_pid.is_some());
        assert_eq!(child.timings().unwrap().heartbeat, Duration::from_secs(10));
        assert_eq!(child.heartbeat_misses, 2);
    }

    #[test]
    fn kind_args_may_reuse_common_flag_names() {
        let args = parse(
            [
                "--target-containers",
                "app;containerd://app",
                "clock-skew",
                "--dry-run",
                "--offset",
                "-1m",
            ]
            .map(String::from)
            .to_vec(),
        );
        assert!(!args.dry_run);
        assert_eq!(args.command, ["clock-skew", "--dry-run", "--offset", "-1m"]);
        assert_eq!(
            args.disruption_args().unwrap().kind,
            Some(DisruptionKindName::ClockSkew)
        );
    }

    #[test]
    fn requires_a_command() {
        assert!(Args::try_parse_from(["chaos-injector", "--dry-run"]).is_err());
    }

    #[test]
    fn rejects_unknown_kinds_and_partial_pulses() {
        let args = parse(vec!["fork-bomb".to_string()]);
        assert!(args.disruption_args().is_err());

        let args = parse(
            ["--pulse-active-duration", "1m", "cpu-pressure"]
                .map(String::from)
                .to_vec(),
        );
        assert!(args.disruption_args().is_err());
    }

    #[test]
    fn timings_default_and_must_be_positive() {
        let args = parse(vec!["cpu-pressure".to_string()]);
        assert_eq!(args.timings().unwrap(), Timings::default());
        assert_eq!(args.heartbeat_misses, Watchdog::DEFAULT_MAX_MISSED);

        let args = parse(
            ["--heartbeat-interval", "0", "cpu-pressure"]
                .map(String::from)
                .to_vec(),
        );
        assert!(args.timings().is_err());
    }
}

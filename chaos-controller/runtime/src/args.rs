use crate::{
    admission::Admission,
    config::{self, Config, SafeMode},
    core::DisruptionKindName,
    metrics::AdmissionMetrics,
    safety_net::KubeCounter,
};
use anyhow::{bail, ensure, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "chaos-controller", about = "A chaos disruption admission controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "chaos_controller=info,warn",
        env = "CHAOS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Disables every safety net, whatever the disruptions specify.
    #[clap(long)]
    safe_mode_disabled: bool,

    /// Percentage of a namespace's pods a disruption may target before
    /// being caught.
    #[clap(long, default_value = "80")]
    namespace_threshold: u8,

    /// Percentage of the cluster's pods or nodes a disruption may target
    /// before being caught.
    #[clap(long, default_value = "66")]
    cluster_threshold: u8,

    #[clap(long, default_value = "true", action = clap::ArgAction::Set)]
    allow_node_failure: bool,

    #[clap(long, default_value = "true", action = clap::ArgAction::Set)]
    allow_node_level: bool,

    /// Comma-separated disruption kinds that may not be created.
    #[clap(long, value_delimiter = ',')]
    disabled_kinds: Vec<DisruptionKindName>,

    /// Refuses new disruptions while still allowing existing ones to be
    /// updated and deleted.
    #[clap(long)]
    delete_only: bool,

    #[clap(long, default_value_t = config::DEFAULT_LIST_PAGE_SIZE)]
    list_page_size: u32,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            ..
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let metrics = AdmissionMetrics::register(prom.sub_registry_with_prefix("chaos_admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        info!(
            delete_only = config.delete_only,
            safe_mode = config.safe_mode.enabled,
            disabled_kinds = ?config.disabled_kinds,
            "Starting admission controller"
        );

        let config = Arc::new(config);
        let counter = KubeCounter::new(runtime.client(), config.list_page_size);
        let runtime = runtime.spawn_server(move || {
            Admission::new(config.clone(), counter.clone(), metrics.clone())
        });

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn config(&self) -> Result<Config> {
        for (name, value) in [
            ("namespace-threshold", self.namespace_threshold),
            ("cluster-threshold", self.cluster_threshold),
        ] {
            ensure!(
                (1..=100).contains(&value),
                "--{name} must be a percentage between 1 and 100, got {value}"
            );
        }
        ensure!(self.list_page_size > 0, "--list-page-size must not be zero");

        Ok(Config {
            safe_mode: SafeMode {
                enabled: !self.safe_mode_disabled,
                namespace_threshold: f64::from(self.namespace_threshold) / 100.0,
                cluster_threshold: f64::from(self.cluster_threshold) / 100.0,
                allow_node_failure: self.allow_node_failure,
                allow_node_level: self.allow_node_level,
            },
            disabled_kinds: self.disabled_kinds.clone(),
            delete_only: self.delete_only,
            list_page_size: self.list_page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_config_from_flags() {
        let args = Args::try_parse_from([
            "chaos-controller",
            "--namespace-threshold=50",
            "--allow-node-failure=false",
            "--disabled-kinds=node-failure,clock-skew",
            "--delete-only",
        ])
        .unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.safe_mode.namespace_threshold, 0.5);
        assert_eq!(
            config.safe_mode.cluster_threshold,
            config::DEFAULT_CLUSTER_THRESHOLD
        );
        assert!(!config.safe_mode.allow_node_failure);
        assert!(config.safe_mode.allow_node_level);
        assert_eq!(
            config.disabled_kinds,
            vec![DisruptionKindName::NodeFailure, DisruptionKindName::ClockSkew]
        );
        assert!(config.delete_only);
        assert_eq!(config.list_page_size, 500);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let args = Args::try_parse_from(["chaos-controller", "--cluster-threshold=0"]).unwrap();
        assert!(args.config().is_err());
    }

    #[test]
    fn rejects_unknown_kinds() {
        assert!(Args::try_parse_from(["chaos-controller", "--disabled-kinds=tornado"]).is_err());
    }
}

//! Command-line arguments shared by every injector process.
//!
//! The controller renders these onto injector pods, and the injector
//! supervisor renders a narrowed copy onto each child it spawns. Common flags
//! always come first; the kind subcommand and its flags follow.

use crate::{duration::DisruptionDuration, injection::DisruptionKindName};
use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

pub const PARENT_PID_FLAG: &str = "--parent-pid";
pub const DEADLINE_FLAG: &str = "--deadline";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisruptionLevel {
    #[default]
    Pod,
    Node,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PulseArgs {
    pub initial_delay: DisruptionDuration,
    pub active: DisruptionDuration,
    pub dormant: DisruptionDuration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisruptionArgs {
    pub level: DisruptionLevel,
    pub kind: Option<DisruptionKindName>,
    /// Container name to container ID. Node-level disruptions carry a single
    /// entry.
    pub target_containers: BTreeMap<String, String>,
    pub target_name: String,
    pub target_node_name: String,
    pub target_pod_ip: String,
    pub disruption_name: String,
    pub disruption_namespace: String,
    pub chaos_namespace: String,
    pub dry_run: bool,
    pub on_init: bool,
    pub pulse: Option<PulseArgs>,
    pub not_injected_before: Option<DateTime<Utc>>,
    pub allowed_hosts: Vec<String>,
    pub parent_pid: Option<u32>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidTargetContainers {
    #[error("invalid target container {0:?}: expected <name>;<id>")]
    Malformed(String),
}

// === impl DisruptionLevel ===

impl DisruptionLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Node => "node",
        }
    }
}

impl fmt::Display for DisruptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisruptionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pod" | "" => Ok(Self::Pod),
            "node" => Ok(Self::Node),
            other => Err(format!("unknown disruption level: {other}")),
        }
    }
}

// === impl DisruptionArgs ===

impl DisruptionArgs {
    /// Restricts the arguments to a single target container. Returns `None`
    /// if the container is not targeted.
    pub fn narrowed_to(&self, container: &str) -> Option<Self> {
        let mut narrowed = self.clone();
        let id = self.target_containers.get(container)?;
        narrowed.target_containers = Some((container.to_string(), id.clone()))
            .into_iter()
            .collect();
        Some(narrowed)
    }

    /// Renders the common flags followed by `kind_args`.
    pub fn create_cmd_args(&self, kind_args: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut args = vec![
            "--level".to_string(),
            self.level.to_string(),
            "--target-containers".to_string(),
            format_target_containers(&self.target_containers),
        ];

        let mut opt = |flag: &str, value: &str| {
            if !value.is_empty() {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        };
        opt("--target-name", &self.target_name);
        opt("--target-node-name", &self.target_node_name);
        opt("--target-pod-ip", &self.target_pod_ip);
        opt("--chaos-namespace", &self.chaos_namespace);
        opt("--log-context-disruption-name", &self.disruption_name);
        opt("--log-context-disruption-namespace", &self.disruption_namespace);
        opt("--log-context-target-name", &self.target_name);
        opt("--log-context-target-node-name", &self.target_node_name);

        if let Some(at) = self.not_injected_before {
            args.push("--not-injected-before".to_string());
            args.push(rfc3339(at));
        }
        if let Some(pulse) = self.pulse {
            args.extend([
                "--pulse-initial-delay".to_string(),
                pulse.initial_delay.to_string(),
                "--pulse-active-duration".to_string(),
                pulse.active.to_string(),
                "--pulse-dormant-duration".to_string(),
                pulse.dormant.to_string(),
            ]);
        }
        if !self.allowed_hosts.is_empty() {
            args.push("--allowed-hosts".to_string());
            args.push(self.allowed_hosts.join(";"));
        }
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if self.on_init {
            args.push("--on-init".to_string());
        }
        if let Some(pid) = self.parent_pid {
            args.push(PARENT_PID_FLAG.to_string());
            args.push(pid.to_string());
        }
        if let Some(deadline) = self.deadline {
            args.push(DEADLINE_FLAG.to_string());
            args.push(rfc3339(deadline));
        }

        args.extend(kind_args);
        args
    }
}

pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Renders `name;id` pairs separated by commas.
pub fn format_target_containers(containers: &BTreeMap<String, String>) -> String {
    containers
        .iter()
        .map(|(name, id)| format!("{name};{id}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_target_containers(
    s: &str,
) -> Result<BTreeMap<String, String>, InvalidTargetContainers> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once(';') {
            Some((name, id)) if !name.is_empty() => Ok((name.to_string(), id.to_string())),
            _ => Err(InvalidTargetContainers::Malformed(pair.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use maplit::btreemap;

    fn args() -> DisruptionArgs {
        DisruptionArgs {
            level: DisruptionLevel::Pod,
            kind: Some(DisruptionKindName::ClockSkew),
            target_containers: btreemap! {
                "app".to_string() => "containerd://aaa".to_string(),
                "sidecar".to_string() => "containerd://bbb".to_string(),
            },
            target_name: "web-0".to_string(),
            disruption_name: "skew".to_string(),
            disruption_namespace: "default".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn narrowing_keeps_a_single_container() {
        let narrowed = args().narrowed_to("sidecar").expect("sidecar is targeted");
        assert_eq!(
            narrowed.target_containers,
            btreemap! { "sidecar".to_string() => "containerd://bbb".to_string() }
        );
        assert_eq!(args().narrowed_to("missing"), None);

        let node = DisruptionArgs {
            level: DisruptionLevel::Node,
            ..args()
        };
        assert_eq!(node.narrowed_to("anything"), None);
        assert_eq!(
            node.narrowed_to("app").map(|a| a.target_containers),
            Some(btreemap! { "app".to_string() => "containerd://aaa".to_string() })
        );
    }

    #[test]
    fn common_flags_precede_kind_args() {
        let deadline = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        let args = DisruptionArgs {
            dry_run: true,
            parent_pid: Some(42),
            deadline: Some(deadline),
            ..args()
        }
        .create_cmd_args(["clock-skew".to_string(), "--offset".to_string(), "1h".to_string()]);

        assert_eq!(&args[..4], &["--level", "pod", "--target-containers", "app;containerd://aaa,sidecar;containerd://bbb"]);
        assert_eq!(&args[args.len() - 3..], &["clock-skew", "--offset", "1h"]);
        let joined = args.join(" ");
        assert!(joined.contains("--dry-run"));
        assert!(joined.contains("--parent-pid 42"));
        assert!(joined.contains("--deadline 2024-03-01T13:00:00Z"));
        assert!(!joined.contains("--target-pod-ip"));
    }

    #[test]
    fn target_containers_round_trip() {
        let containers = args().target_containers;
        assert_eq!(
            parse_target_containers(&format_target_containers(&containers)),
            Ok(containers)
        );
        assert!(parse_target_containers("nosep").is_err());
        assert_eq!(parse_target_containers(""), Ok(BTreeMap::new()));
    }
}

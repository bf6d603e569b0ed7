//! Disruption kind sub-specs.
//!
//! Each kind validates itself and renders the arguments of its injector
//! subcommand. A disruption's active kinds are enumerated through
//! [`KindSpec`].

use crate::errors::Errors;
use chaos_controller_core::{count, DisruptionDuration, DisruptionKindName};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest path a disk failure may target; the eBPF program matches on a
/// fixed-size buffer.
const MAX_DISK_FAILURE_PATH_LEN: usize = 62;

/// Delays are applied by `tc netem`, which caps them just under a minute.
const MAX_NETWORK_DELAY_MS: u32 = 59_999;

const MIN_BANDWIDTH_LIMIT: i32 = 32;

const MAX_CLOCK_SKEW: DisruptionDuration = DisruptionDuration::from_hours(10 * 365 * 24);

/// A borrowed view of one active kind sub-spec.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KindSpec<'a> {
    Network(&'a NetworkDisruptionSpec),
    NodeFailure(&'a NodeFailureSpec),
    ContainerFailure(&'a ContainerFailureSpec),
    CpuPressure(&'a CpuPressureSpec),
    MemoryPressure(&'a MemoryPressureSpec),
    DiskPressure(&'a DiskPressureSpec),
    DiskFailure(&'a DiskFailureSpec),
    Dns(&'a DnsDisruptionSpec),
    Grpc(&'a GrpcDisruptionSpec),
    ClockSkew(&'a ClockSkewSpec),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDisruptionSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<NetworkDisruptionHostSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_hosts: Vec<NetworkDisruptionHostSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<NetworkDisruptionServiceSpec>,
    #[serde(default)]
    pub drop: i32,
    #[serde(default)]
    pub duplicate: i32,
    #[serde(default)]
    pub corrupt: i32,
    /// Milliseconds.
    #[serde(default)]
    pub delay: u32,
    /// Percentage of `delay`.
    #[serde(default)]
    pub delay_jitter: u32,
    /// Bytes per second.
    #[serde(default)]
    pub bandwidth_limit: i32,
    #[serde(default)]
    pub disable_default_allowed_hosts: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDisruptionHostSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub flow: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDisruptionServiceSpec {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailureSpec {
    #[serde(default)]
    pub shutdown: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFailureSpec {
    #[serde(default)]
    pub forced: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CpuPressureSpec {
    /// Number of cores to stress, absolute or as a percentage of the
    /// target's cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<IntOrString>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPressureSpec {
    /// Target memory utilization, e.g. `76%`.
    pub target_percent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_duration: Option<DisruptionDuration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskPressureSpec {
    pub path: String,
    #[serde(default)]
    pub throttling: DiskPressureThrottlingSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskPressureThrottlingSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_bytes_per_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_bytes_per_sec: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskFailureSpec {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openat_syscall: Option<OpenatSyscallSpec>,
    #[serde(default)]
    pub probability: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenatSyscallSpec {
    /// Errno name returned by the failed `openat` calls, e.g. `EACCES`.
    #[serde(default)]
    pub exit_code: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct DnsDisruptionSpec(pub Vec<HostRecordPair>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HostRecordPair {
    #[serde(rename = "hostname")]
    pub host: String,
    pub record: DnsRecord,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcDisruptionSpec {
    pub port: i32,
    #[serde(default)]
    pub endpoints: Vec<EndpointAlteration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EndpointAlteration {
    #[serde(rename = "endpoint", default)]
    pub target_endpoint: String,
    #[serde(rename = "error", default, skip_serializing_if = "String::is_empty")]
    pub error_to_return: String,
    #[serde(rename = "override", default, skip_serializing_if = "String::is_empty")]
    pub override_to_return: String,
    #[serde(rename = "query_pct", default)]
    pub query_percent: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockSkewSpec {
    /// Shift applied to the targets' clocks, e.g. `+24h` or `-30m`.
    pub offset: DisruptionDuration,
}

// === impl KindSpec ===

impl KindSpec<'_> {
    pub fn kind(&self) -> DisruptionKindName {
        match self {
            Self::Network(_) => DisruptionKindName::NetworkDisruption,
            Self::NodeFailure(_) => DisruptionKindName::NodeFailure,
            Self::ContainerFailure(_) => DisruptionKindName::ContainerFailure,
            Self::CpuPressure(_) => DisruptionKindName::CpuPressure,
            Self::MemoryPressure(_) => DisruptionKindName::MemoryPressure,
            Self::DiskPressure(_) => DisruptionKindName::DiskPressure,
            Self::DiskFailure(_) => DisruptionKindName::DiskFailure,
            Self::Dns(_) => DisruptionKindName::DnsDisruption,
            Self::Grpc(_) => DisruptionKindName::GrpcDisruption,
            Self::ClockSkew(_) => DisruptionKindName::ClockSkew,
        }
    }

    /// The prefix under which this kind's validation errors are reported.
    pub fn section(&self) -> &'static str {
        match self {
            Self::Network(_) => "Network",
            Self::NodeFailure(_) => "NodeFailure",
            Self::ContainerFailure(_) => "ContainerFailure",
            Self::CpuPressure(_) => "CPUPressure",
            Self::MemoryPressure(_) => "MemoryPressure",
            Self::DiskPressure(_) => "DiskPressure",
            Self::DiskFailure(_) => "DiskFailure",
            Self::Dns(_) => "DNS",
            Self::Grpc(_) => "GRPC",
            Self::ClockSkew(_) => "ClockSkew",
        }
    }

    pub fn validate(&self) -> Errors {
        let messages = match self {
            Self::Network(s) => s.validate(),
            Self::NodeFailure(_) | Self::ContainerFailure(_) => Vec::new(),
            Self::CpuPressure(s) => s.validate(),
            Self::MemoryPressure(s) => s.validate(),
            Self::DiskPressure(s) => s.validate(),
            Self::DiskFailure(s) => s.validate(),
            Self::Dns(s) => s.validate(),
            Self::Grpc(s) => s.validate(),
            Self::ClockSkew(s) => s.validate(),
        };
        let mut errors = Errors::default();
        for message in messages {
            errors.push(self.section(), message);
        }
        errors
    }

    /// Renders the kind subcommand and its flags.
    pub fn generate_args(&self) -> Vec<String> {
        let mut args = vec![self.kind().to_string()];
        match self {
            Self::Network(s) => s.append_args(&mut args),
            Self::NodeFailure(s) => {
                if s.shutdown {
                    args.push("--shutdown".to_string());
                }
            }
            Self::ContainerFailure(s) => {
                if s.forced {
                    args.push("--forced".to_string());
                }
            }
            Self::CpuPressure(s) => {
                if let Some(count) = &s.count {
                    args.push("--count".to_string());
                    args.push(int_or_string(count));
                }
            }
            Self::MemoryPressure(s) => {
                args.push("--target-percent".to_string());
                args.push(s.target_percent.clone());
                if let Some(ramp) = s.ramp_duration.filter(|d| d.as_nanos() > 0) {
                    args.push("--ramp-duration".to_string());
                    args.push(ramp.to_string());
                }
            }
            Self::DiskPressure(s) => {
                args.push("--path".to_string());
                args.push(s.path.clone());
                if let Some(read) = s.throttling.read_bytes_per_sec {
                    args.push("--read-bytes-per-sec".to_string());
                    args.push(read.to_string());
                }
                if let Some(write) = s.throttling.write_bytes_per_sec {
                    args.push("--write-bytes-per-sec".to_string());
                    args.push(write.to_string());
                }
            }
            Self::DiskFailure(s) => s.append_args(&mut args),
            Self::Dns(s) => {
                for pair in &s.0 {
                    args.push("--host-record-pairs".to_string());
                    args.push(format!(
                        "{};{};{}",
                        pair.host, pair.record.record_type, pair.record.value
                    ));
                }
            }
            Self::Grpc(s) => s.append_args(&mut args),
            Self::ClockSkew(s) => {
                args.push("--offset".to_string());
                args.push(s.offset.to_string());
            }
        }
        args
    }
}

fn int_or_string(v: &IntOrString) -> String {
    match v {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

/// Parses `N%` or `N` into an integer percentage.
fn parse_percent(s: &str) -> Option<i32> {
    let s = s.trim();
    s.strip_suffix('%').unwrap_or(s).parse().ok()
}

// === impl NetworkDisruptionSpec ===

impl NetworkDisruptionSpec {
    /// Whether the disruption is restricted to some hosts or services.
    pub fn has_filters(&self) -> bool {
        !self.hosts.is_empty() || !self.services.is_empty()
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, value) in [
            ("drop", self.drop),
            ("duplicate", self.duplicate),
            ("corrupt", self.corrupt),
        ] {
            if !(0..=100).contains(&value) {
                errors.push(format!("{name} must be a percentage between 0 and 100, got {value}"));
            }
        }
        if self.delay > MAX_NETWORK_DELAY_MS {
            errors.push(format!(
                "delay must not exceed {MAX_NETWORK_DELAY_MS}ms, got {}ms",
                self.delay
            ));
        }
        if self.delay_jitter > 100 {
            errors.push(format!(
                "delayJitter must be a percentage between 0 and 100, got {}",
                self.delay_jitter
            ));
        }
        if self.bandwidth_limit < 0 {
            errors.push(format!(
                "bandwidthLimit must not be negative, got {}",
                self.bandwidth_limit
            ));
        } else if self.bandwidth_limit > 0 && self.bandwidth_limit < MIN_BANDWIDTH_LIMIT {
            errors.push(format!(
                "bandwidthLimit must be at least {MIN_BANDWIDTH_LIMIT} bytes per second, got {}",
                self.bandwidth_limit
            ));
        }
        if self.drop == 0
            && self.duplicate == 0
            && self.corrupt == 0
            && self.delay == 0
            && self.bandwidth_limit == 0
        {
            errors.push(
                "the network disruption was selected, but no disruption type was specified; set at least one of drop, duplicate, corrupt, delay or bandwidthLimit"
                    .to_string(),
            );
        }

        for host in self.hosts.iter().chain(&self.allowed_hosts) {
            if !(0..=65535).contains(&host.port) {
                errors.push(format!(
                    "host {:?}: port must be between 0 and 65535, got {}",
                    host.host, host.port
                ));
            }
            if !matches!(host.protocol.as_str(), "" | "tcp" | "udp") {
                errors.push(format!(
                    "host {:?}: protocol must be tcp or udp, got {:?}",
                    host.host, host.protocol
                ));
            }
            if !matches!(host.flow.as_str(), "" | "egress" | "ingress") {
                errors.push(format!(
                    "host {:?}: flow must be egress or ingress, got {:?}",
                    host.host, host.flow
                ));
            }
            if host.host.is_empty() && host.port == 0 {
                errors.push("hosts must specify a host, a port or both".to_string());
            }
        }

        for svc in &self.services {
            if svc.name.is_empty() || svc.namespace.is_empty() {
                errors.push("services must specify both a name and a namespace".to_string());
            }
            if let Some(port) = svc.ports.iter().find(|p| !(1..=65535).contains(*p)) {
                errors.push(format!(
                    "service {}/{}: port must be between 1 and 65535, got {port}",
                    svc.namespace, svc.name
                ));
            }
        }

        errors
    }

    fn append_args(&self, args: &mut Vec<String>) {
        for (flag, value) in [
            ("--corrupt", self.corrupt),
            ("--drop", self.drop),
            ("--duplicate", self.duplicate),
            ("--bandwidth-limit", self.bandwidth_limit),
        ] {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        args.push("--delay".to_string());
        args.push(self.delay.to_string());
        args.push("--delay-jitter".to_string());
        args.push(self.delay_jitter.to_string());

        for (flag, hosts) in [("--hosts", &self.hosts), ("--allowed-hosts", &self.allowed_hosts)] {
            for h in hosts {
                args.push(flag.to_string());
                args.push(format!("{};{};{};{}", h.host, h.port, h.protocol, h.flow));
            }
        }
        for svc in &self.services {
            let ports = svc
                .ports
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            args.push("--services".to_string());
            args.push(format!("{};{};{}", svc.name, svc.namespace, ports));
        }
    }
}

// === impl CpuPressureSpec ===

impl CpuPressureSpec {
    fn validate(&self) -> Vec<String> {
        match &self.count {
            Some(count) => match count::validate(count) {
                Ok(()) => Vec::new(),
                Err(error) => vec![format!("count: {error}")],
            },
            None => Vec::new(),
        }
    }
}

// === impl MemoryPressureSpec ===

impl MemoryPressureSpec {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match parse_percent(&self.target_percent) {
            None => errors.push(format!("invalid targetPercent {:?}", self.target_percent)),
            Some(pct) if !(1..=100).contains(&pct) => {
                errors.push(format!("targetPercent must be between 1 and 100, got {pct}"))
            }
            Some(_) => {}
        }
        if let Some(ramp) = self.ramp_duration.filter(DisruptionDuration::is_negative) {
            errors.push(format!("rampDuration must be non-negative, got {ramp}"));
        }
        errors
    }
}

// === impl DiskPressureSpec ===

impl DiskPressureSpec {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.path.trim().is_empty() {
            errors.push("the path of the disk pressure disruption must not be empty".to_string());
        }
        let DiskPressureThrottlingSpec {
            read_bytes_per_sec,
            write_bytes_per_sec,
        } = self.throttling;
        if read_bytes_per_sec.is_none() && write_bytes_per_sec.is_none() {
            errors.push(
                "at least one of throttling.readBytesPerSec or throttling.writeBytesPerSec must be set"
                    .to_string(),
            );
        }
        for (name, value) in [
            ("readBytesPerSec", read_bytes_per_sec),
            ("writeBytesPerSec", write_bytes_per_sec),
        ] {
            if let Some(v) = value.filter(|v| *v <= 0) {
                errors.push(format!("throttling.{name} must be positive, got {v}"));
            }
        }
        errors
    }
}

// === impl DiskFailureSpec ===

impl DiskFailureSpec {
    /// Paths with surrounding whitespace removed.
    pub fn trimmed_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|p| p.trim())
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.paths.is_empty() || self.trimmed_paths().any(str::is_empty) {
            errors.push("the path of the disk failure disruption must not be empty".to_string());
        }
        if let Some(long) = self
            .trimmed_paths()
            .find(|p| p.len() > MAX_DISK_FAILURE_PATH_LEN)
        {
            errors.push(format!(
                "the path of the disk failure disruption must not exceed {MAX_DISK_FAILURE_PATH_LEN} characters, found {}",
                long.len()
            ));
        }

        if !is_strict_percent(&self.probability) {
            errors.push(
                "the probability of the disk failure disruption should be a percentage within the range of 1% to 100%"
                    .to_string(),
            );
        }

        if let Some(code) = self
            .openat_syscall
            .as_ref()
            .map(|o| o.exit_code.as_str())
            .filter(|c| !c.is_empty())
        {
            if OpenatSyscallSpec::errno(code).is_none() {
                errors.push(format!(
                    "the exit code {code:?} of the disk failure disruption is not a supported openat errno"
                ));
            }
        }
        errors
    }

    fn append_args(&self, args: &mut Vec<String>) {
        for path in self.trimmed_paths() {
            args.push("--path".to_string());
            args.push(path.to_string());
        }
        if let Some(o) = self.openat_syscall.as_ref().filter(|o| !o.exit_code.is_empty()) {
            args.push("--exit-code".to_string());
            args.push(o.exit_code.clone());
        }
        args.push("--probability".to_string());
        args.push(self.probability.clone());
    }
}

/// Accepts exactly `N%` with an integer `N` in `[1, 100]`.
fn is_strict_percent(s: &str) -> bool {
    match s.strip_suffix('%') {
        Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            matches!(n.parse::<u32>(), Ok(1..=100))
        }
        _ => false,
    }
}

// === impl OpenatSyscallSpec ===

impl OpenatSyscallSpec {
    const ERRNOS: &'static [(&'static str, i32)] = &[
        ("EACCES", 13),
        ("EDQUOT", 122),
        ("EEXIST", 17),
        ("EFAULT", 14),
        ("EFBIG", 27),
        ("EINTR", 4),
        ("EISDIR", 21),
        ("ELOOP", 40),
        ("EMFILE", 24),
        ("ENAMETOOLONG", 36),
        ("ENFILE", 23),
        ("ENODEV", 19),
        ("ENOENT", 2),
        ("ENOMEM", 12),
        ("ENOSPC", 28),
        ("ENOTDIR", 20),
        ("ENXIO", 6),
        ("EOVERFLOW", 75),
        ("EPERM", 1),
        ("EROFS", 30),
        ("ETXTBSY", 26),
        ("EWOULDBLOCK", 11),
    ];

    /// Numeric value of an errno name.
    pub fn errno(name: &str) -> Option<i32> {
        Self::ERRNOS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, code)| *code)
    }

    pub fn exit_code_int(&self) -> Option<i32> {
        Self::errno(&self.exit_code)
    }
}

// === impl DnsDisruptionSpec ===

impl DnsDisruptionSpec {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.0.is_empty() {
            errors.push("at least one hostname/record pair must be specified".to_string());
        }
        for pair in &self.0 {
            if pair.host.is_empty() {
                errors.push("no hostname specified in dns disruption".to_string());
            }
            if !matches!(pair.record.record_type.as_str(), "A" | "CNAME") {
                errors.push(format!(
                    "invalid record type specified in dns disruption, must be A or CNAME but found: {}",
                    pair.record.record_type
                ));
            }
            if pair.record.value.is_empty() {
                errors.push("no value specified for dns record in dns disruption".to_string());
            }
        }
        errors
    }
}

// === impl GrpcDisruptionSpec ===

impl GrpcDisruptionSpec {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(1..=65535).contains(&self.port) {
            errors.push(format!("port must be between 1 and 65535, got {}", self.port));
        }
        if self.endpoints.is_empty() {
            errors.push(
                "the gRPC disruption was selected with no endpoints specified, but endpoints must be specified"
                    .to_string(),
            );
        }

        let mut query_pct_by_endpoint = BTreeMap::<&str, i32>::new();
        for alt in &self.endpoints {
            if alt.target_endpoint.is_empty() {
                errors.push(
                    "some list items in gRPC disruption are missing endpoints; specify an endpoint for each item in the list"
                        .to_string(),
                );
                continue;
            }
            match (alt.error_to_return.is_empty(), alt.override_to_return.is_empty()) {
                (false, false) => errors.push(format!(
                    "the gRPC disruption has error and override specified for endpoint {}, but it can only have one",
                    alt.target_endpoint
                )),
                (true, true) => errors.push(format!(
                    "the gRPC disruption must have either error or override specified for endpoint {}",
                    alt.target_endpoint
                )),
                _ => {}
            }
            if !(0..=100).contains(&alt.query_percent) {
                errors.push(format!(
                    "query_pct of endpoint {} must be between 0 and 100, got {}",
                    alt.target_endpoint, alt.query_percent
                ));
            }
            let total = query_pct_by_endpoint
                .entry(alt.target_endpoint.as_str())
                .or_default();
            *total += alt.query_percent;
            if *total > 100 {
                errors.push(format!(
                    "total query_pct of all alterations applied to endpoint {} is over 100%",
                    alt.target_endpoint
                ));
            }
        }
        errors
    }

    fn append_args(&self, args: &mut Vec<String>) {
        args.push("--port".to_string());
        args.push(self.port.to_string());
        for alt in &self.endpoints {
            let (kind, value) = if alt.override_to_return.is_empty() {
                ("error", &alt.error_to_return)
            } else {
                ("override", &alt.override_to_return)
            };
            args.push("--endpoint-alterations".to_string());
            args.push(format!(
                "{};{kind};{value};{}",
                alt.target_endpoint, alt.query_percent
            ));
        }
    }
}

// === impl ClockSkewSpec ===

impl ClockSkewSpec {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.offset.is_zero() {
            errors.push(
                "clockSkew.offset must not be zero; use a positive value to advance time or a negative value to go back in time"
                    .to_string(),
            );
        }
        let nanos = self.offset.as_nanos();
        if nanos > MAX_CLOCK_SKEW.as_nanos() || nanos < -MAX_CLOCK_SKEW.as_nanos() {
            errors.push(format!(
                "clockSkew.offset of {} seems unusually large (>10 years); please verify this is intentional",
                self.offset
            ));
        }
        errors
    }
}

use crate::{
    kinds::{
        ClockSkewSpec, ContainerFailureSpec, CpuPressureSpec, DiskFailureSpec, DiskPressureSpec,
        DnsDisruptionSpec, GrpcDisruptionSpec, KindSpec, MemoryPressureSpec,
        NetworkDisruptionSpec, NodeFailureSpec,
    },
    labels::{self, Expression},
    unsafemode::UnsafemodeSpec,
};
use chaos_controller_core::{
    time_to_create_pods, time_to_inject, DisruptionDuration, DisruptionInjectionStatus,
    DisruptionKindName, DisruptionLevel, DisruptionTriggers, Lifetime, PulseArgs,
    TargetInjections, TerminationStatus,
};
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::core::v1::Pod,
    apimachinery::pkg::{apis::meta::v1::Time, util::intstr::IntOrString},
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declares a failure to inject into a set of pods or nodes.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "chaos.datadoghq.com",
    version = "v1beta1",
    kind = "Disruption",
    namespaced,
    status = "DisruptionStatus",
    shortname = "dis"
)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionSpec {
    /// Number of targets, absolute or as a percentage of the eligible ones.
    pub count: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<labels::Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_selector: Option<Vec<Expression>>,
    #[serde(default)]
    pub level: DisruptionLevel,
    /// Containers to target; all containers when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<String>,
    #[serde(default)]
    pub on_init: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub static_targeting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DisruptionDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<DisruptionTriggers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse: Option<DisruptionPulse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsafe_mode: Option<UnsafemodeSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkDisruptionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_failure: Option<NodeFailureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_failure: Option<ContainerFailureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_pressure: Option<CpuPressureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_pressure: Option<MemoryPressureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_pressure: Option<DiskPressureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_failure: Option<DiskFailureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsDisruptionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcDisruptionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_skew: Option<ClockSkewSpec>,
}

/// Alternates injection on and off for the lifetime of a disruption.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionPulse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<DisruptionDuration>,
    pub active_duration: DisruptionDuration,
    pub dormant_duration: DisruptionDuration,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionStatus {
    #[serde(default)]
    pub is_stuck_on_removal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection_status: Option<DisruptionInjectionStatus>,
    #[serde(default)]
    pub selected_targets_count: i32,
    #[serde(default)]
    pub ignored_targets_count: i32,
    #[serde(default)]
    pub injected_targets_count: i32,
    #[serde(default)]
    pub desired_targets_count: i32,
    #[serde(default, skip_serializing_if = "TargetInjections::is_empty")]
    pub target_injections: TargetInjections,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_at: Option<Time>,
}

// === impl DisruptionSpec ===

impl DisruptionSpec {
    /// The active kind sub-specs, in a stable order.
    pub fn kinds(&self) -> impl Iterator<Item = KindSpec<'_>> {
        [
            self.network.as_ref().map(KindSpec::Network),
            self.node_failure.as_ref().map(KindSpec::NodeFailure),
            self.container_failure.as_ref().map(KindSpec::ContainerFailure),
            self.cpu_pressure.as_ref().map(KindSpec::CpuPressure),
            self.memory_pressure.as_ref().map(KindSpec::MemoryPressure),
            self.disk_pressure.as_ref().map(KindSpec::DiskPressure),
            self.disk_failure.as_ref().map(KindSpec::DiskFailure),
            self.dns.as_ref().map(KindSpec::Dns),
            self.grpc.as_ref().map(KindSpec::Grpc),
            self.clock_skew.as_ref().map(KindSpec::ClockSkew),
        ]
        .into_iter()
        .flatten()
    }

    pub fn kind_names(&self) -> impl Iterator<Item = DisruptionKindName> + '_ {
        self.kinds().map(|k| k.kind())
    }

    pub fn label_selector(&self) -> labels::Selector<'_> {
        labels::Selector {
            match_labels: self.selector.as_ref(),
            match_expressions: self.advanced_selector.as_deref(),
        }
    }

    pub fn duration(&self) -> DisruptionDuration {
        self.duration.unwrap_or_default()
    }

    pub fn pulse_args(&self) -> Option<PulseArgs> {
        self.pulse.as_ref().map(|p| PulseArgs {
            initial_delay: p.initial_delay.unwrap_or_default(),
            active: p.active_duration,
            dormant: p.dormant_duration,
        })
    }
}

// === impl Disruption ===

impl Disruption {
    fn creation(&self) -> Option<DateTime<Utc>> {
        self.metadata.creation_timestamp.as_ref().map(|Time(t)| *t)
    }

    /// The parts of this disruption its termination depends on.
    pub fn lifetime(&self) -> Lifetime<'_> {
        Lifetime {
            creation: self.creation(),
            deletion: self.metadata.deletion_timestamp.as_ref().map(|Time(t)| *t),
            duration: self.spec.duration(),
            triggers: self.spec.triggers.as_ref(),
            injection_status: self.status.as_ref().and_then(|s| s.injection_status),
        }
    }

    pub fn time_to_create_pods(&self) -> Option<DateTime<Utc>> {
        let creation = self.creation()?;
        Some(time_to_create_pods(self.spec.triggers.as_ref(), creation))
    }

    pub fn time_to_inject(&self) -> Option<DateTime<Utc>> {
        let creation = self.creation()?;
        Some(time_to_inject(self.spec.triggers.as_ref(), creation))
    }

    pub fn remaining_duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.lifetime().remaining(now)
    }

    pub fn termination_status(&self, chaos_pods: &[Pod], now: DateTime<Utc>) -> TerminationStatus {
        self.lifetime().termination_status(chaos_pods, now)
    }
}

// === impl DisruptionStatus ===

impl DisruptionStatus {
    /// Records the tracked targets and derives the counters and aggregate
    /// injection state from them.
    pub fn record_targets(
        &mut self,
        targets: TargetInjections,
        desired: i32,
        ignored: i32,
        paused: bool,
    ) {
        let injected = targets.injected_count();
        let desired = desired.max(0);
        self.selected_targets_count = clamp_count(targets.len());
        self.injected_targets_count = clamp_count(injected);
        self.desired_targets_count = desired;
        self.ignored_targets_count = ignored;
        self.is_stuck_on_removal = targets.stuck_on_removal_count() > 0;
        self.injection_status = Some(DisruptionInjectionStatus::compute(
            injected,
            desired as usize,
            paused,
        ));
        self.target_injections = targets;
    }

    /// Freezes the aggregate state once the disruption has definitively
    /// terminated and its injectors are gone.
    pub fn mark_cleaned(&mut self, at: DateTime<Utc>) {
        self.injection_status = Some(
            self.injection_status
                .unwrap_or(DisruptionInjectionStatus::NotInjected)
                .previously(),
        );
        self.cleaned_at = Some(Time(at));
        self.target_injections = TargetInjections::default();
    }
}

fn clamp_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

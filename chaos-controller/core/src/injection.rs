use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Names each disruption kind, as used in CLI subcommands, labels and the
/// per-target injection map.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum DisruptionKindName {
    #[serde(rename = "network-disruption")]
    NetworkDisruption,
    #[serde(rename = "node-failure")]
    NodeFailure,
    #[serde(rename = "container-failure")]
    ContainerFailure,
    #[serde(rename = "cpu-pressure")]
    CpuPressure,
    #[serde(rename = "memory-pressure")]
    MemoryPressure,
    #[serde(rename = "disk-pressure")]
    DiskPressure,
    #[serde(rename = "disk-failure")]
    DiskFailure,
    #[serde(rename = "dns-disruption")]
    DnsDisruption,
    #[serde(rename = "grpc-disruption")]
    GrpcDisruption,
    #[serde(rename = "clock-skew")]
    ClockSkew,
}

/// Kinds whose effect cannot be retried safely against the same target.
pub const NON_REINJECTABLE: [DisruptionKindName; 2] = [
    DisruptionKindName::NodeFailure,
    DisruptionKindName::GrpcDisruption,
];

/// Kinds whose effect ends with the injector pod itself, so no separate
/// cleanup is needed once the pod is gone.
pub const NO_SIDE_EFFECT: [DisruptionKindName; 2] = [
    DisruptionKindName::NodeFailure,
    DisruptionKindName::ContainerFailure,
];

/// The state of a single target/kind pair.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum TargetInjectionStatus {
    #[default]
    NotInjected,
    Injected,
    IsStuckOnRemoval,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetInjection {
    #[serde(default)]
    pub injector_pod_name: String,
    #[serde(default)]
    pub injection_status: TargetInjectionStatus,
    pub since: Option<Time>,
}

/// Injections of one target, by disruption kind.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct TargetInjectorMap(BTreeMap<DisruptionKindName, TargetInjection>);

/// The aggregated injection state of a whole disruption.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum DisruptionInjectionStatus {
    NotInjected,
    PartiallyInjected,
    Injected,
    PausedPartiallyInjected,
    PausedInjected,
    PreviouslyNotInjected,
    PreviouslyPartiallyInjected,
    PreviouslyInjected,
}

// === impl DisruptionKindName ===

impl DisruptionKindName {
    pub const ALL: [Self; 10] = [
        Self::NetworkDisruption,
        Self::NodeFailure,
        Self::ContainerFailure,
        Self::CpuPressure,
        Self::MemoryPressure,
        Self::DiskPressure,
        Self::DiskFailure,
        Self::DnsDisruption,
        Self::GrpcDisruption,
        Self::ClockSkew,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkDisruption => "network-disruption",
            Self::NodeFailure => "node-failure",
            Self::ContainerFailure => "container-failure",
            Self::CpuPressure => "cpu-pressure",
            Self::MemoryPressure => "memory-pressure",
            Self::DiskPressure => "disk-pressure",
            Self::DiskFailure => "disk-failure",
            Self::DnsDisruption => "dns-disruption",
            Self::GrpcDisruption => "grpc-disruption",
            Self::ClockSkew => "clock-skew",
        }
    }

    pub fn is_reinjectable(&self) -> bool {
        !NON_REINJECTABLE.contains(self)
    }

    pub fn has_side_effects(&self) -> bool {
        !NO_SIDE_EFFECT.contains(self)
    }
}

impl fmt::Display for DisruptionKindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown disruption kind: {0}")]
pub struct UnknownKind(String);

impl FromStr for DisruptionKindName {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A statically-targeted node failure must not be re-triggered once it has
/// been attempted: the target pod may since have been rescheduled onto a
/// different node.
pub fn should_skip_node_failure_injection(
    kind: DisruptionKindName,
    static_targeting: bool,
    status: TargetInjectionStatus,
) -> bool {
    kind == DisruptionKindName::NodeFailure
        && static_targeting
        && status != TargetInjectionStatus::NotInjected
}

// === impl TargetInjectorMap ===

impl TargetInjectorMap {
    /// A map holding a not-yet-injected entry for each of `kinds`.
    pub fn for_kinds(kinds: impl IntoIterator<Item = DisruptionKindName>) -> Self {
        Self(
            kinds
                .into_iter()
                .map(|k| (k, TargetInjection::default()))
                .collect(),
        )
    }

    pub fn injection_with_kind(&self, kind: DisruptionKindName) -> Option<&TargetInjection> {
        self.0.get(&kind)
    }

    pub fn injection_with_kind_mut(
        &mut self,
        kind: DisruptionKindName,
    ) -> Option<&mut TargetInjection> {
        self.0.get_mut(&kind)
    }

    pub fn insert(&mut self, kind: DisruptionKindName, injection: TargetInjection) {
        self.0.insert(kind, injection);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DisruptionKindName, &TargetInjection)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn all_injected(&self) -> bool {
        self.0
            .values()
            .all(|i| i.injection_status == TargetInjectionStatus::Injected)
    }
}

impl FromIterator<(DisruptionKindName, TargetInjection)> for TargetInjectorMap {
    fn from_iter<T: IntoIterator<Item = (DisruptionKindName, TargetInjection)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl DisruptionInjectionStatus ===

impl DisruptionInjectionStatus {
    /// Derives the aggregate status from the number of fully-injected targets.
    pub fn compute(injected: usize, desired: usize, paused: bool) -> Self {
        match (injected, paused) {
            (0, false) => Self::NotInjected,
            (0, true) => Self::PausedPartiallyInjected,
            (n, false) if n >= desired => Self::Injected,
            (_, false) => Self::PartiallyInjected,
            (n, true) if n >= desired => Self::PausedInjected,
            (_, true) => Self::PausedPartiallyInjected,
        }
    }

    pub fn not_fully_injected(&self) -> bool {
        matches!(
            self,
            Self::NotInjected
                | Self::PartiallyInjected
                | Self::PausedPartiallyInjected
                | Self::PausedInjected
        )
    }

    pub fn never_injected(status: Option<Self>) -> bool {
        matches!(
            status,
            None | Some(Self::NotInjected) | Some(Self::PreviouslyNotInjected)
        )
    }

    /// The status recorded once a disruption has definitively terminated.
    pub fn previously(self) -> Self {
        match self {
            Self::NotInjected | Self::PreviouslyNotInjected => Self::PreviouslyNotInjected,
            Self::Injected | Self::PausedInjected | Self::PreviouslyInjected => {
                Self::PreviouslyInjected
            }
            Self::PartiallyInjected
            | Self::PausedPartiallyInjected
            | Self::PreviouslyPartiallyInjected => Self::PreviouslyPartiallyInjected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn kind_classification() {
        use DisruptionKindName::*;
        assert!(!NodeFailure.is_reinjectable());
        assert!(!GrpcDisruption.is_reinjectable());
        assert!(NetworkDisruption.is_reinjectable());

        assert!(!NodeFailure.has_side_effects());
        assert!(!ContainerFailure.has_side_effects());
        assert!(DiskFailure.has_side_effects());
    }

    #[test]
    fn kind_names_round_trip_through_strings() {
        for kind in DisruptionKindName::ALL {
            assert_eq!(kind.to_string().parse::<DisruptionKindName>().ok(), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.to_string())
            );
        }
        assert!("not-a-kind".parse::<DisruptionKindName>().is_err());
    }

    #[rstest]
    #[case(DisruptionKindName::NodeFailure, true, TargetInjectionStatus::NotInjected, false)]
    #[case(DisruptionKindName::NodeFailure, true, TargetInjectionStatus::Injected, true)]
    #[case(DisruptionKindName::NodeFailure, true, TargetInjectionStatus::IsStuckOnRemoval, true)]
    #[case(DisruptionKindName::NodeFailure, false, TargetInjectionStatus::Injected, false)]
    #[case(DisruptionKindName::CpuPressure, true, TargetInjectionStatus::Injected, false)]
    fn skips_node_failure_reinjection(
        #[case] kind: DisruptionKindName,
        #[case] static_targeting: bool,
        #[case] status: TargetInjectionStatus,
        #[case] skip: bool,
    ) {
        assert_eq!(
            should_skip_node_failure_injection(kind, static_targeting, status),
            skip
        );
    }

    #[rstest]
    #[case(DisruptionInjectionStatus::NotInjected, true)]
    #[case(DisruptionInjectionStatus::PartiallyInjected, true)]
    #[case(DisruptionInjectionStatus::Injected, false)]
    #[case(DisruptionInjectionStatus::PausedPartiallyInjected, true)]
    #[case(DisruptionInjectionStatus::PausedInjected, true)]
    #[case(DisruptionInjectionStatus::PreviouslyNotInjected, false)]
    #[case(DisruptionInjectionStatus::PreviouslyPartiallyInjected, false)]
    #[case(DisruptionInjectionStatus::PreviouslyInjected, false)]
    fn aggregate_not_fully_injected(#[case] status: DisruptionInjectionStatus, #[case] expected: bool) {
        assert_eq!(status.not_fully_injected(), expected);
    }

    #[test]
    fn aggregate_status_from_counts() {
        use DisruptionInjectionStatus::*;
        assert_eq!(DisruptionInjectionStatus::compute(0, 3, false), NotInjected);
        assert_eq!(DisruptionInjectionStatus::compute(2, 3, false), PartiallyInjected);
        assert_eq!(DisruptionInjectionStatus::compute(3, 3, false), Injected);
        assert_eq!(DisruptionInjectionStatus::compute(3, 3, true), PausedInjected);
        assert_eq!(DisruptionInjectionStatus::compute(1, 3, true), PausedPartiallyInjected);

        assert_eq!(Injected.previously(), PreviouslyInjected);
        assert_eq!(PausedPartiallyInjected.previously(), PreviouslyPartiallyInjected);
        assert!(DisruptionInjectionStatus::never_injected(None));
        assert!(DisruptionInjectionStatus::never_injected(Some(PreviouslyNotInjected)));
        assert!(!DisruptionInjectionStatus::never_injected(Some(PartiallyInjected)));
    }

    #[test]
    fn injector_map_lookup() {
        let mut map = TargetInjectorMap::for_kinds([
            DisruptionKindName::NetworkDisruption,
            DisruptionKindName::CpuPressure,
        ]);
        assert_eq!(map.len(), 2);
        assert!(map
            .injection_with_kind(DisruptionKindName::DiskFailure)
            .is_none());
        assert!(!map.all_injected());

        for kind in [DisruptionKindName::NetworkDisruption, DisruptionKindName::CpuPressure] {
            map.injection_with_kind_mut(kind)
                .expect("kind must be tracked")
                .injection_status = TargetInjectionStatus::Injected;
        }
        assert!(map.all_injected());
    }
}

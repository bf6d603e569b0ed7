use crate::{
    duration::DisruptionDuration,
    injection::DisruptionInjectionStatus,
    triggers::{time_to_inject, DisruptionTriggers},
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TerminationStatus {
    NotTerminated,
    /// Every injector exited cleanly, or injectors vanished after an
    /// injection. May still become definitive.
    TemporarilyTerminated,
    /// The disruption expired or is being deleted.
    DefinitivelyTerminated,
}

/// The parts of a disruption the termination state depends on.
#[derive(Clone, Debug, Default)]
pub struct Lifetime<'a> {
    pub creation: Option<DateTime<Utc>>,
    pub deletion: Option<DateTime<Utc>>,
    pub duration: DisruptionDuration,
    pub triggers: Option<&'a DisruptionTriggers>,
    pub injection_status: Option<DisruptionInjectionStatus>,
}

// === impl Lifetime ===

impl Lifetime<'_> {
    /// Time left before the disruption expires, measured from the moment
    /// injection may start. Negative once expired; `None` before creation.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let creation = self.creation?;
        let start = time_to_inject(self.triggers, creation);
        Some(start + self.duration.to_delta() - now)
    }

    /// Classifies the disruption given the injector pods currently observed.
    pub fn termination_status(&self, chaos_pods: &[Pod], now: DateTime<Utc>) -> TerminationStatus {
        let remaining = match self.remaining(now) {
            Some(remaining) => remaining,
            None => return TerminationStatus::NotTerminated,
        };

        if remaining <= chrono::Duration::zero() || self.deletion.is_some() {
            return TerminationStatus::DefinitivelyTerminated;
        }

        if chaos_pods.is_empty() {
            if DisruptionInjectionStatus::never_injected(self.injection_status) {
                return TerminationStatus::NotTerminated;
            }
            return TerminationStatus::TemporarilyTerminated;
        }

        // Injectors that failed are still considered running; they will be
        // retried.
        let all_succeeded = chaos_pods
            .iter()
            .filter_map(|pod| pod.status.as_ref()?.container_statuses.as_ref())
            .flatten()
            .all(|cs| {
                cs.state
                    .as_ref()
                    .and_then(|s| s.terminated.as_ref())
                    .is_some_and(|t| t.exit_code == 0)
            });
        if all_succeeded {
            TerminationStatus::TemporarilyTerminated
        } else {
            TerminationStatus::NotTerminated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus,
        PodStatus,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn lifetime() -> Lifetime<'static> {
        Lifetime {
            creation: Some(t0()),
            duration: DisruptionDuration::from_hours(1),
            injection_status: Some(DisruptionInjectionStatus::Injected),
            ..Default::default()
        }
    }

    fn pod(states: impl IntoIterator<Item = ContainerState>) -> Pod {
        Pod {
            status: Some(PodStatus {
                container_statuses: Some(
                    states
                        .into_iter()
                        .map(|state| ContainerStatus {
                            name: "injector".to_string(),
                            state: Some(state),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn running() -> ContainerState {
        ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }
    }

    fn exited(code: i32) -> ContainerState {
        ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: code,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn uncreated_disruptions_are_not_terminated() {
        let lifetime = Lifetime {
            creation: None,
            ..lifetime()
        };
        assert_eq!(
            lifetime.termination_status(&[], t0() + chrono::Duration::days(1)),
            TerminationStatus::NotTerminated
        );
        assert_eq!(lifetime.remaining(t0()), None);
    }

    #[test]
    fn expiry_or_deletion_is_definitive() {
        let now = t0() + chrono::Duration::minutes(10);
        let pods = [pod([running()])];

        let deleted = Lifetime {
            deletion: Some(now),
            ..lifetime()
        };
        assert_eq!(
            deleted.termination_status(&pods, now),
            TerminationStatus::DefinitivelyTerminated
        );

        let later = t0() + chrono::Duration::hours(1);
        assert_eq!(
            lifetime().termination_status(&pods, later),
            TerminationStatus::DefinitivelyTerminated
        );
    }

    #[test]
    fn remaining_duration_starts_at_injection() {
        let triggers = DisruptionTriggers {
            create_pods: crate::triggers::DisruptionTrigger {
                offset: Some(DisruptionDuration::from_mins(30)),
                ..Default::default()
            },
            ..Default::default()
        };
        let lifetime = Lifetime {
            triggers: Some(&triggers),
            ..lifetime()
        };
        assert_eq!(
            lifetime.remaining(t0() + chrono::Duration::hours(1)),
            Some(chrono::Duration::minutes(30))
        );
    }

    #[test]
    fn missing_pods_depend_on_injection_history() {
        let now = t0() + chrono::Duration::minutes(10);
        assert_eq!(
            lifetime().termination_status(&[], now),
            TerminationStatus::TemporarilyTerminated
        );

        for status in [
            None,
            Some(DisruptionInjectionStatus::NotInjected),
            Some(DisruptionInjectionStatus::PreviouslyNotInjected),
        ] {
            let lifetime = Lifetime {
                injection_status: status,
                ..lifetime()
            };
            assert_eq!(
                lifetime.termination_status(&[], now),
                TerminationStatus::NotTerminated,
                "{status:?}"
            );
        }
    }

    #[test]
    fn container_states_drive_temporary_termination() {
        let now = t0() + chrono::Duration::minutes(10);
        let cases = [
            (vec![pod([exited(0)]), pod([exited(0), exited(0)])], TerminationStatus::TemporarilyTerminated),
            (vec![pod([exited(0)]), pod([running()])], TerminationStatus::NotTerminated),
            (vec![pod([exited(0), exited(1)])], TerminationStatus::NotTerminated),
            (vec![pod([ContainerState::default()])], TerminationStatus::NotTerminated),
        ];
        for (pods, expected) in cases {
            assert_eq!(lifetime().termination_status(&pods, now), expected);
        }
    }
}

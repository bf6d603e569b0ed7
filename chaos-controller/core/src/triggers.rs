use crate::duration::DisruptionDuration;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Delays applied to a disruption's pod creation and injection.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionTriggers {
    #[serde(default, skip_serializing_if = "DisruptionTrigger::is_zero")]
    pub inject: DisruptionTrigger,
    #[serde(default, skip_serializing_if = "DisruptionTrigger::is_zero")]
    pub create_pods: DisruptionTrigger,
}

/// A delay, either absolute or relative. At most one of the two may be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<DisruptionDuration>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("{0}: notBefore and offset cannot both be set")]
    BothSet(&'static str),

    #[error("{trigger}: offset must not be negative, got {offset}")]
    NegativeOffset {
        trigger: &'static str,
        offset: DisruptionDuration,
    },

    #[error("inject.notBefore ({inject}) must not be earlier than createPods.notBefore ({create_pods})")]
    InjectBeforeCreatePods {
        inject: DateTime<Utc>,
        create_pods: DateTime<Utc>,
    },
}

// === impl DisruptionTriggers ===

impl DisruptionTriggers {
    pub fn is_zero(&self) -> bool {
        self.inject.is_zero() && self.create_pods.is_zero()
    }

    /// Reports every inconsistency rather than stopping at the first one.
    pub fn validate(&self) -> Vec<TriggerError> {
        let mut errors = Vec::new();
        for (name, trigger) in [("inject", &self.inject), ("createPods", &self.create_pods)] {
            if trigger.not_before.is_some() && trigger.offset.is_some() {
                errors.push(TriggerError::BothSet(name));
            }
            if let Some(offset) = trigger.offset.filter(DisruptionDuration::is_negative) {
                errors.push(TriggerError::NegativeOffset {
                    trigger: name,
                    offset,
                });
            }
        }

        if let (Some(Time(inject)), Some(Time(create_pods))) =
            (&self.inject.not_before, &self.create_pods.not_before)
        {
            if inject < create_pods {
                errors.push(TriggerError::InjectBeforeCreatePods {
                    inject: *inject,
                    create_pods: *create_pods,
                });
            }
        }

        errors
    }
}

// === impl DisruptionTrigger ===

impl DisruptionTrigger {
    pub fn is_zero(&self) -> bool {
        self.not_before.is_none() && self.offset.map_or(true, |o| o.is_zero())
    }

    /// Resolves the trigger against `base`, never returning an instant before
    /// `floor`.
    fn resolve(&self, base: DateTime<Utc>, floor: DateTime<Utc>) -> DateTime<Utc> {
        let at = match (&self.not_before, self.offset) {
            (Some(Time(not_before)), _) => *not_before,
            (None, Some(offset)) if offset.as_nanos() > 0 => base + offset.to_delta(),
            _ => base,
        };
        at.max(floor)
    }
}

/// The instant at which injector pods may be created.
pub fn time_to_create_pods(
    triggers: Option<&DisruptionTriggers>,
    creation: DateTime<Utc>,
) -> DateTime<Utc> {
    match triggers {
        Some(t) if !t.create_pods.is_zero() => t.create_pods.resolve(creation, creation),
        _ => creation,
    }
}

/// The instant at which injection may start. A relative inject offset stacks
/// on top of the create-pods instant.
pub fn time_to_inject(
    triggers: Option<&DisruptionTriggers>,
    creation: DateTime<Utc>,
) -> DateTime<Utc> {
    let create_pods = time_to_create_pods(triggers, creation);
    match triggers {
        Some(t) if !t.inject.is_zero() => t.inject.resolve(create_pods, creation),
        _ => create_pods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn offset(d: DisruptionDuration) -> DisruptionTrigger {
        DisruptionTrigger {
            offset: Some(d),
            ..Default::default()
        }
    }

    fn not_before(at: DateTime<Utc>) -> DisruptionTrigger {
        DisruptionTrigger {
            not_before: Some(Time(at)),
            ..Default::default()
        }
    }

    #[test]
    fn without_triggers_everything_happens_at_creation() {
        assert_eq!(time_to_create_pods(None, t0()), t0());
        assert_eq!(time_to_inject(None, t0()), t0());
        let empty = DisruptionTriggers::default();
        assert_eq!(time_to_inject(Some(&empty), t0()), t0());
    }

    #[test]
    fn inject_follows_create_pods_offset() {
        let triggers = DisruptionTriggers {
            create_pods: offset(DisruptionDuration::from_mins(5)),
            ..Default::default()
        };
        let five = chrono::Duration::minutes(5);
        assert_eq!(time_to_create_pods(Some(&triggers), t0()), t0() + five);
        assert_eq!(time_to_inject(Some(&triggers), t0()), t0() + five);
    }

    #[test]
    fn inject_offset_stacks_on_create_pods() {
        let triggers = DisruptionTriggers {
            create_pods: offset(DisruptionDuration::from_mins(5)),
            inject: offset(DisruptionDuration::from_mins(2)),
        };
        assert_eq!(
            time_to_inject(Some(&triggers), t0()),
            t0() + chrono::Duration::minutes(7)
        );
    }

    #[test]
    fn past_instants_clamp_to_creation() {
        let earlier = t0() - chrono::Duration::hours(1);
        let triggers = DisruptionTriggers {
            inject: not_before(earlier),
            create_pods: not_before(earlier),
        };
        assert_eq!(time_to_create_pods(Some(&triggers), t0()), t0());
        assert_eq!(time_to_inject(Some(&triggers), t0()), t0());
    }

    #[test]
    fn absolute_inject_ignores_create_pods() {
        let later = t0() + chrono::Duration::minutes(30);
        let triggers = DisruptionTriggers {
            inject: not_before(later),
            create_pods: offset(DisruptionDuration::from_mins(10)),
        };
        assert_eq!(time_to_inject(Some(&triggers), t0()), later);
    }

    #[test]
    fn non_positive_offsets_are_ignored() {
        let triggers = DisruptionTriggers {
            create_pods: offset(DisruptionDuration::from_mins(-5)),
            ..Default::default()
        };
        assert_eq!(time_to_create_pods(Some(&triggers), t0()), t0());
    }

    #[test]
    fn validation_reports_every_problem() {
        let triggers = DisruptionTriggers {
            inject: DisruptionTrigger {
                not_before: Some(Time(t0())),
                offset: Some(DisruptionDuration::from_secs(-1)),
            },
            create_pods: not_before(t0() + chrono::Duration::minutes(1)),
        };
        let errors = triggers.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.contains(&TriggerError::BothSet("inject")));

        let valid = DisruptionTriggers {
            inject: offset(DisruptionDuration::from_mins(1)),
            create_pods: not_before(t0()),
        };
        assert!(valid.validate().is_empty());
    }
}

use crate::{
    core::{count, DisruptionDuration},
    k8s::{labels::Expression, DisruptionSpec, Errors},
};
use regex::Regex;

const LABEL_NAME_REGEX: &str = r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$";
const DNS_SUBDOMAIN_REGEX: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";
const MAX_LABEL_NAME_LEN: usize = 63;
const MAX_LABEL_PREFIX_LEN: usize = 253;

pub(crate) const MIN_PULSE_DURATION: DisruptionDuration = DisruptionDuration::from_millis(500);

/// Checks every admission rule that does not depend on the cluster's state.
pub(crate) fn validate_spec(spec: &DisruptionSpec) -> Errors {
    let mut errors = Errors::default();

    if spec.label_selector().is_empty() {
        errors.push(
            "Spec",
            "either selector or advancedSelector field must be set",
        );
    }
    for (key, value) in spec.selector.iter().flatten() {
        if let Err(error) = validate_label_key(key).and_then(|()| validate_label_value(value)) {
            errors.push("Spec", format_args!("selector: {error}"));
        }
    }
    for expr in spec.advanced_selector.iter().flatten() {
        if let Err(error) = validate_expression(expr) {
            errors.push("Spec", format_args!("advancedSelector: {error}"));
        }
    }

    match spec.count.as_ref() {
        None => errors.push("Spec", count::InvalidCount::Missing),
        Some(count) => {
            if let Err(error) = count::validate(count) {
                errors.push("Spec", error);
            }
        }
    }

    if spec.duration().is_negative() {
        errors.push(
            "Spec",
            format_args!("duration must not be negative, got {}", spec.duration()),
        );
    }

    if spec.kinds().next().is_none() {
        errors.push("Spec", "at least one disruption kind must be specified");
    }
    for kind in spec.kinds() {
        errors.extend(kind.validate());
    }

    if let Some(triggers) = spec.triggers.as_ref() {
        for error in triggers.validate() {
            errors.push("Triggers", error);
        }
    }

    if let Some(pulse) = spec.pulse.as_ref() {
        for (field, d) in [
            ("activeDuration", pulse.active_duration),
            ("dormantDuration", pulse.dormant_duration),
        ] {
            if d < MIN_PULSE_DURATION {
                errors.push(
                    "Pulse",
                    format_args!("pulse {field} of {d} should be at least {MIN_PULSE_DURATION}"),
                );
            }
        }
        if let Some(delay) = pulse.initial_delay.filter(DisruptionDuration::is_negative) {
            errors.push(
                "Pulse",
                format_args!("pulse initialDelay must not be negative, got {delay}"),
            );
        }
        if spec.node_failure.is_some() {
            errors.push(
                "Pulse",
                "pulse is not compatible with node failure disruptions",
            );
        }
    }

    if let Some(unsafe_mode) = spec.unsafe_mode.as_ref() {
        for message in unsafe_mode.validate() {
            errors.push("Unsafemode", message);
        }
    }

    errors
}

/// Checks the fields that must not change once a disruption exists.
pub(crate) fn validate_update(old: &DisruptionSpec, new: &DisruptionSpec) -> Errors {
    let mut errors = Errors::default();

    if old.static_targeting != new.static_targeting {
        errors.push(
            "Spec",
            format_args!(
                "staticTargeting cannot be updated, it was {} and is now {}",
                old.static_targeting, new.static_targeting
            ),
        );
    } else if new.static_targeting && old.count != new.count {
        errors.push(
            "Spec",
            "count cannot be updated when staticTargeting is enabled",
        );
    }

    errors
}

fn validate_expression(expr: &Expression) -> anyhow::Result<()> {
    validate_label_key(&expr.key)?;
    expr.validate()?;
    for value in &expr.values {
        validate_label_value(value)?;
    }
    Ok(())
}

/// Validates a label key as `[prefix/]name`.
fn validate_label_key(key: &str) -> anyhow::Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        let regex = Regex::new(DNS_SUBDOMAIN_REGEX).expect("should compile");
        anyhow::ensure!(
            !prefix.is_empty() && prefix.len() <= MAX_LABEL_PREFIX_LEN && regex.is_match(prefix),
            "invalid label key {key:?}: prefix must be a DNS subdomain"
        );
    }

    let regex = Regex::new(LABEL_NAME_REGEX).expect("should compile");
    anyhow::ensure!(
        name.len() <= MAX_LABEL_NAME_LEN && regex.is_match(name),
        "invalid label key {key:?}: name must consist of at most {MAX_LABEL_NAME_LEN} \
         alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character"
    );

    Ok(())
}

/// Validates a label value: empty, or a label name.
fn validate_label_value(value: &str) -> anyhow::Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let regex = Regex::new(LABEL_NAME_REGEX).expect("should compile");
    anyhow::ensure!(
        value.len() <= MAX_LABEL_NAME_LEN && regex.is_match(value),
        "invalid label value {value:?}: must consist of at most {MAX_LABEL_NAME_LEN} \
         alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character"
    );
    Ok(())
}

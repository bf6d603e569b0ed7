//! The disruption orchestration engine: which targets are disrupted, how
//! many, when, and when a disruption is over.
//!
//! Nothing in this crate talks to the Kubernetes API; callers feed it
//! observations and persist its results.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod args;
pub mod count;
pub mod duration;
pub mod injection;
pub mod targets;
pub mod termination;
pub mod triggers;

pub use self::{
    args::{DisruptionArgs, DisruptionLevel, PulseArgs},
    count::{Count, InvalidCount},
    duration::DisruptionDuration,
    injection::{
        should_skip_node_failure_injection, DisruptionInjectionStatus, DisruptionKindName,
        TargetInjection, TargetInjectionStatus, TargetInjectorMap, NON_REINJECTABLE,
        NO_SIDE_EFFECT,
    },
    targets::{TargetInjections, TargetSelector},
    termination::{Lifetime, TerminationStatus},
    triggers::{time_to_create_pods, time_to_inject, DisruptionTrigger, DisruptionTriggers},
};

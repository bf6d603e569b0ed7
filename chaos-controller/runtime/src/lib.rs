#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use chaos_controller_core as core;
pub use chaos_controller_k8s_api as k8s;

mod admission;
mod args;
pub mod config;
mod metrics;
pub mod safety_net;
mod validation;

pub use self::{
    admission::Admission,
    args::Args,
    config::{Config, SafeMode},
    metrics::AdmissionMetrics,
};

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod disruption;
pub mod errors;
pub mod kinds;
pub mod labels;
pub mod unsafemode;

pub use self::{
    disruption::{Disruption, DisruptionPulse, DisruptionSpec, DisruptionStatus},
    errors::Errors,
    kinds::KindSpec,
    unsafemode::UnsafemodeSpec,
};
pub use chaos_controller_core as core;
pub use k8s_openapi::api::{
    self,
    core::v1::{Namespace, Node, Pod, PodSpec, PodStatus},
};
pub use kube::{
    api::{Api, ListParams, ObjectList, ObjectMeta, ResourceExt},
    Client, Resource,
};

//! Runs disruptions inside injector pods.
//!
//! A supervisor spawns one detached child per target container, keeps each
//! child alive with heartbeats, and tears every child down on shutdown.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
pub mod background;
pub mod process;
pub mod watchdog;

pub use self::{
    args::Args,
    background::{BackgroundProcess, BackgroundProcessManager, Timings},
    process::{Manager, ProcessManager},
    watchdog::{Expiry, Watchdog},
};

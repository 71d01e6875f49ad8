//! The `leapfrog_core` crate advances the components of a cosmological
//! simulation through cosmic time with a kick-drift-kick leapfrog.
//!
//! Key components:
//! - **Integrals**: `IntegralCache`, time-step integrals of every integrand, per rung.
//! - **Limiter**: the largest base step the physical time scales allow.
//! - **Integrator**: long-range kicks, and short-range kicks on rungs intertwined with drifts.
//! - **Time loop**: adaptive base steps synchronized at outputs, with autosaves.
//! - **Collaborators**: `Background`, `Component`, `Interaction`, `OutputSink` and
//!   `Communicator` traits, with single-process reference implementations.
pub mod autosave;
pub mod background;
pub mod comm;
pub mod component;
pub mod config;
pub mod error;
pub mod gravity;
pub mod integrals;
pub mod integrator;
pub mod interactions;
pub mod limiter;
pub mod output;
pub mod particles;
pub mod solvers;
pub mod time;
pub mod timeloop;
pub mod traits;

#[cfg(test)]
mod testing;

pub use error::SchedulerError;
pub use integrator::{Integrator, StepType};
pub use timeloop::{RunSummary, TimeLoop};

//! Fatal conditions raised by the scheduler.

use thiserror::Error;

use crate::interactions::{Force, Method};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unregistered force \"{force}\" with method \"{method}\"")]
    UnregisteredForce { force: Force, method: Method },

    #[error("Failed to detect any lapse component, but the lapse force is assigned to {component}")]
    MissingLapseComponent { component: String },

    #[error(
        "Due to {bottleneck}, the time step size needs to be rescaled by a factor {ratio:.1e}. \
         This extreme change is unacceptable."
    )]
    ExtremeRescale { bottleneck: String, ratio: f64 },

    #[error(
        "Time evolution effectively halted with a time step size of {dt} {unit} \
         (at the start of the simulation the time step size was {dt_begin} {unit})"
    )]
    StepCollapse { dt: f64, dt_begin: f64, unit: String },

    #[error(
        "Cannot produce a {kind} at {param} = {value:.6}, \
         as the simulation starts at {param} = {begin:.6}."
    )]
    OutputBeforeStart {
        kind: String,
        param: String,
        value: f64,
        begin: f64,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

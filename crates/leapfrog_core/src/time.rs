use std::fmt;

use serde::{Deserialize, Serialize};

use crate::background::Background;

/// Which time coordinate an output time is specified in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeParam {
    #[serde(rename = "a")]
    A,
    #[serde(rename = "t")]
    T,
}

impl fmt::Display for TimeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeParam::A => "a",
            TimeParam::T => "t",
        })
    }
}

/// The present cosmic time of a run. The scale factor is always derived from
/// `t` through the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosmicTime {
    t: f64,
    a: f64,
    /// Index of the current base step.
    pub time_step: usize,
}

impl CosmicTime {
    pub fn new(t: f64, time_step: usize, background: &dyn Background) -> Self {
        Self {
            t,
            a: background.scale_factor(t),
            time_step,
        }
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn set_time(&mut self, t: f64, background: &dyn Background) {
        self.t = t;
        self.a = background.scale_factor(t);
    }

    pub fn value(&self, param: TimeParam) -> f64 {
        match param {
            TimeParam::A => self.a,
            TimeParam::T => self.t,
        }
    }
}

/// A requested output instant, known in both coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DumpTime {
    pub time_param: TimeParam,
    pub t: f64,
    pub a: f64,
}

impl DumpTime {
    /// The value of the coordinate the dump was requested in.
    pub fn value(&self) -> f64 {
        match self.time_param {
            TimeParam::A => self.a,
            TimeParam::T => self.t,
        }
    }
}

/// Pushes `t` forward to `sync_time` when it would otherwise land within
/// `reltol·Δt + 2ε` of it or beyond.
pub fn clamp_to_sync(t: f64, sync_time: Option<f64>, dt: f64, reltol: f64) -> f64 {
    match sync_time {
        Some(sync) if t + reltol * dt + 2.0 * f64::EPSILON > sync => sync,
        _ => t,
    }
}

//! Run settings, deserialized from JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::autosave::AutosaveRecord;
use crate::error::SchedulerError;
use crate::output::OutputKind;
use crate::time::TimeParam;

/// Factors steering the adaptation of the base step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSizeSettings {
    /// Fraction of the largest allowed step used for the first step.
    pub initial_fac: f64,
    /// Fraction of the largest allowed step used after a reduction.
    pub reduce_fac: f64,
    /// Fraction of the largest allowed step aimed for when growing.
    pub increase_fac: f64,
    /// Largest relative growth after a full period of unchanged steps.
    pub period_increase_max_fac: f64,
    /// Smallest relative growth worth a synchronization.
    pub period_increase_min_fac: f64,
    pub ratio_warn: f64,
    pub ratio_abort: f64,
    /// Rung jump hysteresis, below unity.
    pub jump_fac: f64,
    /// Tolerance, relative to the step size, for landing on a sync time.
    pub reltol: f64,
    /// Number of base steps before the step size may grow.
    pub period: usize,
    /// Smallest allowed step size relative to the first one.
    pub min_fac: f64,
}

impl Default for StepSizeSettings {
    fn default() -> Self {
        Self {
            initial_fac: 0.9,
            reduce_fac: 0.94,
            increase_fac: 0.96,
            period_increase_max_fac: 0.33,
            period_increase_min_fac: 0.01,
            ratio_warn: 0.7,
            ratio_abort: 0.01,
            jump_fac: 0.95,
            reltol: 1e-9,
            period: 8,
            min_fac: 1e-4,
        }
    }
}

/// Fractions of the physical time scales a base step may span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterFactors {
    pub dynamical: f64,
    pub hubble: f64,
    pub w_dot: f64,
    pub decay: f64,
    pub courant: f64,
    pub pm: f64,
    pub p3m: f64,
    /// Displacement, in units of the softening length, allowed per rung sub-step.
    pub softening: f64,
}

impl Default for LimiterFactors {
    fn default() -> Self {
        Self {
            dynamical: 0.057,
            hubble: 0.16,
            w_dot: 0.0017,
            decay: 0.0028,
            courant: 0.21,
            pm: 0.13,
            p3m: 0.14,
            softening: 0.025,
        }
    }
}

impl LimiterFactors {
    /// Applies the user scalings of the background limiters, the non-linear
    /// limiters and the rung criterion.
    pub fn scaled(&self, background: f64, nonlinear: f64, rung: f64) -> Self {
        Self {
            dynamical: self.dynamical * background,
            hubble: self.hubble * background,
            w_dot: self.w_dot * background,
            decay: self.decay * background,
            courant: self.courant * nonlinear,
            pm: self.pm * nonlinear,
            p3m: self.p3m * nonlinear,
            softening: self.softening * rung,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterScale {
    pub background: f64,
    pub nonlinear: f64,
    pub rung: f64,
}

impl Default for LimiterScale {
    fn default() -> Self {
        Self {
            background: 1.0,
            nonlinear: 1.0,
            rung: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalSettings {
    pub boxsize: f64,
    pub g_newton: f64,
    pub light_speed: f64,
    /// Long/short range force split scale of gravity.
    pub gravity_shortrange_scale: f64,
    /// Unit used when reporting times.
    pub unit_time: String,
}

impl Default for PhysicalSettings {
    fn default() -> Self {
        Self {
            boxsize: 1.0,
            g_newton: 1.0,
            light_speed: 1.0,
            gravity_shortrange_scale: 1.25 / 64.0,
            unit_time: "Gyr".to_string(),
        }
    }
}

/// Output times per kind, for each time coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputTimes {
    pub a: BTreeMap<OutputKind, Vec<f64>>,
    pub t: BTreeMap<OutputKind, Vec<f64>>,
}

impl OutputTimes {
    pub fn get(&self, param: TimeParam) -> &BTreeMap<OutputKind, Vec<f64>> {
        match param {
            TimeParam::A => &self.a,
            TimeParam::T => &self.t,
        }
    }

    pub fn get_mut(&mut self, param: TimeParam) -> &mut BTreeMap<OutputKind, Vec<f64>> {
        match param {
            TimeParam::A => &mut self.a,
            TimeParam::T => &mut self.t,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.a.values().chain(self.t.values()).all(Vec::is_empty)
    }

    /// Whether an output of `kind` is requested at exactly `value`.
    pub fn contains(&self, param: TimeParam, kind: OutputKind, value: f64) -> bool {
        self.get(param)
            .get(&kind)
            .is_some_and(|times| times.contains(&value))
    }

    /// The times not before the present `a` and `t`.
    pub fn remaining(&self, a: f64, t: f64) -> Self {
        fn keep(
            times: &BTreeMap<OutputKind, Vec<f64>>,
            now: f64,
        ) -> BTreeMap<OutputKind, Vec<f64>> {
            times
                .iter()
                .map(|(&kind, values)| {
                    (kind, values.iter().copied().filter(|&v| v >= now).collect())
                })
                .collect()
        }
        Self {
            a: keep(&self.a, a),
            t: keep(&self.t, t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output times still to be produced.
    pub times: OutputTimes,
    /// All output times of the run, restarts included. Filenames are derived
    /// from these. Falls back to `times` when empty.
    pub original_times: OutputTimes,
    pub dirs: BTreeMap<OutputKind, PathBuf>,
    pub bases: BTreeMap<OutputKind, String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        let dirs = OutputKind::ALL
            .iter()
            .map(|&kind| (kind, PathBuf::from("output")))
            .collect();
        let bases = OutputKind::ALL
            .iter()
            .map(|&kind| (kind, kind.to_string()))
            .collect();
        Self {
            times: OutputTimes::default(),
            original_times: OutputTimes::default(),
            dirs,
            bases,
        }
    }
}

impl OutputSettings {
    pub fn original_times(&self) -> &OutputTimes {
        if self.original_times.is_empty() {
            &self.times
        } else {
            &self.original_times
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveSettings {
    /// Wall-clock seconds between autosaves; 0 disables autosaving.
    pub interval_secs: f64,
    pub dir: PathBuf,
    /// Directory receiving the parameter record.
    pub params_dir: PathBuf,
    pub job_id: String,
    /// Secondary location both autosave files are copied to.
    pub mirror_dir: Option<PathBuf>,
    /// Parameter file the run was started from.
    pub params_path: Option<PathBuf>,
    /// Checkpoint the run was started from.
    pub initial_conditions: Option<PathBuf>,
    pub checkpoint_extension: String,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            interval_secs: 0.0,
            dir: PathBuf::from("ic"),
            params_dir: PathBuf::from("params"),
            job_id: "0".to_string(),
            mirror_dir: None,
            params_path: None,
            initial_conditions: None,
            checkpoint_extension: "hdf5".to_string(),
        }
    }
}

/// Step sizes restored from an autosave.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestartState {
    pub dt: f64,
    pub dt_begin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub step: StepSizeSettings,
    pub limiter: LimiterFactors,
    pub limiter_scale: LimiterScale,
    pub physics: PhysicalSettings,
    pub output: OutputSettings,
    pub autosave: AutosaveSettings,
    pub n_rungs: usize,
    /// Index of the first base step.
    pub initial_time_step: usize,
    /// Starting scale factor, used when the background expands.
    pub a_begin: Option<f64>,
    /// Starting cosmic time, used otherwise.
    pub t_begin: f64,
    pub restart: Option<RestartState>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            step: StepSizeSettings::default(),
            limiter: LimiterFactors::default(),
            limiter_scale: LimiterScale::default(),
            physics: PhysicalSettings::default(),
            output: OutputSettings::default(),
            autosave: AutosaveSettings::default(),
            n_rungs: 8,
            initial_time_step: 0,
            a_begin: None,
            t_begin: 0.0,
            restart: None,
        }
    }
}

/// Rungs beyond this would overflow the half sub-step indices.
const MAX_RUNGS: usize = 30;

impl RunSettings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(text).context("Failed to parse run settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run settings from {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Limiter factors with the user scalings applied.
    pub fn limiter_factors(&self) -> LimiterFactors {
        self.limiter.scaled(
            self.limiter_scale.background,
            self.limiter_scale.nonlinear,
            self.limiter_scale.rung,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> Result<()> {
            Err(SchedulerError::InvalidSetting(message).into())
        };
        if self.n_rungs == 0 || self.n_rungs > MAX_RUNGS {
            return invalid(format!(
                "n_rungs must lie in 1..={MAX_RUNGS}, got {}",
                self.n_rungs
            ));
        }
        let step = &self.step;
        for (name, value) in [
            ("initial_fac", step.initial_fac),
            ("reduce_fac", step.reduce_fac),
            ("increase_fac", step.increase_fac),
            ("min_fac", step.min_fac),
        ] {
            if !(value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if !(step.jump_fac > 0.0 && step.jump_fac <= 1.0) {
            return invalid(format!("jump_fac must lie in (0, 1], got {}", step.jump_fac));
        }
        if step.reltol < 0.0 {
            return invalid(format!("reltol must not be negative, got {}", step.reltol));
        }
        if step.period == 0 {
            return invalid("period must be at least one base step".to_string());
        }
        if step.ratio_abort > step.ratio_warn {
            return invalid(format!(
                "ratio_abort ({}) exceeds ratio_warn ({})",
                step.ratio_abort, step.ratio_warn
            ));
        }
        if !(self.physics.boxsize > 0.0) {
            return invalid(format!("boxsize must be positive, got {}", self.physics.boxsize));
        }
        if let Some(restart) = self.restart {
            if !(restart.dt > 0.0 && restart.dt_begin > 0.0) {
                return invalid(format!(
                    "restart step sizes must be positive, got {} and {}",
                    restart.dt, restart.dt_begin
                ));
            }
        }
        Ok(())
    }

    /// Continues the run recorded by an autosave.
    pub fn resume_from(&mut self, record: &AutosaveRecord) {
        self.restart = Some(RestartState {
            dt: record.dt_autosave,
            dt_begin: record.dt_begin_autosave,
        });
        self.initial_time_step = record.initial_time_step;
        if let Some(a) = record.a_begin {
            self.a_begin = Some(a);
        }
        if let Some(t) = record.t_begin {
            self.t_begin = t;
        }
        self.output.original_times = record.original_output_times.clone();
        self.output.times = record.output_times.clone();
        self.autosave.initial_conditions = Some(record.initial_conditions.clone());
    }
}

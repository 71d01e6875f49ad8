//! The main loop: base steps of adaptive size, synchronized at every output.
//!
//! Each stretch between synchronizations opens with an init step (half kicks
//! only) and continues with full steps in which the drifts run half a step
//! behind the kicks. The base step size only changes at synchronizations,
//! which happen at output times, when the step has become too large, and
//! periodically when it may grow.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::autosave::{AutosavePoint, Autosaver};
use crate::background::Background;
use crate::comm::Communicator;
use crate::component::{Component, FluidVariable};
use crate::config::{LimiterFactors, RunSettings};
use crate::error::SchedulerError;
use crate::integrator::{Integrator, StepType};
use crate::interactions::InteractionRegistry;
use crate::limiter::{base_step_limit, StepLimit};
use crate::output::{dump, prepare_for_output, OutputFilenames, OutputSink};
use crate::time::{CosmicTime, DumpTime, TimeParam};

/// Where a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub time_step: usize,
    pub t: f64,
    /// Base step size at the end of the run.
    pub dt: f64,
    pub dt_begin: f64,
}

pub struct TimeLoop {
    integrator: Integrator,
    settings: RunSettings,
    factors: LimiterFactors,
    sink: Box<dyn OutputSink>,
    autosaver: Autosaver,
}

impl TimeLoop {
    /// Sets up a run starting at `a_begin` when the background expands and
    /// at `t_begin` otherwise.
    pub fn new(
        settings: RunSettings,
        components: Vec<Box<dyn Component>>,
        background: Box<dyn Background>,
        registry: InteractionRegistry,
        comm: Box<dyn Communicator>,
        sink: Box<dyn OutputSink>,
    ) -> Result<Self> {
        settings.validate()?;
        registry.validate(&components)?;
        let factors = settings.limiter_factors();
        let t_begin = match settings.a_begin {
            Some(a) if background.hubble_enabled() => background.cosmic_time(a),
            _ => settings.t_begin,
        };
        let mut integrator = Integrator::new(
            components,
            background,
            registry,
            comm,
            settings.n_rungs,
            factors.softening,
        );
        integrator.time = CosmicTime::new(
            t_begin,
            settings.initial_time_step,
            integrator.background.as_ref(),
        );
        let autosaver = Autosaver::new(settings.autosave.clone());
        Ok(Self {
            integrator,
            settings,
            factors,
            sink,
            autosaver,
        })
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn into_integrator(self) -> Integrator {
        self.integrator
    }

    fn step_limit(&self) -> Result<StepLimit> {
        base_step_limit(
            &self.integrator.components,
            self.integrator.time.a(),
            self.integrator.background.as_ref(),
            &self.settings.physics,
            &self.factors,
        )
    }

    fn summary(&self, dt: f64, dt_begin: f64) -> RunSummary {
        RunSummary {
            time_step: self.integrator.time.time_step,
            t: self.integrator.time.t(),
            dt,
            dt_begin,
        }
    }

    /// Whether the run starts exactly at `dump_time`.
    fn starts_at(&self, dump_time: &DumpTime) -> bool {
        let time = &self.integrator.time;
        match dump_time.time_param {
            TimeParam::T => dump_time.t == time.t(),
            TimeParam::A => {
                self.integrator.background.hubble_enabled() && dump_time.a == time.a()
            }
        }
    }

    fn dump(&mut self, filenames: &OutputFilenames, dump_time: &DumpTime) -> Result<()> {
        dump(
            self.sink.as_mut(),
            &self.integrator.components,
            filenames,
            &self.settings.output.times,
            dump_time,
            &self.settings.physics.unit_time,
        )
    }

    fn autosave(&mut self, dt: f64, dt_begin: f64) -> Result<()> {
        let point = AutosavePoint {
            time: &self.integrator.time,
            hubble_enabled: self.integrator.background.hubble_enabled(),
            dt,
            dt_begin,
            original_times: self.settings.output.original_times(),
            times: &self.settings.output.times,
        };
        self.autosaver.autosave(
            self.sink.as_mut(),
            &self.integrator.components,
            self.integrator.comm.as_ref(),
            point,
        )
    }

    fn heading(&self, time_step: usize, dt: f64, bottleneck: &str) {
        // Collective, so every process takes part before the master logs.
        let populations = self.integrator.rung_populations();
        if !self.integrator.comm.is_master() {
            return;
        }
        let time = &self.integrator.time;
        let a = self
            .integrator
            .background
            .hubble_enabled()
            .then(|| time.a());
        let w: Vec<String> = self
            .integrator
            .components
            .iter()
            .filter(|c| c.w_varies())
            .map(|c| format!("{}: {:.6}", c.name(), c.w(time.a())))
            .collect();
        let rungs: Vec<String> = populations
            .iter()
            .map(|(name, counts)| format!("{name}: {counts:?}"))
            .collect();
        info!(
            time_step,
            a = ?a,
            t = time.t(),
            unit = %self.settings.physics.unit_time,
            dt,
            bottleneck,
            w = %w.join(", "),
            rungs = %rungs.join(", "),
            "Time step"
        );
    }

    /// Reports how unevenly the short-range interactions of the past step
    /// were spread over the processes.
    fn footer(&mut self) {
        let elapsed = self.integrator.take_short_range_seconds();
        let comm = self.integrator.comm.as_ref();
        let Some(imbalance) = load_imbalance(elapsed, comm) else {
            return;
        };
        if comm.is_master() {
            info!(imbalance, "Load imbalance: {:.1}%", 100.0 * imbalance);
        }
    }

    fn finish(&mut self, dt: f64, dt_begin: f64) -> Result<RunSummary> {
        let summary = self.summary(dt, dt_begin);
        if self.integrator.comm.is_master() {
            info!(
                time_step = summary.time_step,
                t = summary.t,
                dt,
                "End of main time loop"
            );
        }
        self.autosaver
            .remove_checkpoint(self.integrator.comm.as_ref())?;
        Ok(summary)
    }

    /// Runs until every output has been written.
    pub fn run(&mut self) -> Result<RunSummary> {
        let step = self.settings.step;
        if self.settings.output.times.is_empty() {
            info!("No output times requested");
            return Ok(self.summary(0.0, 0.0));
        }
        let (mut dump_times, filenames) = prepare_for_output(
            &self.settings.output,
            &self.integrator.time,
            self.integrator.background.as_ref(),
            self.integrator.comm.as_ref(),
        )?;

        let a = self.integrator.time.a();
        for component in &mut self.integrator.components {
            for variable in FluidVariable::ALL {
                component
                    .realize_if_linear(variable, Some(a), None)
                    .with_context(|| {
                        format!("Failed to realize {variable:?} of {}", component.name())
                    })?;
            }
        }

        if let Some(first) = dump_times.first().copied() {
            if self.starts_at(&first) {
                self.dump(&filenames, &first)?;
                dump_times.remove(0);
            }
        }
        let (Some(&first), Some(&last)) = (dump_times.first(), dump_times.last()) else {
            return self.finish(0.0, 0.0);
        };

        let t = self.integrator.time.t();
        let mut dt_max = f64::INFINITY;
        let mut bottleneck = String::new();
        let (mut dt, dt_begin) = match self.settings.restart {
            Some(restart) => (restart.dt, restart.dt_begin),
            None => {
                let limit = self.step_limit()?;
                dt_max = limit.dt;
                bottleneck = limit.describe();
                let dt_begin = (step.initial_fac * dt_max)
                    .min((last.t - t) / step.period as f64)
                    .min((first.t - t) / 1.5);
                (dt_begin, dt_begin)
            }
        };
        let dt_min = step.min_fac * dt_begin;

        self.integrator.populate_integrals();
        if self.integrator.any_rungs() {
            info!("Determining initial rung population");
            self.integrator.count_rungs();
            self.integrator.kick_short(dt, true)?;
        }

        info!("Beginning of main time loop");
        let mut time_step = self.settings.initial_time_step;
        let mut previous: Option<usize> = None;
        let mut step_type = StepType::Init;
        let mut sync_time: Option<f64> = None;
        let mut last_sync = 0;
        let mut recompute_dt_max = true;
        let mut dt_backup: Option<f64> = None;
        for (dump_index, dump_time) in dump_times.iter().enumerate() {
            loop {
                if previous.map_or(true, |p| time_step > p) {
                    previous = Some(time_step);
                    if time_step > self.settings.initial_time_step {
                        self.footer();
                    }
                    self.integrator.time.time_step = time_step;
                    let shown = match step_type {
                        StepType::Init => bottleneck.as_str(),
                        StepType::Full => "",
                    };
                    self.heading(time_step, dt, shown);
                }

                if step_type == StepType::Init {
                    step_type = StepType::Full;
                    self.integrator
                        .kick_long(dt, sync_time, StepType::Init, step.reltol)?;
                    self.integrator.assign_rungs(dt);
                    self.integrator.kick_short(dt, false)?;
                    let t = self.integrator.time.t();
                    if dump_time.t - t <= 1.5 * dt {
                        sync_time = Some(dump_time.t);
                        continue;
                    }
                    let limit = self.step_limit()?;
                    dt_max = limit.dt;
                    bottleneck = limit.describe();
                    if dt > dt_max {
                        sync_time = Some(t + 0.5 * dt);
                        recompute_dt_max = false;
                    }
                    continue;
                }

                self.integrator.drift_fluids(dt, sync_time, step.reltol)?;
                self.integrator
                    .drift_kick_short(dt, sync_time, step.jump_fac, step.reltol)?;
                self.integrator
                    .advance(0.5 * dt, sync_time, dt, step.reltol);
                self.integrator
                    .kick_long(dt, sync_time, StepType::Full, step.reltol)?;
                self.integrator
                    .advance(0.5 * dt, sync_time, dt, step.reltol);
                let t = self.integrator.time.t();

                if sync_time == Some(t) {
                    step_type = StepType::Init;
                    sync_time = None;
                    if let Some(backup) = dt_backup.take() {
                        dt = dt.max(backup);
                    }
                    if recompute_dt_max {
                        let limit = self.step_limit()?;
                        dt_max = limit.dt;
                        bottleneck = limit.describe();
                    }
                    recompute_dt_max = true;
                    if dt > dt_max {
                        let dt_new = step.reduce_fac * dt_max;
                        let ratio = dt_new / dt;
                        if ratio < step.ratio_abort {
                            return Err(SchedulerError::ExtremeRescale { bottleneck, ratio }.into());
                        } else if ratio < step.ratio_warn {
                            warn!(
                                "Rescaling time step size by a factor {ratio:.1e} \
                                 due to {bottleneck}"
                            );
                        }
                        if dt_new < dt_min {
                            return Err(SchedulerError::StepCollapse {
                                dt: dt_new,
                                dt_begin,
                                unit: self.settings.physics.unit_time.clone(),
                            }
                            .into());
                        }
                        dt = dt_new;
                    } else {
                        bottleneck.clear();
                        let period_frac = ((time_step + 1).saturating_sub(last_sync) as f64
                            / step.period as f64)
                            .clamp(0.0, 1.0);
                        dt = (step.increase_fac * dt_max)
                            .max(dt)
                            .min((1.0 + period_frac * step.period_increase_max_fac) * dt);
                    }
                    time_step += 1;
                    last_sync = time_step;
                    self.integrator.time.time_step = time_step;

                    if self.autosaver.due(self.integrator.comm.as_ref()) {
                        self.autosave(dt, dt_begin)?;
                    }

                    if t == dump_time.t {
                        self.dump(&filenames, dump_time)?;
                        if let Some(next) = dump_times.get(dump_index + 1) {
                            dt_max = (next.t - t) / 1.5;
                            if dt > dt_max {
                                dt_backup = Some(dt);
                                dt = dt_max;
                            }
                        }
                        break;
                    }
                    dt_max = (dump_time.t - t) / 1.5;
                    if dt > dt_max {
                        dt_backup = Some(dt);
                        dt = dt_max;
                    }
                    continue;
                }

                if dump_time.t - t <= 1.5 * dt {
                    sync_time = Some(dump_time.t);
                    continue;
                }
                let limit = self.step_limit()?;
                dt_max = limit.dt;
                bottleneck = limit.describe();
                if dt > dt_max {
                    sync_time = Some(t + 0.5 * dt);
                    recompute_dt_max = false;
                    continue;
                }
                if dt_max > (1.0 + step.period_increase_min_fac) * dt
                    && (time_step + 1).saturating_sub(last_sync) >= step.period
                {
                    sync_time = Some(t + 0.5 * dt);
                    recompute_dt_max = false;
                    continue;
                }
                time_step += 1;
            }
        }
        self.finish(dt, dt_begin)
    }
}

/// Time of the slowest process relative to the mean, minus one. `None` for a
/// single process or when no process spent any time.
fn load_imbalance(elapsed: f64, comm: &dyn Communicator) -> Option<f64> {
    if comm.size() < 2 {
        return None;
    }
    let total = comm.allreduce_sum_f64(elapsed);
    if total <= 0.0 {
        return None;
    }
    let slowest = comm.allreduce_max_f64(elapsed);
    Some(slowest / (total / comm.size() as f64) - 1.0)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use nalgebra::Vector3;

    use super::*;
    use crate::background::StaticBackground;
    use crate::comm::SingleProcess;
    use crate::config::RestartState;
    use crate::gravity::PairwiseGravity;
    use crate::interactions::{Force, Method};
    use crate::output::OutputKind;
    use crate::particles::ParticleEnsemble;
    use crate::testing::{
        assert_err_contains, count, Log, MockComponent, RecordingOutput, WarningLog,
    };

    fn settings(dir: &Path, snapshots: &[f64]) -> RunSettings {
        let mut settings = RunSettings::default();
        if !snapshots.is_empty() {
            settings
                .output
                .times
                .t
                .insert(OutputKind::Snapshot, snapshots.to_vec());
        }
        for kind in OutputKind::ALL {
            settings.output.dirs.insert(kind, dir.join("output"));
        }
        settings.autosave.dir = dir.join("ic");
        settings.autosave.params_dir = dir.join("params");
        settings
    }

    fn restart(settings: &mut RunSettings, dt: f64) {
        settings.restart = Some(RestartState { dt, dt_begin: dt });
    }

    fn entries(log: &Log, prefix: &str) -> Vec<String> {
        log.borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn fluid_loop(settings: RunSettings, fluid: MockComponent, sink: RecordingOutput) -> TimeLoop {
        TimeLoop::new(
            settings,
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(sink),
        )
        .expect("valid setup")
    }

    #[test]
    fn nothing_happens_without_output_times() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fluid = MockComponent::fluid("gas");
        let log = fluid.log();
        let mut time_loop = TimeLoop::new(
            settings(dir.path(), &[]),
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(RecordingOutput::default()),
        )
        .expect("valid setup");

        let summary = time_loop.run().expect("run");

        assert_eq!(summary.time_step, 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn fixed_steps_reach_the_dump_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings(dir.path(), &[5.0]);
        restart(&mut settings, 1.0);
        let fluid = MockComponent::fluid("gas");
        let log = fluid.log();
        let sink = RecordingOutput::default();
        let written = sink.written();
        let mut time_loop = TimeLoop::new(
            settings,
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(sink),
        )
        .expect("valid setup");

        let summary = time_loop.run().expect("run");

        assert_eq!(summary.t, 5.0);
        // The step that schedules the synchronization is not counted.
        assert_eq!(summary.time_step, 4);
        assert_eq!(count(&log, "assign_rungs"), 1);
        assert_eq!(count(&log, "drift 1"), 5);
        assert_eq!(count(&log, "drift"), 5);
        // Long-range kicks only realize the density and pressure trace.
        assert_eq!(count(&log, "realize Shear"), 1);
        let written = written.borrow();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, Some(OutputKind::Snapshot));
        assert!(written[0].1.ends_with("snapshot_t=5Gyr"));
        assert!(written[0].1.is_file());
    }

    #[test]
    fn dump_at_the_start_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fluid = MockComponent::fluid("gas");
        let log = fluid.log();
        let sink = RecordingOutput::default();
        let written = sink.written();
        let mut time_loop = TimeLoop::new(
            settings(dir.path(), &[0.0]),
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(sink),
        )
        .expect("valid setup");

        let summary = time_loop.run().expect("run");

        assert_eq!(summary.t, 0.0);
        assert_eq!(written.borrow().len(), 1);
        assert_eq!(count(&log, "drift"), 0);
    }

    #[test]
    fn first_step_fits_period_and_first_dump() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fluid = MockComponent::fluid("gas");
        let sink = RecordingOutput::default();
        let written = sink.written();
        let mut time_loop = TimeLoop::new(
            settings(dir.path(), &[3.0, 16.0]),
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(sink),
        )
        .expect("valid setup");

        let summary = time_loop.run().expect("run");

        assert_eq!(summary.dt_begin, 2.0);
        assert_eq!(summary.t, 16.0);
        assert_eq!(written.borrow().len(), 2);
    }

    #[test]
    fn computed_first_step_runs_one_init_step_then_full_steps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fluid = MockComponent::fluid("gas");
        let log = fluid.log();
        let sink = RecordingOutput::default();
        let written = sink.written();
        let mut time_loop = fluid_loop(settings(dir.path(), &[4.0]), fluid, sink);

        let summary = time_loop.run().expect("run");

        // The period bound 4/8 is tighter than the first-dump bound 4/1.5.
        assert_eq!(summary.dt_begin, 0.5);
        assert_eq!(summary.t, 4.0);
        assert_eq!(summary.time_step, 7);
        assert_eq!(count(&log, "assign_rungs"), 1);
        assert_eq!(entries(&log, "drift"), vec!["drift 0.5"; 8]);
        let mut kicks = vec!["sources 0.25"];
        kicks.extend(["sources 0.5"; 7]);
        kicks.push("sources 0.25");
        assert_eq!(entries(&log, "sources"), kicks);
        assert_eq!(written.borrow().len(), 1);

        // Grown at the closing sync by the elapsed share of the period.
        let max_fac = RunSettings::default().step.period_increase_max_fac;
        assert!((summary.dt - 0.5 * (1.0 + 7.0 / 8.0 * max_fac)).abs() < 1e-12);
    }

    #[test]
    fn step_lowered_for_a_close_dump_is_restored_afterwards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings(dir.path(), &[4.0, 4.375, 8.0]);
        restart(&mut settings, 0.5);
        settings.step.period_increase_max_fac = 0.0;
        let fluid = MockComponent::fluid("gas");
        let log = fluid.log();
        let sink = RecordingOutput::default();
        let written = sink.written();
        let mut time_loop = fluid_loop(settings, fluid, sink);

        let summary = time_loop.run().expect("run");

        assert_eq!(summary.t, 8.0);
        assert_eq!(summary.dt, 0.5);
        assert_eq!(written.borrow().len(), 3);
        assert_eq!(count(&log, "assign_rungs"), 3);
        let mut drifts = vec!["drift 0.5"; 8];
        // Lowered to (4.375 - 4)/1.5 and clamped to the dump.
        drifts.extend(["drift 0.25", "drift 0.125"]);
        // Back to the original step size, clamped to the last dump.
        drifts.extend(["drift 0.5"; 7]);
        drifts.push("drift 0.125");
        assert_eq!(entries(&log, "drift"), drifts);
    }

    fn courant_limited(dir: &Path, ratio_abort: f64, min_fac: f64) -> TimeLoop {
        let mut settings = settings(dir, &[10.0]);
        restart(&mut settings, 1.0);
        settings.limiter.courant = 1.0;
        settings.step.ratio_abort = ratio_abort;
        settings.step.min_fac = min_fac;
        let fluid = MockComponent::fluid("gas").with_v_max(2.0).with_gridsize(1);
        TimeLoop::new(
            settings,
            vec![Box::new(fluid)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(RecordingOutput::default()),
        )
        .expect("valid setup")
    }

    #[test]
    fn extreme_rescaling_aborts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut time_loop = courant_limited(dir.path(), 0.5, 1e-4);
        assert_err_contains(time_loop.run(), "Courant condition for gas");
    }

    #[test]
    fn step_below_minimum_aborts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut time_loop = courant_limited(dir.path(), 0.01, 0.9);
        assert_err_contains(time_loop.run(), "effectively halted");
    }

    #[test]
    fn moderate_rescaling_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut time_loop = courant_limited(dir.path(), 0.01, 1e-4);
        let warnings = WarningLog::default();

        let summary =
            tracing::subscriber::with_default(warnings.clone(), || time_loop.run()).expect("run");

        assert_eq!(summary.t, 10.0);
        assert!(summary.dt <= 0.5);
        let messages = warnings.messages();
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].starts_with("Rescaling time step size by a factor 4.7e-1"));
        assert!(messages[0].ends_with("due to the Courant condition for gas"));
    }

    #[test]
    fn unregistered_forces_are_rejected_up_front() {
        let dir = tempfile::tempdir().expect("tempdir");
        let particles = MockComponent::particles("dm").with_force(Force::Gravity, Method::Pp);
        let result = TimeLoop::new(
            settings(dir.path(), &[1.0]),
            vec![Box::new(particles)],
            Box::new(StaticBackground),
            InteractionRegistry::new(),
            Box::new(SingleProcess),
            Box::new(RecordingOutput::default()),
        );
        assert_err_contains(result.map(|_| ()), "Unregistered force");
    }

    #[test]
    fn particle_pair_conserves_momentum() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings(dir.path(), &[2.0]);
        restart(&mut settings, 0.5);
        settings.n_rungs = 3;
        let mut particles = ParticleEnsemble::new("dm", 1.0, 10.0, 0.5, 3)
            .with_force(Force::Gravity, Method::Pp);
        particles.push(Vector3::new(4.0, 5.0, 5.0), Vector3::zeros());
        particles.push(Vector3::new(6.0, 5.0, 5.0), Vector3::zeros());
        let mut registry = InteractionRegistry::new();
        registry.register(Force::Gravity, Box::new(PairwiseGravity::new(1.0)));
        let mut time_loop = TimeLoop::new(
            settings,
            vec![Box::new(particles)],
            Box::new(StaticBackground),
            registry,
            Box::new(SingleProcess),
            Box::new(RecordingOutput::default()),
        )
        .expect("valid setup");

        time_loop.run().expect("run");

        let particles = time_loop.integrator().components()[0]
            .as_any()
            .downcast_ref::<ParticleEnsemble>()
            .expect("particles");
        let total: Vector3<f64> = particles.momenta().iter().sum();
        assert!(total.norm() < 1e-12, "{total}");
        assert!(particles.momenta()[0].x > 0.0);
        assert!(particles.positions()[0].x > 4.0);
        assert!(particles.positions()[1].x < 6.0);
    }

    /// Rank 0 among processes that spent the listed times.
    struct Spread(Vec<f64>);

    impl Communicator for Spread {
        fn rank(&self) -> usize {
            0
        }

        fn size(&self) -> usize {
            self.0.len()
        }

        fn allreduce_max(&self, value: usize) -> usize {
            value
        }

        fn allreduce_sum(&self, value: usize) -> usize {
            value
        }

        fn allreduce_max_f64(&self, _value: f64) -> f64 {
            self.0.iter().copied().fold(0.0, f64::max)
        }

        fn allreduce_sum_f64(&self, _value: f64) -> f64 {
            self.0.iter().sum()
        }

        fn allreduce_or(&self, value: bool) -> bool {
            value
        }

        fn allreduce_or_slice(&self, _values: &mut [bool]) {}

        fn broadcast_bool(&self, value: bool) -> bool {
            value
        }

        fn barrier(&self) {}
    }

    #[test]
    fn load_imbalance_compares_slowest_to_mean() {
        assert_eq!(load_imbalance(1.0, &Spread(vec![1.0, 2.0, 3.0])), Some(0.5));
        assert_eq!(load_imbalance(0.0, &Spread(vec![0.0, 0.0])), None);
        assert_eq!(load_imbalance(2.0, &SingleProcess), None);
    }
}

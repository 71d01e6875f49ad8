//! Long-range kicks and fluid drifts, each spanning a half or whole base step.

use anyhow::Result;
use tracing::debug;

use super::{Integrator, StepType};
use crate::component::{select, views, FluidVariable, Representation};
use crate::interactions::{KickIntegrals, Range};
use crate::time::clamp_to_sync;

impl Integrator {
    /// Kicks every component through internal source terms and long-range
    /// interactions, over `Δt/2` from the current time for [`StepType::Init`]
    /// and over `Δt` for [`StepType::Full`]. The end of the kick never passes
    /// `sync_time`.
    pub fn kick_long(
        &mut self,
        dt: f64,
        sync_time: Option<f64>,
        step: StepType,
        reltol: f64,
    ) -> Result<()> {
        let t_start = self.time.t();
        let span = match step {
            StepType::Init => dt / 2.0,
            StepType::Full => dt,
        };
        let t_end = clamp_to_sync(t_start + span, sync_time, dt, reltol);
        if t_end == t_start {
            debug!(t = t_start, "skipping zero-length long-range kick");
            return Ok(());
        }
        let all = self.all_indices();
        let selected = views(&self.components, &all);
        let integrals =
            self.cache
                .get_integrals(t_start, t_end, &selected, self.background.as_mut());
        drop(selected);
        let a_start = self.time.a();
        let a_end = self.background.scale_factor(t_end);

        for component in &mut self.components {
            component.realize_if_linear(FluidVariable::Density, Some(a_start), Some(a_end))?;
            component.realize_if_linear(
                FluidVariable::PressureTrace,
                Some(a_start),
                Some(a_end),
            )?;
        }
        for component in &mut self.components {
            component.apply_internal_sources(integrals, a_end)?;
        }

        let plans = self.registry.find(&self.components, &all, Range::Long);
        self.registry.apply_all(
            &plans,
            &mut self.components,
            KickIntegrals::Scalar(integrals),
            Range::Long,
            true,
        )
    }

    /// Drifts the fluid components over `Δt`, clamped to `sync_time`.
    pub fn drift_fluids(&mut self, dt: f64, sync_time: Option<f64>, reltol: f64) -> Result<()> {
        let fluids = select(&self.components, Representation::Fluid);
        if fluids.is_empty() {
            return Ok(());
        }
        let t_start = self.time.t();
        let t_end = clamp_to_sync(t_start + dt, sync_time, dt, reltol);
        if t_end == t_start {
            return Ok(());
        }
        let selected = views(&self.components, &fluids);
        let integrals =
            self.cache
                .get_integrals(t_start, t_end, &selected, self.background.as_mut());
        drop(selected);
        let a_end = self.background.scale_factor(t_end);
        for &index in &fluids {
            self.components[index].drift(integrals, Some(a_end))?;
        }
        Ok(())
    }
}

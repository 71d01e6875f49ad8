//! The contract between the scheduler and the simulated components.

use std::any::Any;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::integrals::{Integrals, RungIntegrals};
use crate::interactions::{Force, Method};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    Particles,
    Fluid,
}

/// Fluid variables which may be realized from linear theory rather than evolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluidVariable {
    /// ϱ
    Density,
    /// J
    CurrentDensity,
    /// 𝒫, the trace of the stress
    PressureTrace,
    /// ς
    Shear,
}

impl FluidVariable {
    /// Position of the variable in the Boltzmann hierarchy.
    pub fn order(self) -> usize {
        match self {
            FluidVariable::Density => 0,
            FluidVariable::CurrentDensity => 1,
            FluidVariable::PressureTrace | FluidVariable::Shear => 2,
        }
    }

    pub const ALL: [FluidVariable; 4] = [
        FluidVariable::Density,
        FluidVariable::CurrentDensity,
        FluidVariable::PressureTrace,
        FluidVariable::Shear,
    ];
}

/// Quantities the step-size limiter asks components to measure. Measurements
/// are collective: every process receives the global value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Largest propagation speed of any fluid element, sound speed included.
    VMax,
    /// Root mean square velocity.
    VRms,
}

/// Rung bookkeeping of a particle component.
///
/// Rung `r` advances with `1/2^r` of the base step. Populations are local to
/// the process; the scheduler reduces across processes where it matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RungState {
    population: Vec<usize>,
    lowest_populated: usize,
    highest_populated: usize,
    lowest_active: usize,
}

impl RungState {
    pub fn new(n_rungs: usize) -> Self {
        Self {
            population: vec![0; n_rungs.max(1)],
            lowest_populated: 0,
            highest_populated: 0,
            lowest_active: 0,
        }
    }

    pub fn n_rungs(&self) -> usize {
        self.population.len()
    }

    pub fn population(&self) -> &[usize] {
        &self.population
    }

    /// Rebuilds the populations from the rung of every local particle.
    pub fn recount(&mut self, rungs: impl IntoIterator<Item = usize>) {
        self.population.iter_mut().for_each(|n| *n = 0);
        let top = self.population.len() - 1;
        for rung in rungs {
            self.population[rung.min(top)] += 1;
        }
        self.lowest_populated = self.population.iter().position(|&n| n > 0).unwrap_or(0);
        self.highest_populated = self.population.iter().rposition(|&n| n > 0).unwrap_or(0);
    }

    pub fn lowest_populated(&self) -> usize {
        self.lowest_populated
    }

    pub fn highest_populated(&self) -> usize {
        self.highest_populated
    }

    pub fn lowest_active(&self) -> usize {
        self.lowest_active
    }

    pub fn set_lowest_active(&mut self, rung: usize) {
        self.lowest_active = rung;
    }

    /// Whether particles on `rung` receive the current kick.
    pub fn is_active(&self, rung: usize) -> bool {
        rung >= self.lowest_active
    }
}

/// A particle ensemble or fluid evolved by the scheduler.
///
/// Only the background description and the force assignments are mandatory;
/// every update primitive defaults to a no-op so that components implement
/// just what their representation needs.
pub trait Component {
    fn name(&self) -> &str;

    fn species(&self) -> &str;

    fn representation(&self) -> Representation;

    /// `(force, method)` assignments, in the order interactions are discovered.
    fn forces(&self) -> &[(Force, Method)];

    /// Grid size of the potential used for `force` with `method`, 0 if none.
    fn potential_gridsize(&self, _force: Force, _method: Method) -> usize {
        0
    }

    /// Fluid grid size, 0 for particles.
    fn gridsize(&self) -> usize {
        0
    }

    /// Comoving background density.
    fn rho_bar(&self) -> f64;

    fn w(&self, _a: f64) -> f64 {
        0.0
    }

    /// Effective equation of state, such that `ρ̄(a) = ρ̄·a^(-3(1+w_eff))`.
    fn w_eff(&self, _a: f64) -> f64 {
        0.0
    }

    fn w_dot(&self, _a: f64) -> f64 {
        0.0
    }

    /// Whether `w` changes with time; used only for progress output.
    fn w_varies(&self) -> bool {
        false
    }

    fn decay_rate(&self, _a: f64) -> f64 {
        0.0
    }

    /// Whether `variable` is realized from linear theory instead of evolved.
    fn is_linear(&self, _variable: FluidVariable) -> bool {
        false
    }

    /// Value of `quantity` over the whole component, reduced across all
    /// processes by the component itself.
    fn measure(&self, quantity: Measure) -> f64;

    fn drift(&mut self, _integrals: &Integrals, _a_end: Option<f64>) -> Result<()> {
        Ok(())
    }

    fn realize_if_linear(
        &mut self,
        _variable: FluidVariable,
        _a: Option<f64>,
        _a_next: Option<f64>,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_internal_sources(&mut self, _integrals: &Integrals, _a_end: f64) -> Result<()> {
        Ok(())
    }

    fn rung_state(&self) -> Option<&RungState> {
        None
    }

    fn rung_state_mut(&mut self) -> Option<&mut RungState> {
        None
    }

    /// Whether the component takes part in individual time stepping.
    fn use_rungs(&self) -> bool {
        self.rung_state().is_some()
    }

    /// Recounts the rung populations from the particles' current rungs.
    fn count_rungs(&mut self) {}

    /// Assigns every particle the rung its acceleration calls for, dropping
    /// flagged jumps.
    fn assign_rungs(&mut self, _dt: f64, _fac_softening: f64) {}

    /// Flags particles on active rungs for a one-level rung jump. Returns
    /// whether any particle was flagged.
    fn flag_rung_jumps(
        &mut self,
        _dt: f64,
        _jump_fac: f64,
        _fac_softening: f64,
        _rung_integrals: &RungIntegrals,
    ) -> bool {
        false
    }

    fn apply_rung_jumps(&mut self) {}

    fn nullify_momentum_buffer(&mut self) {}

    fn apply_momentum_buffer(&mut self) {}

    /// Turns the accumulated momentum changes into accelerations, in place.
    fn convert_momentum_to_acceleration(&mut self, _rung_integrals: &RungIntegrals) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Indices of the components with the given representation.
pub fn select(components: &[Box<dyn Component>], representation: Representation) -> Vec<usize> {
    components
        .iter()
        .enumerate()
        .filter(|(_, c)| c.representation() == representation)
        .map(|(i, _)| i)
        .collect()
}

/// Borrowed views of the selected components.
pub fn views<'a>(
    components: &'a [Box<dyn Component>],
    selection: &[usize],
) -> Vec<&'a dyn Component> {
    selection.iter().map(|&i| components[i].as_ref()).collect()
}

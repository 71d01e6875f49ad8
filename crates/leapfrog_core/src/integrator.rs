//! The drift and kick operators of the leapfrog, over all components.
//!
//! Long-range kicks (internal sources, mesh forces) happen once per half base
//! step. Short-range kicks happen per rung: rung `r` is kicked `2^r` times per
//! base step, interleaved with drifts of all particles.

pub mod long_range;
pub mod short_range;

use crate::background::Background;
use crate::comm::Communicator;
use crate::component::{views, Component};
use crate::integrals::IntegralCache;
use crate::interactions::InteractionRegistry;
use crate::time::{clamp_to_sync, CosmicTime};

pub use short_range::{down_jump_window, kick_window, lowest_active_rung, up_jump_window};

/// Which half of a base step a long-range kick covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    /// The first half of the base step.
    Init,
    /// The second half of this base step and the first half of the next.
    Full,
}

/// Owns the components and everything their updates depend on.
pub struct Integrator {
    pub(crate) components: Vec<Box<dyn Component>>,
    pub(crate) background: Box<dyn Background>,
    pub(crate) cache: IntegralCache,
    pub(crate) registry: InteractionRegistry,
    pub(crate) comm: Box<dyn Communicator>,
    pub(crate) time: CosmicTime,
    pub(crate) n_rungs: usize,
    pub(crate) fac_softening: f64,
    /// Wall-clock seconds spent in short-range interactions since last taken.
    pub(crate) short_range_seconds: f64,
}

impl Integrator {
    pub fn new(
        components: Vec<Box<dyn Component>>,
        background: Box<dyn Background>,
        registry: InteractionRegistry,
        comm: Box<dyn Communicator>,
        n_rungs: usize,
        fac_softening: f64,
    ) -> Self {
        let time = CosmicTime::new(0.0, 0, background.as_ref());
        Self {
            components,
            background,
            cache: IntegralCache::new(n_rungs),
            registry,
            comm,
            time,
            n_rungs: n_rungs.max(1),
            fac_softening,
            short_range_seconds: 0.0,
        }
    }

    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Box<dyn Component>] {
        &mut self.components
    }

    pub fn background(&self) -> &dyn Background {
        self.background.as_ref()
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn time(&self) -> &CosmicTime {
        &self.time
    }

    pub fn cache(&self) -> &IntegralCache {
        &self.cache
    }

    pub fn n_rungs(&self) -> usize {
        self.n_rungs
    }

    pub fn set_time(&mut self, t: f64) {
        self.time.set_time(t, self.background.as_ref());
    }

    fn all_indices(&self) -> Vec<usize> {
        (0..self.components.len()).collect()
    }

    /// Fixes the integrand set of the cache from all components.
    pub fn populate_integrals(&mut self) {
        let selected = views(&self.components, &self.all_indices());
        self.cache
            .get_integrals(0.0, 0.0, &selected, self.background.as_mut());
    }

    /// Advances the present time by `span`, landing exactly on `sync_time`
    /// when within tolerance of it.
    pub fn advance(&mut self, span: f64, sync_time: Option<f64>, dt: f64, reltol: f64) {
        let t = clamp_to_sync(self.time.t() + span, sync_time, dt, reltol);
        self.set_time(t);
    }

    /// Assigns every particle of every component the rung its acceleration
    /// calls for.
    pub fn assign_rungs(&mut self, dt: f64) {
        let fac_softening = self.fac_softening;
        for component in &mut self.components {
            component.assign_rungs(dt, fac_softening);
        }
    }

    /// Recounts the rung populations of the components using rungs.
    pub fn count_rungs(&mut self) {
        for component in &mut self.components {
            if component.use_rungs() {
                component.count_rungs();
            }
        }
    }

    /// Short-range interaction time of this process since the last call.
    pub fn take_short_range_seconds(&mut self) -> f64 {
        std::mem::take(&mut self.short_range_seconds)
    }

    pub fn any_rungs(&self) -> bool {
        self.components.iter().any(|c| c.use_rungs())
    }

    /// Rung populations summed over all processes, per component using rungs,
    /// up to the highest populated rung.
    pub fn rung_populations(&self) -> Vec<(String, Vec<usize>)> {
        self.components
            .iter()
            .filter_map(|c| {
                let state = c.rung_state()?;
                let mut totals: Vec<usize> = state
                    .population()
                    .iter()
                    .map(|&n| self.comm.allreduce_sum(n))
                    .collect();
                let last = totals.iter().rposition(|&n| n > 0).unwrap_or(0);
                totals.truncate(last + 1);
                Some((c.name().to_owned(), totals))
            })
            .collect()
    }
}

/// Lowest and highest populated rung of `component`; components without
/// rungs keep all particles on rung 0.
pub(crate) fn populated_rungs(component: &dyn Component) -> (usize, usize) {
    component
        .rung_state()
        .map_or((0, 0), |s| (s.lowest_populated(), s.highest_populated()))
}

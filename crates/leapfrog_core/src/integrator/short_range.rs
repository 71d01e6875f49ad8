//! Short-range kicks on rungs, intertwined with particle drifts.
//!
//! A base step `Δt` is divided into `2^(R-1)` drift sub-steps. Time within
//! the step is indexed in half sub-steps of the highest rung, so index `n`
//! sits at `t + Δt·n/2^R`. Rung `r` kicks over windows of `2^(R-r)` such
//! indices, each centred on a drift boundary of that rung.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use super::{populated_rungs, Integrator};
use crate::component::{select, views, Representation};
use crate::integrals::DISALLOWED;
use crate::interactions::{KickIntegrals, Range};
use crate::time::clamp_to_sync;

/// Lowest rung kicked at the end of drift sub-step `i`.
pub fn lowest_active_rung(i: usize, n_rungs: usize) -> usize {
    (0..n_rungs)
        .find(|&r| (i + 1) % (1 << (n_rungs - 1 - r)) == 0)
        .unwrap_or(n_rungs - 1)
}

/// Half-sub-step indices bounding the kick of rung `r` after sub-step `i`.
pub fn kick_window(i: usize, rung: usize, n_rungs: usize) -> (usize, usize) {
    let half = 1 << (n_rungs - 1 - rung);
    let start = half + (i / half) * (2 * half);
    (start, start + 2 * half)
}

/// Window of a jump from `rung` down to `rung - 1`, if rung `rung - 1` is
/// synchronised with this kick.
pub fn down_jump_window(i: usize, rung: usize, n_rungs: usize) -> Option<(usize, usize)> {
    if rung == 0 {
        return None;
    }
    let half = 1_i64 << (n_rungs - 1 - rung);
    if (i as i64 + 1 - half).rem_euclid(2 * half) != 0 {
        return None;
    }
    let (start, _) = kick_window(i, rung, n_rungs);
    Some((start, start + half as usize))
}

/// Window of a jump from `rung` up to `rung + 1`.
pub fn up_jump_window(i: usize, rung: usize, n_rungs: usize) -> Option<(usize, usize)> {
    if rung + 1 >= n_rungs {
        return None;
    }
    let (start, _) = kick_window(i, rung, n_rungs);
    Some((start, start + 3 * (1 << (n_rungs - 2 - rung))))
}

impl Integrator {
    /// Applies a half short-range kick of `Δt/2^(r+1)` to every populated
    /// rung `r`, starting from the current time.
    ///
    /// With `fake`, momenta are left untouched: the computed accelerations
    /// only serve to assign particles their initial rungs.
    pub fn kick_short(&mut self, dt: f64, fake: bool) -> Result<()> {
        let particles = select(&self.components, Representation::Particles);
        if particles.is_empty() {
            return Ok(());
        }
        let plans = self.registry.find(&self.components, &particles, Range::Short);
        if plans.is_empty() {
            return Ok(());
        }

        let mut highest = 0;
        for &index in &particles {
            let component = &mut self.components[index];
            if let Some(state) = component.rung_state_mut() {
                state.set_lowest_active(state.lowest_populated());
            }
            highest = highest.max(populated_rungs(&**component).1);
        }
        let highest = self.comm.allreduce_max(highest);

        let t_start = self.time.t();
        let selected = views(&self.components, &particles);
        for rung in 0..=highest {
            let t_end = t_start + dt / f64::from(1_u32 << (rung + 1));
            self.cache
                .store_rung_slot(rung, t_start, t_end, &selected, self.background.as_mut());
        }
        drop(selected);
        debug!(fake, highest, "initial short-range kick");

        for &index in &particles {
            self.components[index].nullify_momentum_buffer();
        }
        self.registry.apply_all(
            &plans,
            &mut self.components,
            KickIntegrals::Rungs(self.cache.rung_integrals()),
            Range::Short,
            !fake,
        )?;
        for &index in &particles {
            let component = &mut self.components[index];
            if fake {
                component.convert_momentum_to_acceleration(self.cache.rung_integrals());
                component.assign_rungs(dt, self.fac_softening);
            } else {
                component.apply_momentum_buffer();
                component.convert_momentum_to_acceleration(self.cache.rung_integrals());
            }
        }
        Ok(())
    }

    /// Drifts all particles over `Δt` while kicking each rung through its
    /// short-range interactions whenever it is due. Rung jumps flagged
    /// during a kick are applied at its end.
    ///
    /// Without short-range interactions this is a single drift of `Δt`.
    pub fn drift_kick_short(
        &mut self,
        dt: f64,
        sync_time: Option<f64>,
        jump_fac: f64,
        reltol: f64,
    ) -> Result<()> {
        let particles = select(&self.components, Representation::Particles);
        if particles.is_empty() {
            return Ok(());
        }
        let t0 = self.time.t();
        let n_rungs = self.n_rungs;
        let at = |index: usize| {
            let fraction = index as f64 / f64::from(1_u32 << n_rungs);
            clamp_to_sync(t0 + dt * fraction, sync_time, dt, reltol)
        };
        let all = self.all_indices();
        let plans = self.registry.find(&self.components, &all, Range::Short);

        if plans.is_empty() {
            let t_end = clamp_to_sync(t0 + dt, sync_time, dt, reltol);
            if t_end == t0 {
                return Ok(());
            }
            let selected = views(&self.components, &particles);
            let integrals = self
                .cache
                .get_integrals(t0, t_end, &selected, self.background.as_mut());
            drop(selected);
            for &index in &particles {
                self.components[index].drift(integrals, None)?;
            }
            return Ok(());
        }

        let mut any_kicks = true;
        let mut drift_start = 0;
        let mut announced = false;
        for i in 0..(1 << (n_rungs - 1)) {
            if any_kicks {
                drift_start = 2 * i;
            }
            let lowest_active = lowest_active_rung(i, n_rungs);

            any_kicks = false;
            for &index in &particles {
                let component = &mut self.components[index];
                let (lowest, highest) = populated_rungs(&**component);
                let active = lowest_active.max(lowest);
                if let Some(state) = component.rung_state_mut() {
                    state.set_lowest_active(active);
                }
                any_kicks |= highest >= active;
            }
            any_kicks = self.comm.allreduce_or(any_kicks);
            if !any_kicks {
                continue;
            }

            let t_start = at(drift_start);
            let t_end = at(2 * i + 2);
            if t_end > t_start {
                let selected = views(&self.components, &particles);
                let integrals = self.cache.get_integrals(
                    t_start,
                    t_end,
                    &selected,
                    self.background.as_mut(),
                );
                drop(selected);
                for &index in &particles {
                    self.components[index].drift(integrals, None)?;
                }
            }

            let highest = particles
                .iter()
                .map(|&index| populated_rungs(&*self.components[index]).1)
                .max()
                .unwrap_or(0);
            let highest = self.comm.allreduce_max(highest);
            let selected = views(&self.components, &particles);
            for rung in lowest_active..=highest {
                let (start, end) = kick_window(i, rung, n_rungs);
                let kick_start = at(start);
                self.cache.store_rung_slot(
                    rung,
                    kick_start,
                    at(end),
                    &selected,
                    self.background.as_mut(),
                );
                match down_jump_window(i, rung, n_rungs) {
                    Some((_, end)) => self.cache.store_rung_slot(
                        rung + n_rungs,
                        kick_start,
                        at(end),
                        &selected,
                        self.background.as_mut(),
                    ),
                    None => self.cache.set_rung_slot(rung + n_rungs, DISALLOWED),
                }
                if let Some((_, end)) = up_jump_window(i, rung, n_rungs) {
                    self.cache.store_rung_slot(
                        rung + 2 * n_rungs,
                        kick_start,
                        at(end),
                        &selected,
                        self.background.as_mut(),
                    );
                }
            }
            drop(selected);
            if self.cache.rung_integrals().kick_time(lowest_active..=highest) == 0.0 {
                continue;
            }

            let verbose = !announced && self.comm.is_master();
            if verbose {
                for plan in &plans {
                    let receivers: Vec<&str> = plan
                        .receivers
                        .iter()
                        .map(|&index| self.components[index].name())
                        .collect();
                    info!(
                        "intertwining drifts with {} ({}) of {}",
                        plan.force,
                        plan.method,
                        receivers.join(", "),
                    );
                }
            }
            announced = true;

            let mut jumps = vec![false; particles.len()];
            for (flag, &index) in jumps.iter_mut().zip(&particles) {
                let component = &mut self.components[index];
                *flag = component.flag_rung_jumps(
                    dt,
                    jump_fac,
                    self.fac_softening,
                    self.cache.rung_integrals(),
                );
                component.nullify_momentum_buffer();
            }
            self.comm.allreduce_or_slice(&mut jumps);

            let started = Instant::now();
            self.registry.apply_all(
                &plans,
                &mut self.components,
                KickIntegrals::Rungs(self.cache.rung_integrals()),
                Range::Short,
                verbose,
            )?;
            self.short_range_seconds += started.elapsed().as_secs_f64();
            for &index in &particles {
                self.components[index].apply_momentum_buffer();
            }
            for (&jumped, &index) in jumps.iter().zip(&particles) {
                let component = &mut self.components[index];
                component.convert_momentum_to_acceleration(self.cache.rung_integrals());
                if jumped {
                    component.apply_rung_jumps();
                }
            }
        }
        Ok(())
    }
}

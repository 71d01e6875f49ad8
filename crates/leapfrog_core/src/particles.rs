//! A particle ensemble in a periodic box, stepped on rungs.

use std::any::Any;

use anyhow::Result;
use nalgebra::Vector3;

use crate::component::{Component, Measure, Representation, RungState};
use crate::integrals::{GlobalIntegrand, Integrals, Integrand, RungIntegrals};
use crate::interactions::{Force, Method};

/// Equal-mass particles with comoving positions and canonical momenta.
///
/// Short-range kicks accumulate into a momentum buffer which is committed by
/// [`Component::apply_momentum_buffer`]. The acceleration of the latest kick is
/// kept for choosing rungs.
#[derive(Debug, Clone)]
pub struct ParticleEnsemble {
    name: String,
    species: String,
    forces: Vec<(Force, Method)>,
    mass: f64,
    boxsize: f64,
    softening_length: f64,
    pub(crate) positions: Vec<Vector3<f64>>,
    pub(crate) momenta: Vec<Vector3<f64>>,
    pub(crate) momentum_buffer: Vec<Vector3<f64>>,
    pub(crate) accelerations: Vec<Vector3<f64>>,
    pub(crate) rungs: Vec<usize>,
    pub(crate) jumps: Vec<i8>,
    pub(crate) rung_state: RungState,
}

impl ParticleEnsemble {
    pub fn new(name: &str, mass: f64, boxsize: f64, softening_length: f64, n_rungs: usize) -> Self {
        Self {
            name: name.to_owned(),
            species: "matter".to_owned(),
            forces: Vec::new(),
            mass,
            boxsize,
            softening_length,
            positions: Vec::new(),
            momenta: Vec::new(),
            momentum_buffer: Vec::new(),
            accelerations: Vec::new(),
            rungs: Vec::new(),
            jumps: Vec::new(),
            rung_state: RungState::new(n_rungs),
        }
    }

    pub fn with_force(mut self, force: Force, method: Method) -> Self {
        self.forces.push((force, method));
        self
    }

    pub fn with_species(mut self, species: &str) -> Self {
        self.species = species.to_owned();
        self
    }

    /// Adds a particle on rung 0, wrapping its position into the box.
    pub fn push(&mut self, position: Vector3<f64>, momentum: Vector3<f64>) {
        self.positions.push(position.map(|x| x.rem_euclid(self.boxsize)));
        self.momenta.push(momentum);
        self.momentum_buffer.push(Vector3::zeros());
        self.accelerations.push(Vector3::zeros());
        self.rungs.push(0);
        self.jumps.push(0);
        self.count_rungs();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn boxsize(&self) -> f64 {
        self.boxsize
    }

    pub fn softening_length(&self) -> f64 {
        self.softening_length
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn momenta(&self) -> &[Vector3<f64>] {
        &self.momenta
    }

    pub fn accelerations(&self) -> &[Vector3<f64>] {
        &self.accelerations
    }

    pub fn rungs(&self) -> &[usize] {
        &self.rungs
    }

    /// Lowest rung on which an acceleration of magnitude `acceleration`
    /// moves a particle at most `fac_softening` softening lengths per
    /// sub-step of a base step `dt`.
    pub fn needed_rung(&self, acceleration: f64, dt: f64, fac_softening: f64) -> usize {
        let limit = fac_softening * self.softening_length;
        let n_rungs = self.rung_state.n_rungs();
        (0..n_rungs)
            .find(|&rung| {
                let sub_step = dt / 2_f64.powi(rung as i32);
                0.5 * acceleration * sub_step * sub_step <= limit
            })
            .unwrap_or(n_rungs - 1)
    }
}

/// `∫a⁻¹dt` a particle on `rung` is kicked with, taking a flagged jump into
/// account.
pub(crate) fn kick_integral(rung_integrals: &RungIntegrals, rung: usize, jump: i8) -> f64 {
    let integrand = Integrand::Global(GlobalIntegrand::InverseA);
    let jumped = match jump {
        1 => rung_integrals.up_jump(&integrand, rung),
        -1 => rung_integrals.down_jump(&integrand, rung),
        _ => None,
    };
    jumped.unwrap_or_else(|| rung_integrals.kick(&integrand, rung))
}

impl Component for ParticleEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn species(&self) -> &str {
        &self.species
    }

    fn representation(&self) -> Representation {
        Representation::Particles
    }

    fn forces(&self) -> &[(Force, Method)] {
        &self.forces
    }

    fn rho_bar(&self) -> f64 {
        self.len() as f64 * self.mass / self.boxsize.powi(3)
    }

    /// Velocities in units of momentum per mass.
    fn measure(&self, quantity: Measure) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        match quantity {
            Measure::VMax => {
                self.momenta.iter().map(|p| p.norm()).fold(0.0, f64::max) / self.mass
            }
            Measure::VRms => {
                let mean_square = self.momenta.iter().map(|p| p.norm_squared()).sum::<f64>()
                    / self.len() as f64;
                mean_square.sqrt() / self.mass
            }
        }
    }

    fn drift(&mut self, integrals: &Integrals, _a_end: Option<f64>) -> Result<()> {
        let factor = integrals.global(GlobalIntegrand::InverseA2) / self.mass;
        let boxsize = self.boxsize;
        for (position, momentum) in self.positions.iter_mut().zip(&self.momenta) {
            *position = (*position + momentum * factor).map(|x| x.rem_euclid(boxsize));
        }
        Ok(())
    }

    fn rung_state(&self) -> Option<&RungState> {
        Some(&self.rung_state)
    }

    fn rung_state_mut(&mut self) -> Option<&mut RungState> {
        Some(&mut self.rung_state)
    }

    fn count_rungs(&mut self) {
        self.rung_state.recount(self.rungs.iter().copied());
    }

    fn assign_rungs(&mut self, dt: f64, fac_softening: f64) {
        for i in 0..self.len() {
            self.rungs[i] = self.needed_rung(self.accelerations[i].norm(), dt, fac_softening);
            self.jumps[i] = 0;
        }
        self.count_rungs();
    }

    fn flag_rung_jumps(
        &mut self,
        dt: f64,
        jump_fac: f64,
        fac_softening: f64,
        rung_integrals: &RungIntegrals,
    ) -> bool {
        let integrand = Integrand::Global(GlobalIntegrand::One);
        let top = self.rung_state.n_rungs() - 1;
        let mut any = false;
        for i in 0..self.len() {
            let rung = self.rungs[i];
            if !self.rung_state.is_active(rung) {
                continue;
            }
            let acceleration = self.accelerations[i].norm();
            let jump = if rung < top
                && self.needed_rung(acceleration, dt * jump_fac, fac_softening) > rung
            {
                1
            } else if rung_integrals.down_jump(&integrand, rung).is_some()
                && self.needed_rung(acceleration, dt / jump_fac, fac_softening) < rung
            {
                -1
            } else {
                0
            };
            self.jumps[i] = jump;
            any |= jump != 0;
        }
        any
    }

    fn apply_rung_jumps(&mut self) {
        for (rung, jump) in self.rungs.iter_mut().zip(self.jumps.iter_mut()) {
            *rung = rung.saturating_add_signed(isize::from(*jump));
            *jump = 0;
        }
        self.count_rungs();
    }

    fn nullify_momentum_buffer(&mut self) {
        self.momentum_buffer.fill(Vector3::zeros());
    }

    fn apply_momentum_buffer(&mut self) {
        for (momentum, delta) in self.momenta.iter_mut().zip(&self.momentum_buffer) {
            *momentum += delta;
        }
    }

    fn convert_momentum_to_acceleration(&mut self, rung_integrals: &RungIntegrals) {
        for i in 0..self.len() {
            let rung = self.rungs[i];
            if !self.rung_state.is_active(rung) {
                continue;
            }
            let integral = kick_integral(rung_integrals, rung, self.jumps[i]);
            if integral > 0.0 {
                self.accelerations[i] = self.momentum_buffer[i] / (self.mass * integral);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

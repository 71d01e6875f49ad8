//! Direct-summation gravity between particle ensembles.

use anyhow::{anyhow, Result};
use nalgebra::Vector3;
use tracing::info;

use crate::component::Component;
use crate::error::SchedulerError;
use crate::interactions::{Force, Interaction, KickIntegrals, Method, Range};
use crate::particles::{kick_integral, ParticleEnsemble};

/// Plummer-softened Newtonian gravity summed over all particle pairs, using
/// the nearest periodic image. Only the short-range PP method is available.
#[derive(Debug, Clone, Copy)]
pub struct PairwiseGravity {
    g_newton: f64,
}

impl PairwiseGravity {
    pub fn new(g_newton: f64) -> Self {
        Self { g_newton }
    }
}

fn ensemble(component: &dyn Component) -> Result<&ParticleEnsemble> {
    component
        .as_any()
        .downcast_ref::<ParticleEnsemble>()
        .ok_or_else(|| {
            anyhow!(
                "pairwise gravity needs particle ensembles, got {}",
                component.name()
            )
        })
}

/// `x` wrapped into `[-boxsize/2, boxsize/2]`.
fn nearest_image(x: Vector3<f64>, boxsize: f64) -> Vector3<f64> {
    x.map(|d| d - boxsize * (d / boxsize).round())
}

struct Source {
    component: usize,
    mass: f64,
    positions: Vec<Vector3<f64>>,
}

impl Interaction for PairwiseGravity {
    fn apply(
        &self,
        method: Method,
        components: &mut [Box<dyn Component>],
        receivers: &[usize],
        suppliers: &[usize],
        integrals: KickIntegrals<'_>,
        range: Range,
        verbose: bool,
    ) -> Result<()> {
        let (Method::Pp, Range::Short, KickIntegrals::Rungs(rung_integrals)) =
            (method, range, integrals)
        else {
            return Err(SchedulerError::UnregisteredForce {
                force: Force::Gravity,
                method,
            }
            .into());
        };

        let sources = suppliers
            .iter()
            .map(|&index| -> Result<Source> {
                let particles = ensemble(&*components[index])?;
                Ok(Source {
                    component: index,
                    mass: particles.mass(),
                    positions: particles.positions().to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for &index in receivers {
            let name = components[index].name().to_owned();
            let particles = components[index]
                .as_any_mut()
                .downcast_mut::<ParticleEnsemble>()
                .ok_or_else(|| anyhow!("pairwise gravity needs particle ensembles, got {name}"))?;
            if verbose {
                info!(receiver = %name, particles = particles.len(), "gravity (PP)");
            }
            let epsilon2 = particles.softening_length().powi(2);
            let boxsize = particles.boxsize();
            for i in 0..particles.len() {
                let rung = particles.rungs[i];
                if !particles.rung_state.is_active(rung) {
                    continue;
                }
                let x = particles.positions[i];
                let mut g = Vector3::<f64>::zeros();
                for source in &sources {
                    for (j, y) in source.positions.iter().enumerate() {
                        if source.component == index && j == i {
                            continue;
                        }
                        let d = nearest_image(y - x, boxsize);
                        let r2 = d.norm_squared() + epsilon2;
                        g += d * (self.g_newton * source.mass / (r2 * r2.sqrt()));
                    }
                }
                let integral = kick_integral(rung_integrals, rung, particles.jumps[i]);
                let mass = particles.mass();
                particles.momentum_buffer[i] += g * (mass * integral);
            }
        }
        Ok(())
    }
}

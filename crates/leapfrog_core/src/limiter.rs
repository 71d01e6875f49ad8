//! The largest stable base step size and the constraint binding it.
//!
//! Background limiters bound the step by a fraction of the dynamical time, the
//! Hubble time, `1/|ẇ|` and the reciprocal decay rates. Non-linear limiters
//! bound it by the time the fastest fluid element needs to cross a fluid cell
//! (Courant), and by the time an rms-moving element needs to cross a PM cell
//! or the P³M force split scale.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;

use crate::background::Background;
use crate::component::{Component, FluidVariable, Measure, Representation};
use crate::config::{LimiterFactors, PhysicalSettings};
use crate::error::SchedulerError;
use crate::interactions::{Force, Method};

/// The constraint limiting the base step size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bottleneck {
    DynamicalTime,
    HubbleTime,
    WDot(String),
    DecayRate(String),
    Courant(String),
    ParticleMesh { force: Force, component: String },
    P3m { force: Force, component: String },
}

impl fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bottleneck::DynamicalTime => write!(f, "the dynamical timescale"),
            Bottleneck::HubbleTime => write!(f, "the Hubble time"),
            Bottleneck::WDot(name) => write!(f, "ẇ of {name}"),
            Bottleneck::DecayRate(name) => write!(f, "decay rate of {name}"),
            Bottleneck::Courant(name) => write!(f, "the Courant condition for {name}"),
            Bottleneck::ParticleMesh { force, component } => {
                write!(f, "the PM method of the {force} force for {component}")
            }
            Bottleneck::P3m { force, component } => {
                write!(f, "the P³M method of the {force} force for {component}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepLimit {
    pub dt: f64,
    /// `None` when nothing limits the step.
    pub bottleneck: Option<Bottleneck>,
}

impl StepLimit {
    fn unconstrained() -> Self {
        Self {
            dt: f64::INFINITY,
            bottleneck: None,
        }
    }

    /// Keeps `dt` only if strictly below the running minimum.
    fn offer(&mut self, dt: f64, bottleneck: impl FnOnce() -> Bottleneck) {
        if dt < self.dt {
            self.dt = dt;
            self.bottleneck = Some(bottleneck());
        }
    }

    /// Bottleneck description, empty when unconstrained.
    pub fn describe(&self) -> String {
        self.bottleneck
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Memoizes collective measurements for the duration of one limiter call.
struct Measurements<'a> {
    components: &'a [Box<dyn Component>],
    cache: HashMap<(usize, Measure), f64>,
}

impl Measurements<'_> {
    fn get(&mut self, index: usize, quantity: Measure) -> f64 {
        let components = self.components;
        *self
            .cache
            .entry((index, quantity))
            .or_insert_with(|| components[index].measure(quantity))
    }
}

/// Computes the largest allowed base step size at scale factor `a`.
pub fn base_step_limit(
    components: &[Box<dyn Component>],
    a: f64,
    background: &dyn Background,
    physics: &PhysicalSettings,
    factors: &LimiterFactors,
) -> Result<StepLimit> {
    let mut limit = StepLimit::unconstrained();
    let eps = f64::EPSILON;
    let mut measurements = Measurements {
        components,
        cache: HashMap::new(),
    };

    let rho_bar_of = |c: &dyn Component| c.rho_bar() * a.powf(-3.0 * (1.0 + c.w_eff(a)));
    let rho_bar: f64 = components.iter().map(|c| rho_bar_of(c.as_ref())).sum();
    limit.offer(
        factors.dynamical / (physics.g_newton * rho_bar).sqrt(),
        || Bottleneck::DynamicalTime,
    );

    if background.hubble_enabled() {
        limit.offer(factors.hubble / background.hubble(a), || Bottleneck::HubbleTime);
    }

    for component in components {
        limit.offer(factors.w_dot / (component.w_dot(a).abs() + eps), || {
            Bottleneck::WDot(component.name().to_owned())
        });
    }

    for component in components {
        if component.representation() == Representation::Fluid
            && component.is_linear(FluidVariable::Density)
        {
            continue;
        }
        let weight = rho_bar / rho_bar_of(component.as_ref());
        limit.offer(
            factors.decay / (component.decay_rate(a).abs() + eps) * weight,
            || Bottleneck::DecayRate(component.name().to_owned()),
        );
    }

    for (index, component) in components.iter().enumerate() {
        if component.representation() != Representation::Fluid {
            continue;
        }
        let mut v_max = measurements.get(index, Measure::VMax);
        if v_max == 0.0 {
            v_max = eps;
        }
        let dx = physics.boxsize / component.gridsize() as f64;
        limit.offer(factors.courant * dx / v_max, || {
            Bottleneck::Courant(component.name().to_owned())
        });
    }

    for (index, component) in components.iter().enumerate() {
        let Some((resolution, force)) = pm_resolution(components, component.as_ref())? else {
            continue;
        };
        let mut v_rms = measurements.get(index, Measure::VRms);
        if component.representation() == Representation::Fluid {
            v_rms -= physics.light_speed * component.w(a).sqrt() / a;
        }
        if v_rms < eps {
            v_rms = eps;
        }
        let dx = physics.boxsize / resolution as f64;
        limit.offer(factors.pm * dx / v_rms, || Bottleneck::ParticleMesh {
            force,
            component: component.name().to_owned(),
        });
    }

    for (index, component) in components.iter().enumerate() {
        let mut scale = f64::INFINITY;
        let mut extreme_force = Force::Gravity;
        for &(force, method) in component.forces() {
            if method != Method::P3m {
                continue;
            }
            match force {
                Force::Gravity => {
                    if physics.gravity_shortrange_scale < scale {
                        scale = physics.gravity_shortrange_scale;
                        extreme_force = force;
                    }
                }
                Force::Lapse => {
                    return Err(SchedulerError::UnregisteredForce { force, method }.into())
                }
            }
        }
        if scale == f64::INFINITY {
            continue;
        }
        let mut v_rms = measurements.get(index, Measure::VRms);
        if v_rms < eps {
            v_rms = eps;
        }
        limit.offer(factors.p3m * scale / v_rms, || Bottleneck::P3m {
            force: extreme_force,
            component: component.name().to_owned(),
        });
    }

    Ok(limit)
}

/// Finest PM grid among the forces of `component`, with the force owning it.
/// The lapse grid is bounded by the grid of the lapse component.
fn pm_resolution(
    components: &[Box<dyn Component>],
    component: &dyn Component,
) -> Result<Option<(usize, Force)>> {
    let mut best: Option<(usize, Force)> = None;
    let mut lapse_gridsize = None;
    for &(force, method) in component.forces() {
        if method != Method::Pm {
            continue;
        }
        let gridsize = match force {
            Force::Gravity => component.potential_gridsize(force, method),
            Force::Lapse => {
                let lapse = match lapse_gridsize {
                    Some(size) => size,
                    None => {
                        let size = components
                            .iter()
                            .find(|c| c.species() == "lapse")
                            .map(|c| c.gridsize())
                            .ok_or_else(|| SchedulerError::MissingLapseComponent {
                                component: component.name().to_owned(),
                            })?;
                        lapse_gridsize = Some(size);
                        size
                    }
                };
                component.potential_gridsize(force, method).min(lapse)
            }
        };
        if gridsize > best.map_or(0, |(size, _)| size) {
            best = Some((gridsize, force));
        }
    }
    Ok(best)
}

//! Discovery and dispatch of the force interactions between components.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::SchedulerError;
use crate::integrals::{Integrals, RungIntegrals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Force {
    Gravity,
    /// The lapse force of the dynamical dark energy fluid.
    Lapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Particle-mesh, long range only.
    Pm,
    /// Particle-particle-particle-mesh, split into a long and a short range part.
    P3m,
    /// Direct summation, short range only.
    Pp,
}

/// Which kicks an interaction takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Range {
    /// Applied once per half base step.
    Long,
    /// Applied on every rung sub-step.
    Short,
}

impl Method {
    pub fn acts_on(self, range: Range) -> bool {
        matches!(
            (self, range),
            (Method::Pm, Range::Long) | (Method::P3m, _) | (Method::Pp, Range::Short)
        )
    }
}

impl fmt::Display for Force {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Force::Gravity => "gravity",
            Force::Lapse => "lapse",
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Pm => "pm",
            Method::P3m => "p3m",
            Method::Pp => "pp",
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Range::Long => "long-range",
            Range::Short => "short-range",
        })
    }
}

/// The integrals an interaction kicks with: one value per integrand for
/// long-range kicks, per-rung values for short-range kicks.
#[derive(Debug, Clone, Copy)]
pub enum KickIntegrals<'a> {
    Scalar(&'a Integrals),
    Rungs(&'a RungIntegrals),
}

/// One force evaluated with one method, from the suppliers onto the receivers.
/// Indices refer to the component slice the plan was discovered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionPlan {
    pub force: Force,
    pub method: Method,
    pub receivers: Vec<usize>,
    pub suppliers: Vec<usize>,
}

/// A force implementation. Implementations accumulate momentum changes into
/// the receivers' buffers (short range) or update them directly (long range).
pub trait Interaction {
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        method: Method,
        components: &mut [Box<dyn Component>],
        receivers: &[usize],
        suppliers: &[usize],
        integrals: KickIntegrals<'_>,
        range: Range,
        verbose: bool,
    ) -> Result<()>;
}

/// Force implementations by force.
#[derive(Default)]
pub struct InteractionRegistry {
    forces: BTreeMap<Force, Box<dyn Interaction>>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, force: Force, interaction: Box<dyn Interaction>) -> &mut Self {
        self.forces.insert(force, interaction);
        self
    }

    pub fn get(&self, force: Force) -> Option<&dyn Interaction> {
        self.forces.get(&force).map(Box::as_ref)
    }

    /// Rejects force assignments which no registered interaction implements.
    pub fn validate(&self, components: &[Box<dyn Component>]) -> Result<()> {
        for component in components {
            for &(force, method) in component.forces() {
                if !self.forces.contains_key(&force) {
                    return Err(SchedulerError::UnregisteredForce { force, method }.into());
                }
            }
        }
        Ok(())
    }

    /// Interactions of the given range among the selected components, in
    /// order of first appearance. Receivers are the components assigned the
    /// force with exactly that method; suppliers are all selected components
    /// assigned the force with any method acting on the range.
    pub fn find(
        &self,
        components: &[Box<dyn Component>],
        selection: &[usize],
        range: Range,
    ) -> Vec<InteractionPlan> {
        let mut plans: Vec<InteractionPlan> = Vec::new();
        for &index in selection {
            for &(force, method) in components[index].forces() {
                if !method.acts_on(range) {
                    continue;
                }
                match plans
                    .iter_mut()
                    .find(|p| p.force == force && p.method == method)
                {
                    Some(plan) => plan.receivers.push(index),
                    None => plans.push(InteractionPlan {
                        force,
                        method,
                        receivers: vec![index],
                        suppliers: Vec::new(),
                    }),
                }
            }
        }
        for plan in &mut plans {
            plan.suppliers = selection
                .iter()
                .copied()
                .filter(|&i| {
                    components[i]
                        .forces()
                        .iter()
                        .any(|&(f, m)| f == plan.force && m.acts_on(range))
                })
                .collect();
        }
        plans
    }

    /// Invokes every plan in order.
    pub fn apply_all(
        &self,
        plans: &[InteractionPlan],
        components: &mut [Box<dyn Component>],
        integrals: KickIntegrals<'_>,
        range: Range,
        verbose: bool,
    ) -> Result<()> {
        for plan in plans {
            let interaction = self.get(plan.force).ok_or(SchedulerError::UnregisteredForce {
                force: plan.force,
                method: plan.method,
            })?;
            interaction.apply(
                plan.method,
                components,
                &plan.receivers,
                &plan.suppliers,
                integrals,
                range,
                verbose,
            )?;
        }
        Ok(())
    }
}

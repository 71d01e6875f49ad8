//! Time step integrals `∫ f(a(t)) dt` over the intervals of the drift and kick
//! operators, for every integrand the operators may ask for.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::background::Background;
use crate::component::Component;

/// Integrands depending on the background alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GlobalIntegrand {
    One,
    InverseA,
    InverseA2,
    Hubble,
}

/// Integrands depending on the equation of state of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentIntegrand {
    /// `a**(-3*w_eff)`
    Pressure,
    /// `a**(-3*(1+w_eff))`
    Density,
    /// `a**(-3*w_eff-1)`
    Kick,
    /// `a**(3*w_eff-2)`
    Drift,
    /// `a**(2-3*w_eff)`
    Source,
    /// `a**(-3*w_eff)*Γ/H`
    Decay,
}

impl GlobalIntegrand {
    pub const ALL: [GlobalIntegrand; 4] = [
        GlobalIntegrand::One,
        GlobalIntegrand::InverseA,
        GlobalIntegrand::InverseA2,
        GlobalIntegrand::Hubble,
    ];

    fn value(self, a: f64, hubble: f64) -> f64 {
        match self {
            GlobalIntegrand::One => 1.0,
            GlobalIntegrand::InverseA => 1.0 / a,
            GlobalIntegrand::InverseA2 => 1.0 / (a * a),
            GlobalIntegrand::Hubble => hubble,
        }
    }
}

impl ComponentIntegrand {
    pub const ALL: [ComponentIntegrand; 6] = [
        ComponentIntegrand::Pressure,
        ComponentIntegrand::Density,
        ComponentIntegrand::Kick,
        ComponentIntegrand::Drift,
        ComponentIntegrand::Source,
        ComponentIntegrand::Decay,
    ];

    fn value(self, a: f64, hubble: f64, component: &dyn Component) -> f64 {
        let w_eff = component.w_eff(a);
        match self {
            ComponentIntegrand::Pressure => a.powf(-3.0 * w_eff),
            ComponentIntegrand::Density => a.powf(-3.0 * (1.0 + w_eff)),
            ComponentIntegrand::Kick => a.powf(-3.0 * w_eff - 1.0),
            ComponentIntegrand::Drift => a.powf(3.0 * w_eff - 2.0),
            ComponentIntegrand::Source => a.powf(2.0 - 3.0 * w_eff),
            ComponentIntegrand::Decay => {
                if hubble == 0.0 {
                    0.0
                } else {
                    a.powf(-3.0 * w_eff) * component.decay_rate(a) / hubble
                }
            }
        }
    }
}

/// A named function of the scale factor to be integrated over cosmic time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Integrand {
    Global(GlobalIntegrand),
    Component(ComponentIntegrand, String),
    /// `a**(-3*w_eff₀-3*w_eff₁-1)` of an ordered component pair.
    Pair(String, String),
}

impl Integrand {
    /// Names of the components the integrand depends on.
    fn component_names(&self) -> Vec<&str> {
        match self {
            Integrand::Global(_) => Vec::new(),
            Integrand::Component(_, name) => vec![name.as_str()],
            Integrand::Pair(first, second) => vec![first.as_str(), second.as_str()],
        }
    }
}

impl fmt::Display for GlobalIntegrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GlobalIntegrand::One => "1",
            GlobalIntegrand::InverseA => "a**(-1)",
            GlobalIntegrand::InverseA2 => "a**(-2)",
            GlobalIntegrand::Hubble => "ȧ/a",
        })
    }
}

impl fmt::Display for ComponentIntegrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentIntegrand::Pressure => "a**(-3*w_eff)",
            ComponentIntegrand::Density => "a**(-3*(1+w_eff))",
            ComponentIntegrand::Kick => "a**(-3*w_eff-1)",
            ComponentIntegrand::Drift => "a**(3*w_eff-2)",
            ComponentIntegrand::Source => "a**(2-3*w_eff)",
            ComponentIntegrand::Decay => "a**(-3*w_eff)*Γ/H",
        })
    }
}

impl fmt::Display for Integrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Integrand::Global(g) => write!(f, "{g}"),
            Integrand::Component(c, name) => write!(f, "({c}, {name})"),
            Integrand::Pair(first, second) => {
                write!(f, "(a**(-3*w_eff₀-3*w_eff₁-1), {first}, {second})")
            }
        }
    }
}

/// One integral per integrand over a single interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Integrals {
    values: BTreeMap<Integrand, f64>,
}

impl Integrals {
    pub fn get(&self, integrand: &Integrand) -> Option<f64> {
        self.values.get(integrand).copied()
    }

    /// A global integral; 0 before the cache is populated.
    pub fn global(&self, integrand: GlobalIntegrand) -> f64 {
        self.get(&Integrand::Global(integrand)).unwrap_or(0.0)
    }

    /// A single-component integral; NaN when the component is unknown.
    pub fn component(&self, integrand: ComponentIntegrand, name: &str) -> f64 {
        self.get(&Integrand::Component(integrand, name.to_owned()))
            .unwrap_or(f64::NAN)
    }

    pub fn pair(&self, first: &str, second: &str) -> f64 {
        self.get(&Integrand::Pair(first.to_owned(), second.to_owned()))
            .unwrap_or(f64::NAN)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Integrand, f64)> {
        self.values.iter().map(|(k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Integrals of every integrand for each rung, with auxiliary slots for rung
/// jumps. For `R` rungs each array holds `3R - 1` values: slot `r` is the kick
/// of rung `r`, slot `r + R` the jump down from `r` (−1 when disallowed) and
/// slot `r + 2R` the jump up from `r`.
#[derive(Debug, Clone, PartialEq)]
pub struct RungIntegrals {
    n_rungs: usize,
    values: BTreeMap<Integrand, Vec<f64>>,
}

/// Value of a down-jump slot when jumping down is not allowed.
pub const DISALLOWED: f64 = -1.0;

impl RungIntegrals {
    fn new(n_rungs: usize) -> Self {
        Self {
            n_rungs,
            values: BTreeMap::new(),
        }
    }

    pub fn n_rungs(&self) -> usize {
        self.n_rungs
    }

    pub fn slots(&self, integrand: &Integrand) -> Option<&[f64]> {
        self.values.get(integrand).map(Vec::as_slice)
    }

    fn slot(&self, integrand: &Integrand, index: usize) -> Option<f64> {
        self.values.get(integrand)?.get(index).copied()
    }

    pub fn kick(&self, integrand: &Integrand, rung: usize) -> f64 {
        self.slot(integrand, rung).unwrap_or(f64::NAN)
    }

    /// The integral for jumping from `rung` down to `rung - 1`, if allowed.
    pub fn down_jump(&self, integrand: &Integrand, rung: usize) -> Option<f64> {
        if rung == 0 {
            return None;
        }
        self.slot(integrand, rung + self.n_rungs)
            .filter(|&value| value != DISALLOWED)
    }

    /// The integral for jumping from `rung` up to `rung + 1`.
    pub fn up_jump(&self, integrand: &Integrand, rung: usize) -> Option<f64> {
        if rung + 1 >= self.n_rungs {
            return None;
        }
        self.slot(integrand, rung + 2 * self.n_rungs)
    }

    pub fn global_kick(&self, integrand: GlobalIntegrand, rung: usize) -> f64 {
        self.kick(&Integrand::Global(integrand), rung)
    }

    /// Sum of the kick integrals of `1` over `rungs`, i.e. the total time the
    /// kicks span.
    pub fn kick_time(&self, rungs: std::ops::RangeInclusive<usize>) -> f64 {
        match self.slots(&Integrand::Global(GlobalIntegrand::One)) {
            Some(slots) => rungs.filter_map(|r| slots.get(r)).sum(),
            None => 0.0,
        }
    }
}

/// Lazily populated tables of time step integrals.
///
/// The integrand set is fixed by the components passed to the first query and
/// never shrinks. Values are overwritten by every query.
#[derive(Debug, Clone)]
pub struct IntegralCache {
    scalar: Integrals,
    rungs: RungIntegrals,
}

impl IntegralCache {
    pub fn new(n_rungs: usize) -> Self {
        Self {
            scalar: Integrals::default(),
            rungs: RungIntegrals::new(n_rungs.max(1)),
        }
    }

    pub fn n_rungs(&self) -> usize {
        self.rungs.n_rungs
    }

    pub fn is_populated(&self) -> bool {
        !self.scalar.is_empty()
    }

    fn populate(&mut self, components: &[&dyn Component]) {
        let mut integrands: Vec<Integrand> =
            GlobalIntegrand::ALL.iter().map(|&g| Integrand::Global(g)).collect();
        for component in components {
            integrands.extend(
                ComponentIntegrand::ALL
                    .iter()
                    .map(|&c| Integrand::Component(c, component.name().to_owned())),
            );
        }
        for first in components {
            for second in components {
                integrands.push(Integrand::Pair(
                    first.name().to_owned(),
                    second.name().to_owned(),
                ));
            }
        }
        let length = 3 * self.rungs.n_rungs - 1;
        for integrand in integrands {
            self.scalar.values.insert(integrand.clone(), 0.0);
            self.rungs.values.insert(integrand, vec![0.0; length]);
        }
        debug!(integrands = self.scalar.len(), "populated time step integral cache");
    }

    /// Integrals of every integrand over `[t_start, t_end]`. Integrands of
    /// components not among `components` come out as NaN.
    pub fn get_integrals(
        &mut self,
        t_start: f64,
        t_end: f64,
        components: &[&dyn Component],
        background: &mut dyn Background,
    ) -> &Integrals {
        if !self.is_populated() {
            self.populate(components);
        }
        let zero_length = t_start == t_end;
        if !zero_length {
            background.expand(background.scale_factor(t_start), t_start, t_end - t_start);
        }
        let background: &dyn Background = background;
        for (integrand, value) in self.scalar.values.iter_mut() {
            let names = integrand.component_names();
            let found: Option<Vec<&dyn Component>> = names
                .iter()
                .map(|name| components.iter().copied().find(|c| c.name() == *name))
                .collect();
            let Some(found) = found else {
                *value = f64::NAN;
                continue;
            };
            if zero_length {
                *value = 0.0;
                continue;
            }
            *value = match integrand {
                Integrand::Global(g) => background
                    .integrate(t_start, t_end, &|a| g.value(a, background.hubble(a))),
                Integrand::Component(c, _) => background.integrate(t_start, t_end, &|a| {
                    c.value(a, background.hubble(a), found[0])
                }),
                Integrand::Pair(..) => background.integrate(t_start, t_end, &|a| {
                    a.powf(-3.0 * found[0].w_eff(a) - 3.0 * found[1].w_eff(a) - 1.0)
                }),
            };
        }
        &self.scalar
    }

    /// Computes the integrals over `[t_start, t_end]` and stores them in rung
    /// slot `slot` of every integrand.
    pub fn store_rung_slot(
        &mut self,
        slot: usize,
        t_start: f64,
        t_end: f64,
        components: &[&dyn Component],
        background: &mut dyn Background,
    ) {
        self.get_integrals(t_start, t_end, components, background);
        for (integrand, &value) in self.scalar.values.iter() {
            if let Some(slots) = self.rungs.values.get_mut(integrand) {
                if let Some(target) = slots.get_mut(slot) {
                    *target = value;
                }
            }
        }
    }

    /// Writes `value` into rung slot `slot` of every integrand.
    pub fn set_rung_slot(&mut self, slot: usize, value: f64) {
        for slots in self.rungs.values.values_mut() {
            if let Some(target) = slots.get_mut(slot) {
                *target = value;
            }
        }
    }

    pub fn integrals(&self) -> &Integrals {
        &self.scalar
    }

    pub fn rung_integrals(&self) -> &RungIntegrals {
        &self.rungs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{FriedmannBackground, FriedmannParameters, StaticBackground};
    use crate::testing::MockComponent;

    fn matter() -> FriedmannBackground {
        FriedmannBackground::new(FriedmannParameters {
            h0: 1.0,
            omega_m: 1.0,
            omega_r: 0.0,
            omega_lambda: 0.0,
        })
    }

    #[test]
    fn first_query_enumerates_every_integrand() {
        let (a, b) = (MockComponent::fluid("a"), MockComponent::particles("b"));
        let components: Vec<&dyn Component> = vec![&a, &b];
        let mut cache = IntegralCache::new(3);
        let integrals = cache.get_integrals(0.0, 0.0, &components, &mut StaticBackground);
        assert_eq!(integrals.len(), 4 + 6 * 2 + 2 * 2);
        let slots = cache
            .rung_integrals()
            .slots(&Integrand::Global(GlobalIntegrand::One))
            .expect("allocated");
        assert_eq!(slots.len(), 8);
    }

    #[test]
    fn zero_length_interval_gives_zero_everywhere() {
        let a = MockComponent::fluid("a");
        let components: Vec<&dyn Component> = vec![&a];
        let mut cache = IntegralCache::new(1);
        let mut background = matter();
        let integrals = cache.get_integrals(0.4, 0.4, &components, &mut background);
        assert!(integrals.iter().all(|(_, v)| v == 0.0));
    }

    #[test]
    fn absent_components_yield_nan() {
        let (a, b) = (MockComponent::fluid("a"), MockComponent::fluid("b"));
        let mut cache = IntegralCache::new(1);
        cache.get_integrals(0.0, 0.0, &[&a, &b], &mut StaticBackground);
        let integrals = cache.get_integrals(0.0, 1.0, &[&a], &mut StaticBackground);
        assert_eq!(integrals.global(GlobalIntegrand::One), 1.0);
        assert_eq!(integrals.component(ComponentIntegrand::Kick, "a"), 1.0);
        assert!(integrals.component(ComponentIntegrand::Kick, "b").is_nan());
        assert!(integrals.pair("a", "b").is_nan());
        assert_eq!(integrals.pair("a", "a"), 1.0);
    }

    #[test]
    fn queries_are_deterministic() {
        let a = MockComponent::fluid("a").with_w(1.0 / 3.0);
        let mut cache = IntegralCache::new(2);
        let mut background = matter();
        let first = cache.get_integrals(0.2, 0.35, &[&a], &mut background).clone();
        let second = cache.get_integrals(0.2, 0.35, &[&a], &mut background).clone();
        assert_eq!(first, second);
        let radiation = first.component(ComponentIntegrand::Density, "a");
        let expected = background.integrate(0.2, 0.35, &|a| a.powi(-4));
        assert!((radiation - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn decay_integrand_vanishes_without_expansion() {
        let a = MockComponent::fluid("a").with_decay_rate(2.0);
        let mut cache = IntegralCache::new(1);
        let integrals = cache.get_integrals(0.0, 3.0, &[&a], &mut StaticBackground);
        assert_eq!(integrals.component(ComponentIntegrand::Decay, "a"), 0.0);
        assert_eq!(integrals.global(GlobalIntegrand::Hubble), 0.0);
    }

    #[test]
    fn rung_slots_hold_kicks_and_jumps() {
        let a = MockComponent::particles("a");
        let mut cache = IntegralCache::new(2);
        let mut background = StaticBackground;
        cache.store_rung_slot(0, 0.0, 1.0, &[&a], &mut background);
        cache.store_rung_slot(1, 0.0, 0.5, &[&a], &mut background);
        cache.set_rung_slot(1 + 2, DISALLOWED);
        cache.store_rung_slot(4, 0.0, 0.75, &[&a], &mut background);
        let rungs = cache.rung_integrals();
        let one = Integrand::Global(GlobalIntegrand::One);
        assert_eq!(rungs.kick(&one, 0), 1.0);
        assert_eq!(rungs.kick(&one, 1), 0.5);
        assert_eq!(rungs.down_jump(&one, 0), None);
        assert_eq!(rungs.down_jump(&one, 1), None);
        assert_eq!(rungs.up_jump(&one, 0), Some(0.75));
        assert_eq!(rungs.up_jump(&one, 1), None);
        assert_eq!(rungs.kick_time(0..=1), 1.5);
    }

    #[test]
    fn integrand_names_render_as_expressions() {
        assert_eq!(Integrand::Global(GlobalIntegrand::InverseA2).to_string(), "a**(-2)");
        assert_eq!(
            Integrand::Component(ComponentIntegrand::Decay, "dm".into()).to_string(),
            "(a**(-3*w_eff)*Γ/H, dm)"
        );
    }
}

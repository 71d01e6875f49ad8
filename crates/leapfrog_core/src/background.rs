//! Cosmological background.
//!
//! The scheduler only ever talks to a [`Background`]; the two implementations
//! here cover a non-expanding box and a Friedmann universe integrated in-process.

use serde::{Deserialize, Serialize};

use crate::solvers::Rk4;
use crate::traits::DynamicalSystem;

/// Scale factor, Hubble rate and time integrals over the background.
pub trait Background {
    /// Scale factor at cosmic time `t`.
    fn scale_factor(&self, t: f64) -> f64;

    /// Cosmic time at scale factor `a`.
    fn cosmic_time(&self, a: f64) -> f64;

    /// Hubble rate `ȧ/a` at scale factor `a`.
    fn hubble(&self, a: f64) -> f64;

    /// Whether the background expands at all.
    fn hubble_enabled(&self) -> bool;

    /// Advances the internal background state from `(t, a)` over `dt`.
    /// Tabulated backgrounds need not do anything.
    fn expand(&mut self, _a: f64, _t: f64, _dt: f64) {}

    /// `∫ f(a(t)) dt` over `[t_start, t_end]`.
    fn integrate(&self, t_start: f64, t_end: f64, f: &dyn Fn(f64) -> f64) -> f64;
}

/// A box without expansion: `a ≡ 1`, `H ≡ 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticBackground;

impl Background for StaticBackground {
    fn scale_factor(&self, _t: f64) -> f64 {
        1.0
    }

    /// Undefined without expansion.
    fn cosmic_time(&self, _a: f64) -> f64 {
        f64::NAN
    }

    fn hubble(&self, _a: f64) -> f64 {
        0.0
    }

    fn hubble_enabled(&self) -> bool {
        false
    }

    fn integrate(&self, t_start: f64, t_end: f64, f: &dyn Fn(f64) -> f64) -> f64 {
        (t_end - t_start) * f(1.0)
    }
}

/// Density parameters and Hubble constant of a Friedmann universe.
/// Curvature makes up whatever the listed species leave of unity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FriedmannParameters {
    pub h0: f64,
    pub omega_m: f64,
    pub omega_r: f64,
    pub omega_lambda: f64,
}

impl FriedmannParameters {
    pub fn omega_k(&self) -> f64 {
        1.0 - self.omega_m - self.omega_r - self.omega_lambda
    }

    pub fn hubble(&self, a: f64) -> f64 {
        self.h0
            * (self.omega_r / a.powi(4)
                + self.omega_m / a.powi(3)
                + self.omega_k() / a.powi(2)
                + self.omega_lambda)
                .sqrt()
    }
}

impl Default for FriedmannParameters {
    fn default() -> Self {
        Self {
            h0: 1.0,
            omega_m: 0.3,
            omega_r: 0.0,
            omega_lambda: 0.7,
        }
    }
}

/// `da/dt = a H(a)`.
struct ExpansionRate<'a> {
    params: &'a FriedmannParameters,
}

impl DynamicalSystem<f64> for ExpansionRate<'_> {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) {
        out[0] = y[0] * self.params.hubble(y[0]);
    }
}

/// Friedmann background. `expand` integrates the Friedmann equation with RK4
/// across the coming interval; `integrate` then reads `a(t)` off that segment.
#[derive(Debug, Clone)]
pub struct FriedmannBackground {
    params: FriedmannParameters,
    quadrature_points: usize,
    expansion_steps: usize,
    segment: Vec<(f64, f64)>,
}

impl FriedmannBackground {
    pub fn new(params: FriedmannParameters) -> Self {
        Self {
            params,
            quadrature_points: 64,
            expansion_steps: 64,
            segment: Vec::new(),
        }
    }

    pub fn params(&self) -> &FriedmannParameters {
        &self.params
    }

    /// Interpolates `a(t)` within the last expanded segment (cubic Hermite,
    /// slopes `a H(a)`), or `None` when `t` lies outside it.
    fn segment_scale_factor(&self, t: f64) -> Option<f64> {
        let (first, last) = (self.segment.first()?, self.segment.last()?);
        let slack = 1e-12 * (last.0 - first.0).abs().max(f64::MIN_POSITIVE);
        if t < first.0 - slack || t > last.0 + slack {
            return None;
        }
        let idx = self
            .segment
            .partition_point(|&(ti, _)| ti <= t)
            .clamp(1, self.segment.len() - 1);
        let (t0, a0) = self.segment[idx - 1];
        let (t1, a1) = self.segment[idx];
        let h = t1 - t0;
        if h <= 0.0 {
            return Some(a0);
        }
        let s = ((t - t0) / h).clamp(0.0, 1.0);
        let m0 = a0 * self.params.hubble(a0) * h;
        let m1 = a1 * self.params.hubble(a1) * h;
        let s2 = s * s;
        let s3 = s2 * s;
        Some(
            (2.0 * s3 - 3.0 * s2 + 1.0) * a0
                + (s3 - 2.0 * s2 + s) * m0
                + (-2.0 * s3 + 3.0 * s2) * a1
                + (s3 - s2) * m1,
        )
    }
}

impl Background for FriedmannBackground {
    /// Newton iteration on [`Background::cosmic_time`], using `dt/da = 1/(a H)`.
    fn scale_factor(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let p = &self.params;
        let mut a = if p.omega_m > 0.0 {
            (1.5 * p.h0 * p.omega_m.sqrt() * t).powf(2.0 / 3.0)
        } else {
            1.0
        };
        for _ in 0..100 {
            let step = (self.cosmic_time(a) - t) * a * p.hubble(a);
            let mut next = a - step;
            if next <= 0.0 || !next.is_finite() {
                next = 0.5 * a;
            }
            let converged = (next - a).abs() <= 1e-13 * a;
            a = next;
            if converged {
                break;
            }
        }
        a
    }

    /// `t(a) = ∫₀^a da'/(a' H)`, evaluated in `u = √a'` where the integrand is smooth.
    fn cosmic_time(&self, a: f64) -> f64 {
        if a <= 0.0 {
            return 0.0;
        }
        let p = &self.params;
        simpson(0.0, a.sqrt(), 2048, |u| {
            if u == 0.0 {
                0.0
            } else {
                2.0 / (u * p.hubble(u * u))
            }
        })
    }

    fn hubble(&self, a: f64) -> f64 {
        self.params.hubble(a)
    }

    fn hubble_enabled(&self) -> bool {
        true
    }

    fn expand(&mut self, a: f64, t: f64, dt: f64) {
        self.segment.clear();
        if dt <= 0.0 || !a.is_finite() || a <= 0.0 {
            return;
        }
        self.segment.push((t, a));
        let system = ExpansionRate {
            params: &self.params,
        };
        let mut solver = Rk4::new(1);
        let mut time = t;
        let mut state = [a];
        let segment = &mut self.segment;
        solver.integrate(
            &system,
            &mut time,
            &mut state,
            dt,
            self.expansion_steps,
            |ti, y| segment.push((ti, y[0])),
        );
    }

    fn integrate(&self, t_start: f64, t_end: f64, f: &dyn Fn(f64) -> f64) -> f64 {
        simpson(t_start, t_end, self.quadrature_points, |t| {
            let a = self
                .segment_scale_factor(t)
                .unwrap_or_else(|| self.scale_factor(t));
            f(a)
        })
    }
}

/// Composite Simpson rule with `intervals` (rounded up to even) sub-intervals.
pub(crate) fn simpson(x0: f64, x1: f64, intervals: usize, f: impl Fn(f64) -> f64) -> f64 {
    let n = (intervals.max(2) + 1) & !1;
    let h = (x1 - x0) / n as f64;
    let mut sum = f(x0) + f(x1);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(x0 + h * i as f64);
    }
    sum * h / 3.0
}

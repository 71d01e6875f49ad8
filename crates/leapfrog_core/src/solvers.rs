use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic fourth-order Runge-Kutta stepper with preallocated stage buffers.
pub struct Rk4<T: Scalar> {
    k: [Vec<T>; 4],
    tmp: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
    pub fn new(dim: usize) -> Self {
        let zero = vec![T::zero(); dim];
        Self {
            k: [zero.clone(), zero.clone(), zero.clone(), zero.clone()],
            tmp: zero,
        }
    }

    /// Integrates over `span` using `steps` equal steps, handing every
    /// intermediate `(t, state)` to `visit`.
    pub fn integrate<S, F>(
        &mut self,
        system: &S,
        t: &mut T,
        state: &mut [T],
        span: T,
        steps: usize,
        mut visit: F,
    ) where
        S: DynamicalSystem<T>,
        F: FnMut(T, &[T]),
    {
        let steps = steps.max(1);
        let dt = span / T::from_usize(steps).unwrap_or_else(T::one);
        for _ in 0..steps {
            self.step(system, t, state, dt);
            visit(*t, state);
        }
    }
}

impl<T: Scalar> Steppable<T> for Rk4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let two = T::one() + T::one();
        let half = dt / two;
        let sixth = dt / (two + two + two);
        let t0 = *t;
        let [k1, k2, k3, k4] = &mut self.k;

        system.apply(t0, state, k1);
        stage(&mut self.tmp, state, k1, half);
        system.apply(t0 + half, &self.tmp, k2);
        stage(&mut self.tmp, state, k2, half);
        system.apply(t0 + half, &self.tmp, k3);
        stage(&mut self.tmp, state, k3, dt);
        system.apply(t0 + dt, &self.tmp, k4);

        for i in 0..state.len() {
            state[i] = state[i] + sixth * (k1[i] + two * k2[i] + two * k3[i] + k4[i]);
        }
        *t = t0 + dt;
    }
}

fn stage<T: Scalar>(out: &mut [T], y: &[T], k: &[T], h: T) {
    for ((o, &y), &k) in out.iter_mut().zip(y).zip(k) {
        *o = y + h * k;
    }
}

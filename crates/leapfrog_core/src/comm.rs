//! Collective operations across the cooperating worker processes.
//!
//! Every call is a rendezvous: all processes must make the same sequence of
//! calls. The scheduler relies on this only through the operations below.

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// The process that performs side effects such as logging and bookkeeping.
    fn is_master(&self) -> bool {
        self.rank() == 0
    }

    fn allreduce_max(&self, value: usize) -> usize;

    fn allreduce_sum(&self, value: usize) -> usize;

    fn allreduce_max_f64(&self, value: f64) -> f64;

    fn allreduce_sum_f64(&self, value: f64) -> f64;

    fn allreduce_or(&self, value: bool) -> bool;

    /// Element-wise logical or, in place.
    fn allreduce_or_slice(&self, values: &mut [bool]);

    /// Master's value of `value`, on every process.
    fn broadcast_bool(&self, value: bool) -> bool;

    fn barrier(&self);
}

/// The communicator of a run with a single process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_max(&self, value: usize) -> usize {
        value
    }

    fn allreduce_sum(&self, value: usize) -> usize {
        value
    }

    fn allreduce_max_f64(&self, value: f64) -> f64 {
        value
    }

    fn allreduce_sum_f64(&self, value: f64) -> f64 {
        value
    }

    fn allreduce_or(&self, value: bool) -> bool {
        value
    }

    fn allreduce_or_slice(&self, _values: &mut [bool]) {}

    fn broadcast_bool(&self, value: bool) -> bool {
        value
    }

    fn barrier(&self) {}
}

//! Bound functions for bounded search.
//!
//! A bound function assigns every execution a nonnegative value and must be
//! monotonic and local: the value of a one-step extension is the value of
//! the prefix plus a step value computable from the last transition and the
//! next thread alone. The driver stores the running value in its per-frame
//! state and caps exploration at a configured bound.

mod preemptions;
pub use self::preemptions::Preemptions;

use crate::program::{Execution, Tid, TidSet, Transition};

/// Value of a bound function.
pub type BoundValue = u64;

/// Per-frame state carrying the running bound value of its prefix.
pub trait BoundValued {
    fn bound_value(&self) -> BoundValue;
}

/// A monotonic, local bound function.
pub trait BoundFunction {
    fn name() -> &'static str;

    /// Step value of scheduling `tid` from the empty prefix.
    fn initial_step_value(tid: Tid) -> BoundValue;

    /// Step value of scheduling `tid` after `last`.
    fn step_value(last: Transition<'_>, tid: Tid) -> BoundValue;

    /// A tid from `candidates` with minimal bound value after
    /// `pre(E, index)`, preferring `prioritize`.
    fn min_value(
        execution: &Execution,
        index: usize,
        candidates: &TidSet,
        prioritize: &TidSet,
    ) -> Tid;

    /// The greatest `1 < j < index` with a context switch at `j-1 -> j`,
    /// else 1.
    fn last_context_switch_before(execution: &Execution, index: usize) -> usize;
}

/// The bound value of `pre(E, index)` extended with a step of `tid`, read
/// off the per-frame values in `frames`.
pub fn value<F: BoundFunction, S: BoundValued>(
    execution: &Execution,
    frames: &[S],
    index: usize,
    tid: Tid,
) -> BoundValue {
    assert!(index <= execution.len() && index < frames.len());
    if index < 1 {
        F::initial_step_value(tid)
    } else {
        frames[index].bound_value() + F::step_value(execution.transition(index), tid)
    }
}

use crate::exploration::dependence::{coenabled, dependent};
use crate::exploration::VectorClock;
use crate::program::{Execution, Instruction, Tid, TidSet, Transition};

use std::collections::BTreeSet;

use tracing::trace;

/// The happens-before relation of an execution, built incrementally while
/// the driver explores.
///
/// `clocks[i]` is the vector clock of transition `i`; `clocks[0]` is the
/// all-zero clock. The relation is irreflexive: `clocks[i][t]` refers to
/// the previous transition by thread `t`, so in particular
/// `clocks[i][instr.tid] < i`.
///
/// A frontier caches, per thread, the clock of that thread's most recent
/// transition in the restored prefix, with the thread's own entry bumped to
/// the transition index. The frontier is rebuilt by [`restore`] after
/// [`pop_back`] invalidated it; callers sequence those through the
/// preconditions asserted here.
///
/// Queries take the [`Execution`] explicitly; the relation never holds a
/// borrow of it.
///
/// [`restore`]: HappensBefore::restore
/// [`pop_back`]: HappensBefore::pop_back
#[derive(Debug)]
pub struct HappensBefore {
    clocks: Vec<VectorClock>,
    frontier: Vec<VectorClock>,
    /// Prefix index the frontier is valid for.
    index: usize,
    width: usize,
}

impl HappensBefore {
    pub fn new(nr_threads: usize) -> HappensBefore {
        HappensBefore {
            clocks: vec![VectorClock::new(nr_threads)],
            frontier: vec![VectorClock::new(nr_threads); nr_threads],
            index: 0,
            width: nr_threads,
        }
    }

    /// Number of clocks, i.e. the defined prefix length plus one.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// The clock of transition `i`.
    pub fn clock(&self, i: usize) -> &VectorClock {
        &self.clocks[i]
    }

    /// Resets the frontier for a new replay. Clocks of the retained prefix
    /// survive; if the trace now reports a different thread count, they are
    /// lifted to the new width.
    pub fn reset(&mut self, nr_threads: usize) {
        if nr_threads != self.width {
            self.width = nr_threads;
            for clock in &mut self.clocks {
                *clock = VectorClock::copy_extend(clock, nr_threads);
            }
        }
        self.frontier = vec![VectorClock::new(nr_threads); nr_threads];
        self.index = 0;
    }

    /// Appends the clock of transition `i`, which must extend the defined
    /// prefix by exactly one.
    pub fn update(&mut self, execution: &Execution, i: usize) {
        assert!(self.defined_on_prefix(i - 1) && self.frontier_valid_for(i - 1));
        let clock = self.create_clock(execution, i, execution.transition(i).instr());
        trace!(index = i, ?clock, "happens-before update");
        self.clocks.push(clock);
        self.update_frontier(execution.transition(i));
        debug_assert!(self.defined_on_prefix(i) && self.frontier_valid_for(i));
    }

    /// Re-materializes the frontier for transition `i` from the stored
    /// clock; used when the driver re-enters a previously explored prefix.
    pub fn restore(&mut self, execution: &Execution, i: usize) {
        assert!(self.not_restored() && self.frontier_valid_for(i - 1));
        self.update_frontier(execution.transition(i));
        debug_assert!(self.defined_on_prefix(i) && self.frontier_valid_for(i));
    }

    /// Discards the last clock. The frontier is invalid afterwards, until
    /// [`restore`](HappensBefore::restore) has walked back to the top.
    pub fn pop_back(&mut self) {
        self.clocks.pop();
        self.index = 0;
    }

    /// `HB(E[i1], E[i2])`
    pub fn happens_before(&self, execution: &Execution, i1: usize, i2: usize) -> bool {
        assert!(self.defined_on_prefix(i1.max(i2)));
        self.happens_before_clock(execution, i1, &self.clocks[i2])
    }

    /// Removes incoming edges of `clock2` that are also incoming edges of
    /// transition `i1`.
    pub fn transitive_reduction(&self, execution: &Execution, i1: usize, clock2: &mut VectorClock) {
        debug_assert!(self.happens_before_clock(execution, i1, clock2));
        clock2.filter_greater_than(&self.clocks[i1]);
    }

    /// Removes `tid`-thread-transitive edges from `clock`.
    pub fn thread_transitive_reduction(
        &self,
        execution: &Execution,
        i: usize,
        tid: Tid,
        clock: &mut VectorClock,
    ) {
        assert!(self.frontier_valid_for(i));
        clock.filter_greater_than(&self.previous_by(execution, tid));
        clock.set(tid, 0);
    }

    /// The threads with a transition after `ifrom` in `pre(E, i)` that
    /// reaches `tid` thread-transitively.
    pub fn thread_transitive_relation(
        &self,
        execution: &Execution,
        i: usize,
        ifrom: usize,
        tid: Tid,
    ) -> TidSet {
        assert!(self.frontier_valid_for(i));
        self.previous_by(execution, tid).indices_where(|value| value > ifrom)
    }

    /// `{ j | i1 < j < i2, !HB(E[i1], E[j]) }`
    pub fn incomparable_after(&self, execution: &Execution, i1: usize, i2: usize) -> BTreeSet<usize> {
        (i1 + 1..i2)
            .filter(|&j| !self.happens_before(execution, i1, j))
            .collect()
    }

    /// The indices `i` of `subseq` such that no earlier `j` in `subseq`
    /// happens-before `i`.
    pub fn front(&self, execution: &Execution, subseq: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut front = BTreeSet::new();
        if subseq.is_empty() {
            return front;
        }
        let mut first_seen = VectorClock::new(self.width);
        let mut last_seen = VectorClock::new(self.width);
        for &i in subseq {
            let tid = execution.transition(i).instr().tid();
            let clock = &self.clocks[i];
            if first_seen[tid] == 0 {
                let seen_before = (0..self.width).any(|other| {
                    last_seen[other] > 0
                        && first_seen[other] <= clock[other]
                        && clock[other] <= last_seen[other]
                });
                if !seen_before {
                    front.insert(i);
                }
                first_seen.set(tid, i);
            } else {
                // transitions by tid in subseq do not skip transitions by tid
                debug_assert_eq!(last_seen[tid], clock[tid]);
            }
            last_seen.set(tid, i);
        }
        front
    }

    /// Maps transition indices to the threads performing them.
    pub fn tids(&self, execution: &Execution, indices: &BTreeSet<usize>) -> TidSet {
        indices
            .iter()
            .map(|&i| execution.transition(i).instr().tid())
            .collect()
    }

    /// Index of the most recent transition in `pre(E, i)` dependent with
    /// `instr`, optionally restricted to thread-transitively-reduced and
    /// co-enabled candidates. 0 iff there is none.
    pub fn max_dependent(
        &self,
        execution: &Execution,
        i: usize,
        instr: &Instruction,
        ttr: bool,
        coenabledness: bool,
    ) -> usize {
        assert!(self.frontier_valid_for(i));
        let mut clock = self.clock_for(execution, i, instr);
        if ttr {
            self.thread_transitive_reduction(execution, i, instr.tid(), &mut clock);
        }
        clock.set(instr.tid(), 0);
        if !coenabledness {
            return clock[clock.max_index()];
        }
        loop {
            let tid_j = clock.max_index();
            let j = clock[tid_j];
            if j == 0 {
                return 0;
            }
            let instr_j = execution.transition(j).instr();
            debug_assert_eq!(instr_j.tid(), tid_j);
            if dependent(instr_j, instr) && coenabled(instr_j, instr) {
                return j;
            }
            // step to the previous transition by that thread
            clock.set(tid_j, self.clocks[j][tid_j]);
        }
    }

    /// For each thread other than `instr.tid`, the most recent transition
    /// of that thread in `pre(E, i)` that is dependent with `instr`.
    pub fn max_dependent_per_thread(
        &self,
        execution: &Execution,
        i: usize,
        instr: &Instruction,
        ttr: bool,
    ) -> BTreeSet<usize> {
        assert!(self.frontier_valid_for(i));
        let mut max_dep = BTreeSet::new();
        let mut clock = self.clock_for(execution, i, instr);
        if ttr {
            self.thread_transitive_reduction(execution, i, instr.tid(), &mut clock);
        }
        clock.set(instr.tid(), 0);
        loop {
            let tid_j = clock.max_index();
            let j = clock[tid_j];
            if j == 0 {
                break;
            }
            let instr_j = execution.transition(j).instr();
            debug_assert_eq!(instr_j.tid(), tid_j);
            if dependent(instr_j, instr) {
                max_dep.insert(j);
                clock.set(tid_j, 0);
            } else {
                clock.set(tid_j, self.clocks[j][tid_j]);
            }
        }
        max_dep
    }

    /// `{ 0 < j < i | E[j] <: E[i] }`: the transitions that happen-before
    /// `instr` at `i` without an intermediate transition between them.
    pub fn covering(&self, execution: &Execution, i: usize, instr: &Instruction) -> BTreeSet<usize> {
        let mut clock = self.clock_for(execution, i, instr);
        self.thread_transitive_reduction(execution, i, instr.tid(), &mut clock);
        clock.set(instr.tid(), 0);
        let mut covering = BTreeSet::new();
        // every iteration zeroes one entry of the clock
        loop {
            let tid_j = clock.max_index();
            let j = clock[tid_j];
            if j == 0 {
                break;
            }
            debug_assert_eq!(execution.transition(j).instr().tid(), tid_j);
            covering.insert(j);
            self.transitive_reduction(execution, j, &mut clock);
            clock.set(tid_j, 0);
        }
        covering
    }

    // Preconditions

    /// The relation is defined on `pre(E, i)`.
    pub fn defined_on_prefix(&self, i: usize) -> bool {
        i <= self.clocks.len() - 1
    }

    pub fn frontier_valid_for(&self, i: usize) -> bool {
        self.index == i
    }

    pub fn not_restored(&self) -> bool {
        self.index < self.clocks.len() - 1
    }

    // Helpers

    fn happens_before_clock(&self, execution: &Execution, i1: usize, clock2: &VectorClock) -> bool {
        clock2[execution.transition(i1).instr().tid()] >= i1
    }

    fn update_frontier(&mut self, t: Transition<'_>) {
        let tid = t.instr().tid();
        assert!(tid < self.width, "tid {} out of range for {} threads", tid, self.width);
        self.frontier[tid] = self.clocks[t.index()].clone();
        self.frontier[tid].set(tid, t.index());
        self.index += 1;
    }

    /// The clock of the previous transition by `tid` in the restored
    /// prefix. The two cases yield different clocks: for the thread of the
    /// frontier transition itself the own entry is not bumped.
    fn previous_by(&self, execution: &Execution, tid: Tid) -> VectorClock {
        assert!(self.index >= 1);
        if execution.transition(self.index).instr().tid() == tid {
            self.clocks[self.clocks[self.index][tid]].clone()
        } else {
            self.frontier[tid].clone()
        }
    }

    /// The happens-before edges `instr` has (or would have) at prefix
    /// index `i`.
    fn clock_for(&self, execution: &Execution, i: usize, instr: &Instruction) -> VectorClock {
        if instr.tid() == execution.transition(i).instr().tid() {
            self.clocks[i].clone()
        } else {
            self.create_clock(execution, i, instr)
        }
    }

    /// Computes the clock `instr` would have if appended as transition `i`
    /// of the current prefix.
    ///
    /// Iterates backwards over the prefix collecting, per thread, the
    /// maximal dependent transition. The guard `j > clock[tid_j]` skips
    /// thread-transitively covered indices; bounding the scan by the
    /// minimum clock entry keeps the walk short once every thread
    /// contributed an edge.
    fn create_clock(&self, execution: &Execution, i: usize, instr: &Instruction) -> VectorClock {
        let mut clock = VectorClock::new(self.width);
        let mut min = clock.min_element();
        let mut j = i - 1;
        while j > min {
            let instr_j = execution.transition(j).instr();
            if j > clock[instr_j.tid()] && dependent(instr_j, instr) {
                clock.pointwise_max(&self.clocks[j]);
                clock.set(instr_j.tid(), j);
                min = clock.min_element();
            }
            j -= 1;
        }
        // clock[instr.tid] < i
        clock
    }
}

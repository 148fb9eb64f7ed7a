use crate::exploration::bound_functions::{BoundFunction, BoundValue};
use crate::program::{Execution, Tid, TidSet, Transition};

/// Counts preemptions: context switches away from a thread that was still
/// enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preemptions;

impl Preemptions {
    fn context_switch(tid1: Tid, tid2: Tid) -> bool {
        tid1 != tid2
    }

    fn step_is_free(execution: &Execution, index: usize, tid: Tid) -> bool {
        if index < 1 {
            Self::initial_step_value(tid) == 0
        } else {
            Self::step_value(execution.transition(index), tid) == 0
        }
    }
}

impl BoundFunction for Preemptions {
    fn name() -> &'static str {
        "preemptions"
    }

    fn initial_step_value(_tid: Tid) -> BoundValue {
        0
    }

    fn step_value(last: Transition<'_>, tid: Tid) -> BoundValue {
        let preempted = Self::context_switch(last.instr().tid(), tid)
            && last.post().is_enabled(last.instr().tid());
        preempted as BoundValue
    }

    /// Exploits that preemptions are monotonic with step values in {0, 1}:
    /// any candidate with step value 0 is minimal.
    fn min_value(
        execution: &Execution,
        index: usize,
        candidates: &TidSet,
        prioritize: &TidSet,
    ) -> Tid {
        assert!(!candidates.is_empty());
        if let Some(&tid) = prioritize
            .iter()
            .find(|&&tid| Self::step_is_free(execution, index, tid))
        {
            return tid;
        }
        if let Some(&tid) = candidates
            .iter()
            .find(|&&tid| Self::step_is_free(execution, index, tid))
        {
            return tid;
        }
        *candidates.iter().next().unwrap()
    }

    fn last_context_switch_before(execution: &Execution, index: usize) -> usize {
        assert!(index > 0);
        let mut j = index - 1;
        while j > 1 {
            let previous = execution.transition(j - 1).instr().tid();
            let current = execution.transition(j).instr().tid();
            if Self::context_switch(previous, current) {
                return j;
            }
            j -= 1;
        }
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exploration::bound_functions::{value, BoundValued};
    use crate::exploration::testing::{execution_of, store};

    struct Frame(BoundValue);

    impl BoundValued for Frame {
        fn bound_value(&self) -> BoundValue {
            self.0
        }
    }

    fn two_writers() -> Execution {
        let threads = vec![vec![store(0, 0), store(0, 0)], vec![store(1, 1)]];
        execution_of(2, threads, &[0, 1, 0])
    }

    #[test]
    fn switching_away_from_an_enabled_thread_is_a_preemption() {
        let execution = two_writers();
        // after t0's first store, t0 is still enabled
        assert_eq!(Preemptions::step_value(execution.transition(1), 1), 1);
        assert_eq!(Preemptions::step_value(execution.transition(1), 0), 0);
        // after t1's only store, t1 is done: switching back is free
        assert_eq!(Preemptions::step_value(execution.transition(2), 0), 0);
    }

    #[test]
    fn value_accumulates_over_frames() {
        let execution = two_writers();
        let frames = vec![Frame(0), Frame(0), Frame(1), Frame(1)];
        assert_eq!(value::<Preemptions, _>(&execution, &frames, 0, 1), 0);
        assert_eq!(value::<Preemptions, _>(&execution, &frames, 1, 1), 1);
        assert_eq!(value::<Preemptions, _>(&execution, &frames, 3, 1), 1);
    }

    #[test]
    fn min_value_prefers_non_preempting_threads() {
        let execution = two_writers();
        let candidates: TidSet = [0, 1].into_iter().collect();
        // after transition 1, scheduling t0 is free, t1 preempts
        assert_eq!(Preemptions::min_value(&execution, 1, &candidates, &TidSet::new()), 0);
        // a prioritized free thread wins
        let prioritize: TidSet = [0].into_iter().collect();
        assert_eq!(Preemptions::min_value(&execution, 1, &candidates, &prioritize), 0);
        // an empty prefix makes every step free, so priority decides
        let prioritize: TidSet = [1].into_iter().collect();
        assert_eq!(Preemptions::min_value(&execution, 0, &candidates, &prioritize), 1);
    }

    #[test]
    fn last_context_switch_is_found() {
        let execution = two_writers();
        // switches at 1->2 and 2->3; before index 3 the last one is at 2
        assert_eq!(Preemptions::last_context_switch_before(&execution, 3), 2);
    }

    #[test]
    fn last_context_switch_defaults_to_one() {
        // a switch-free prefix still reports index 1; the conservative
        // backtrack point then lands at the root
        let threads = vec![vec![store(0, 0), store(0, 0), store(0, 0)]];
        let execution = execution_of(1, threads, &[0, 0, 0]);
        assert_eq!(Preemptions::last_context_switch_before(&execution, 3), 1);
        assert_eq!(Preemptions::last_context_switch_before(&execution, 1), 1);
    }
}

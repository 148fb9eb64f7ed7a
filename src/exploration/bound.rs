use crate::exploration::bound_functions::{value, BoundFunction, BoundValue, BoundValued};
use crate::exploration::Reduction;
use crate::program::{Execution, Tid, TidSet};
use crate::scheduler::SchedulerSettings;

use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::Path;

use tracing::trace;

/// Per-frame state of a bounded search: the bound value of the prefix
/// ending at the frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundState {
    bound_value: BoundValue,
}

impl BoundValued for BoundState {
    fn bound_value(&self) -> BoundValue {
        self.bound_value
    }
}

/// Plain bounded search: explore every schedule whose bound value stays
/// within the bound. No happens-before reasoning, no sleep sets.
#[derive(Debug)]
pub struct Bound<F> {
    frames: Vec<BoundState>,
    bound: BoundValue,
    _bound_function: PhantomData<F>,
}

impl<F: BoundFunction> Bound<F> {
    pub fn new(bound: BoundValue) -> Bound<F> {
        Bound {
            frames: vec![BoundState::default()],
            bound,
            _bound_function: PhantomData,
        }
    }
}

impl<F: BoundFunction> Reduction for Bound<F> {
    fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings::Nonpreemptive
    }

    fn write_scheduler_files(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    fn check_valid(&self, _contains_locks: bool) -> bool {
        true
    }

    fn reset(&mut self, _execution: &Execution) {}

    fn restore_state(&mut self, _execution: &Execution, _index: usize) {}

    fn update_state(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index);
        let tid = execution.transition(index).instr().tid();
        let bound_value = value::<F, _>(execution, &self.frames, index - 1, tid);
        trace!(index, bound_value, "bound update");
        self.frames.push(BoundState { bound_value });
    }

    fn update_after_exploration(&mut self, _execution: &Execution, _index: usize) {}

    fn pool(&mut self, execution: &Execution) -> TidSet {
        execution
            .final_state()
            .enabled()
            .iter()
            .copied()
            .filter(|&tid| {
                value::<F, _>(execution, &self.frames, execution.len(), tid) <= self.bound
            })
            .collect()
    }

    fn select_from_pool(&mut self, _execution: &Execution, pool: &TidSet) -> Option<Tid> {
        assert!(!pool.is_empty());
        pool.iter().next().copied()
    }

    fn pop_back(&mut self) {
        self.frames.pop();
    }

    fn update_statistics(&mut self, _execution: &Execution) {}

    fn close(&self, _statistics_path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn path(&self) -> String {
        if self.bound == BoundValue::MAX {
            format!("bound/{}/unbounded", F::name())
        } else {
            format!("bound/{}/{}", F::name(), self.bound)
        }
    }

    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()> {
        write!(out, "bval={}", self.frames[index].bound_value)
    }
}

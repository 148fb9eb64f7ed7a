use crate::exploration::{Mode, Reduction};
use crate::program::{Execution, TidSet};
use crate::scheduler::{Schedule, SchedulerSettings};

use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, trace};

/// Per-frame driver state: the threads already explored from this point.
#[derive(Debug, Clone, Default)]
struct DfsFrame {
    done: TidSet,
}

impl DfsFrame {
    fn undone(&self, tids: &TidSet) -> TidSet {
        tids.difference(&self.done).copied().collect()
    }
}

/// Depth-first traversal of the state space, treating the execution as a
/// stack.
///
/// The wrapped [`Reduction`] restricts the pool of threads to explore at
/// each internal node; the driver tracks which of them have been done and
/// synthesizes the next schedule on backtracking.
#[derive(Debug)]
pub struct DepthFirstSearch<R> {
    frames: Vec<DfsFrame>,
    reduction: R,
}

impl<R: Reduction> DepthFirstSearch<R> {
    pub fn new(reduction: R) -> DepthFirstSearch<R> {
        DepthFirstSearch { frames: vec![DfsFrame::default()], reduction }
    }

    pub fn reduction(&self) -> &R {
        &self.reduction
    }

    #[cfg(test)]
    pub(crate) fn nr_frames(&self) -> usize {
        self.frames.len()
    }

    fn update_after_exploration(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index + 1);
        let tid = execution.transition(index).instr().tid();
        trace!(index, tid, "done");
        self.frames[index - 1].done.insert(tid);
        self.reduction.update_after_exploration(execution, index);
    }

    fn pop_back(&mut self, execution: &mut Execution, schedule: &mut Schedule) {
        execution.pop_last();
        self.frames.pop();
        self.reduction.pop_back();
        schedule.pop();
    }
}

impl<R: Reduction> Mode for DepthFirstSearch<R> {
    fn scheduler_settings(&self) -> SchedulerSettings {
        self.reduction.scheduler_settings()
    }

    fn write_scheduler_files(&self, dir: &Path) -> io::Result<()> {
        self.reduction.write_scheduler_files(dir)
    }

    fn check_valid(&self, contains_locks: bool) -> bool {
        self.reduction.check_valid(contains_locks)
    }

    fn reset(&mut self, execution: &Execution) {
        self.reduction.reset(execution);
    }

    fn update_statistics(&mut self, execution: &Execution) {
        self.reduction.update_statistics(execution);
    }

    fn restore_state(&mut self, execution: &Execution, index: usize) {
        assert!(self.frames.len() > index);
        self.reduction.restore_state(execution, index);
    }

    fn update_state(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index);
        self.frames.push(DfsFrame::default());
        self.reduction.update_state(execution, index);
        debug_assert_eq!(self.frames.len(), index + 1);
    }

    /// Backtracks along the current execution until a frame still has an
    /// unexplored thread in the reduction's pool, then extends the
    /// schedule with it. Leaves the schedule empty when the whole tree is
    /// explored.
    fn new_schedule(&mut self, execution: &mut Execution, schedule: &mut Schedule) {
        while !execution.is_empty() {
            self.update_after_exploration(execution, execution.len());
            self.pop_back(execution, schedule);

            let pool = self.reduction.pool(execution);
            let pool_undone = self.frames.last().unwrap().undone(&pool);
            trace!(depth = execution.len(), ?pool_undone, "backtracked");
            if pool_undone.is_empty() {
                continue;
            }
            if let Some(next) = self.reduction.select_from_pool(execution, &pool_undone) {
                // the pool is a subset of the enabled threads
                assert!(
                    execution.final_state().is_enabled(next),
                    "selected thread {} is not enabled",
                    next
                );
                debug!(depth = execution.len(), next, "new schedule");
                schedule.push(next);
                break;
            }
        }
    }

    fn close(&self, statistics_path: &Path) -> io::Result<()> {
        self.reduction.close(statistics_path)
    }

    fn path(&self) -> String {
        format!("depth_first_search/{}", self.reduction.path())
    }

    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()> {
        write!(out, "done={{")?;
        for (i, tid) in self.frames[index].done.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            write!(out, "{}", tid)?;
        }
        write!(out, "}} ")?;
        self.reduction.dump_state(out, index)
    }
}

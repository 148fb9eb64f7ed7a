use crate::exploration::{HappensBefore, SleepSet};
use crate::program::{Execution, Tid, TidSet};

use std::fmt;
use std::io;

/// Per-frame record of what must still be explored from a state.
///
/// `backtrack` accumulates threads the reduction decided must be scheduled
/// from this point; `sleep` records threads whose exploration here would be
/// redundant. The driver explores `backtrack \ done` intersected with the
/// awake threads.
#[derive(Debug, Clone, Default)]
pub struct SufficientSet {
    backtrack: TidSet,
    sleep: SleepSet,
}

impl SufficientSet {
    pub fn new() -> SufficientSet {
        SufficientSet::default()
    }

    pub fn with_sleep(sleep: SleepSet) -> SufficientSet {
        SufficientSet { backtrack: TidSet::new(), sleep }
    }

    pub fn backtrack(&self) -> &TidSet {
        &self.backtrack
    }

    pub fn add_to_backtrack(&mut self, tid: Tid) {
        self.backtrack.insert(tid);
    }

    pub fn add_all_to_backtrack(&mut self, tids: &TidSet) {
        self.backtrack.extend(tids);
    }

    pub fn sleep(&self) -> &SleepSet {
        &self.sleep
    }

    pub fn sleep_mut(&mut self) -> &mut SleepSet {
        &mut self.sleep
    }

    pub fn wake_up(&mut self, tid: Tid) {
        self.sleep.wake_up(tid);
    }
}

impl fmt::Display for SufficientSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "backtrack={{")?;
        for (i, tid) in self.backtrack.iter().enumerate() {
            if i > 0 {
                write!(fmt, ",")?;
            }
            write!(fmt, "{}", tid)?;
        }
        write!(fmt, "}} sleep={{{}}}", self.sleep)
    }
}

/// A `(tid, prefix index)` pair recording that `tid` must be scheduled in
/// some alternate exploration from prefix index `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktrackPoint {
    pub tid: Tid,
    pub index: usize,
}

impl fmt::Display for BacktrackPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "(tid={}, index={})", self.tid, self.index)
    }
}

/// A sufficient-set formulation pluggable into [`Dpor`].
///
/// Given the happens-before relation, an implementation decides where
/// backtrack points go and which thread to place there, such that exploring
/// every frame's backtrack set preserves the completeness guarantee of the
/// formulation.
///
/// [`Dpor`]: crate::exploration::Dpor
pub trait SufficientSetPolicy {
    /// Output-directory fragment naming this policy.
    fn path(&self) -> String;

    /// Whether the policy can soundly explore a program of this shape.
    fn check_valid(&self, _contains_locks: bool) -> bool {
        true
    }

    /// Called for each new transition, after the happens-before relation
    /// was extended to it.
    fn update_state(&mut self, _execution: &Execution, _index: usize) {}

    /// The backtrack points transition `index` gives rise to.
    fn backtrack_points(
        &self,
        execution: &Execution,
        index: usize,
        hb: &HappensBefore,
    ) -> Vec<BacktrackPoint>;

    /// Materializes one backtrack point into the frame stack.
    fn add_backtrack_point(
        &mut self,
        execution: &Execution,
        index: usize,
        frames: &mut [SufficientSet],
        hb: &HappensBefore,
        point: BacktrackPoint,
    );

    /// Called when the subtree below transition `index` is fully explored;
    /// `pre` is the frame of its pre-state.
    fn update_after_exploration(
        &mut self,
        _execution: &Execution,
        _index: usize,
        _pre: &mut SufficientSet,
    ) {
    }

    /// Lets the policy extend the pool of threads to explore.
    fn add_to_pool(&self, _pool: &mut TidSet) {}

    /// Whether `tid` may be selected from the pool at the current frame.
    fn condition(&mut self, _execution: &Execution, _frame: &mut SufficientSet, _tid: Tid) -> bool {
        true
    }

    fn pop_back(&mut self) {}

    /// Writes the per-frame state dump for `exploration<N>.txt`.
    fn dump_state(&self, _out: &mut dyn io::Write, _index: usize) -> io::Result<()> {
        Ok(())
    }
}

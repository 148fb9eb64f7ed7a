use crate::exploration::bound_functions::{value, BoundFunction, BoundValue, BoundValued};
use crate::exploration::{
    BacktrackPoint, HappensBefore, Persistent, SufficientSet, SufficientSetPolicy,
};
use crate::program::{Execution, State, Tid, TidSet};

use std::io::{self, Write};
use std::marker::PhantomData;

use tracing::trace;

/// How sleep sets may be combined with a bounded exploration.
///
/// A plain search may put a thread to sleep at a node because it explored
/// the *entire* subtree reachable through it; a bounded search may have
/// trimmed that subtree, making the sleep unsound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepSetMode {
    Never,
    /// Sleep a backtracked thread only if the bound was not exceeded in
    /// the subtree rooted at it.
    Conservative,
}

/// Optimization switches for [`BoundPersistent`] (Coons et al.).
#[derive(Debug, Clone, Copy)]
pub struct BoundPersistentOptions {
    /// Add backtrack points only for dependencies in the thread-transitive
    /// reduction of the happens-before relation.
    pub transitive_reduction: bool,
    /// When the preferred thread is unavailable at a backtrack point, look
    /// for a single alternative instead of adding every enabled thread.
    pub alternative_thread: bool,
    /// Defer conservative backtrack points into a pending set that only
    /// materializes if the subtree was trimmed; with a sufficiently high
    /// bound the search then behaves exactly like persistent sets.
    pub bound_opt: bool,
    pub sleep_sets: SleepSetMode,
}

impl BoundPersistentOptions {
    pub fn new(
        transitive_reduction: bool,
        alternative_thread: bool,
        bound_opt: bool,
        sleep_sets: SleepSetMode,
    ) -> BoundPersistentOptions {
        BoundPersistentOptions {
            transitive_reduction,
            alternative_thread,
            // sleep sets require the pending set to stay sound
            bound_opt: bound_opt || sleep_sets != SleepSetMode::Never,
            sleep_sets,
        }
    }

    fn path(&self) -> String {
        let mut path = String::new();
        path.push_str(if self.transitive_reduction { "TR" } else { "tr" });
        path.push_str(if self.alternative_thread { "-ALT" } else { "-alt" });
        path.push_str(if self.bound_opt { "-B" } else { "-b" });
        path.push_str(match self.sleep_sets {
            SleepSetMode::Never => "-sNEV",
            SleepSetMode::Conservative => "-sCONS",
        });
        path
    }
}

impl Default for BoundPersistentOptions {
    fn default() -> BoundPersistentOptions {
        BoundPersistentOptions::new(true, true, true, SleepSetMode::Conservative)
    }
}

/// Per-frame state: the running bound value, the deferred backtrack
/// candidates, and whether a descendant exceeded the bound.
#[derive(Debug, Clone, Default)]
struct Frame {
    bound_value: BoundValue,
    pending: TidSet,
    bound_exceeded: bool,
}

impl BoundValued for Frame {
    fn bound_value(&self) -> BoundValue {
        self.bound_value
    }
}

/// Bound-persistent sufficient sets (Coons, Musuvathi & McKinley).
///
/// Combines partial-order reduction with a bounded search while keeping
/// bounded completeness: for every execution within the bound, an
/// equivalent one is explored. Backtrack points are placed per dependent
/// thread, and each non-conservative point is paired with a conservative
/// one at the last context switch before it, covering schedules the bound
/// would otherwise cut off.
#[derive(Debug)]
pub struct BoundPersistent<F> {
    frames: Vec<Frame>,
    options: BoundPersistentOptions,
    bound: BoundValue,
    _bound_function: PhantomData<F>,
}

impl<F: BoundFunction> BoundPersistent<F> {
    pub fn new(bound: BoundValue) -> BoundPersistent<F> {
        BoundPersistent::with_options(bound, BoundPersistentOptions::default())
    }

    pub fn with_options(bound: BoundValue, options: BoundPersistentOptions) -> BoundPersistent<F> {
        BoundPersistent {
            frames: vec![Frame::default()],
            options,
            bound,
            _bound_function: PhantomData,
        }
    }

    fn use_sleep_sets(&self) -> bool {
        self.options.sleep_sets != SleepSetMode::Never
    }

    fn adding_condition(&self, state: &State, frame: &SufficientSet, tid: Tid) -> bool {
        if self.use_sleep_sets() {
            state.is_enabled(tid) && frame.sleep().is_awake(tid)
        } else {
            state.is_enabled(tid)
        }
    }

    fn adding_tids(&self, state: &State, frame: &SufficientSet) -> TidSet {
        if self.use_sleep_sets() {
            frame.sleep().awake(state.enabled())
        } else {
            state.enabled().clone()
        }
    }

    fn add_point(
        &mut self,
        execution: &Execution,
        index: usize,
        frames: &mut [SufficientSet],
        hb: &HappensBefore,
        point: BacktrackPoint,
        conservative: bool,
    ) {
        let mut alt = point.tid;
        if self.options.alternative_thread {
            let alternatives = Persistent::alternatives(
                execution,
                index,
                &frames[point.index - 1],
                hb,
                point,
                self.use_sleep_sets(),
            );
            if !alternatives.is_empty() {
                let prioritize: TidSet = [point.tid].into_iter().collect();
                alt = F::min_value(execution, point.index - 1, &alternatives, &prioritize);
            }
        }

        let state = execution.transition(point.index).pre();
        let add = if self.adding_condition(state, &frames[point.index - 1], alt) {
            [alt].into_iter().collect()
        } else {
            // a disabled alternative can only be the original thread
            assert_eq!(alt, point.tid);
            self.adding_tids(state, &frames[point.index - 1])
        };
        trace!(%point, conservative, ?add, "bound-persistent backtrack point");
        if conservative && self.options.bound_opt {
            self.frames[point.index - 1].pending.extend(&add);
        } else {
            frames[point.index - 1].add_all_to_backtrack(&add);
        }

        if !conservative {
            let conservative_index = F::last_context_switch_before(execution, point.index);
            if conservative_index < point.index {
                self.add_point(
                    execution,
                    index,
                    frames,
                    hb,
                    BacktrackPoint { tid: point.tid, index: conservative_index },
                    true,
                );
            }
        }
    }
}

impl<F: BoundFunction> SufficientSetPolicy for BoundPersistent<F> {
    fn path(&self) -> String {
        if self.bound == BoundValue::MAX {
            format!("bound_persistent/{}/{}/unbounded", F::name(), self.options.path())
        } else {
            format!("bound_persistent/{}/{}/{}", F::name(), self.options.path(), self.bound)
        }
    }

    fn update_state(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index);
        let tid = execution.transition(index).instr().tid();
        let bound_value = value::<F, _>(execution, &self.frames, index - 1, tid);
        self.frames.push(Frame { bound_value, ..Frame::default() });
    }

    fn backtrack_points(
        &self,
        execution: &Execution,
        index: usize,
        hb: &HappensBefore,
    ) -> Vec<BacktrackPoint> {
        let mut points = Vec::new();
        for (tid, next) in execution.transition(index).pre().next_instructions() {
            let per_thread = hb.max_dependent_per_thread(
                execution,
                index,
                next,
                self.options.transitive_reduction,
            );
            for dep_index in per_thread {
                points.push(BacktrackPoint { tid, index: dep_index });
            }
        }
        trace!(index, ?points, "bound-persistent backtrack points");
        points
    }

    fn add_backtrack_point(
        &mut self,
        execution: &Execution,
        index: usize,
        frames: &mut [SufficientSet],
        hb: &HappensBefore,
        point: BacktrackPoint,
    ) {
        self.add_point(execution, index, frames, hb, point, false);
    }

    fn update_after_exploration(
        &mut self,
        execution: &Execution,
        index: usize,
        pre: &mut SufficientSet,
    ) {
        assert_eq!(self.frames.len(), index + 1);
        if self.frames[index].bound_exceeded {
            self.frames[index - 1].bound_exceeded = true;
        }
        let wake = match self.options.sleep_sets {
            SleepSetMode::Never => true,
            SleepSetMode::Conservative => self.frames[index - 1].bound_exceeded,
        };
        if wake {
            pre.wake_up(execution.transition(index).instr().tid());
        }
    }

    fn add_to_pool(&self, pool: &mut TidSet) {
        let frame = self.frames.last().unwrap();
        if frame.bound_exceeded {
            pool.extend(&frame.pending);
        }
    }

    fn condition(&mut self, execution: &Execution, _frame: &mut SufficientSet, tid: Tid) -> bool {
        if value::<F, _>(execution, &self.frames, execution.len(), tid) <= self.bound {
            true
        } else {
            self.frames.last_mut().unwrap().bound_exceeded = true;
            false
        }
    }

    fn pop_back(&mut self) {
        self.frames.pop();
    }

    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()> {
        let frame = &self.frames[index];
        write!(out, "bval={} pending={{", frame.bound_value)?;
        for (i, tid) in frame.pending.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            write!(out, "{}", tid)?;
        }
        write!(out, "}}")?;
        if frame.bound_exceeded {
            write!(out, " bound_exceeded")?;
        }
        Ok(())
    }
}

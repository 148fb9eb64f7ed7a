//! Replay-side thread selection.
//!
//! During a replay, once the schedule prefix is consumed, a selector picks
//! the next runnable thread. The concrete strategy belongs to the replay
//! runtime; the piece that matters to exploration is [`SleepSets`], the
//! decorator that keeps the driver's sleep set in sync while the program
//! runs: it wakes sleeping threads whose pending instruction became
//! dependent with what just executed, and refuses to pick sleeping
//! threads.

use crate::exploration::SleepSet;
use crate::program::{Instruction, Tid, TidSet};
use crate::scheduler::SLEEPSET_FILE;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::trace;

/// The replayer's view of the runnable threads at one step.
#[derive(Debug, Clone, Default)]
pub struct TaskPool {
    tasks: BTreeMap<Tid, Instruction>,
    last_executed: Option<Instruction>,
}

impl TaskPool {
    pub fn new() -> TaskPool {
        TaskPool::default()
    }

    /// Registers the pending instruction of its thread.
    pub fn set_task(&mut self, instruction: Instruction) {
        self.tasks.insert(instruction.tid(), instruction);
    }

    pub fn remove_task(&mut self, tid: Tid) {
        self.tasks.remove(&tid);
    }

    pub fn next(&self, tid: Tid) -> Option<&Instruction> {
        self.tasks.get(&tid)
    }

    /// The instruction executed at the previous step, if any.
    pub fn last_executed(&self) -> Option<&Instruction> {
        self.last_executed.as_ref()
    }

    pub fn set_last_executed(&mut self, instruction: Instruction) {
        self.last_executed = Some(instruction);
    }
}

/// Outcome of a selection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Next(Tid),
    /// No candidate may run. Under sleep sets this ends the execution with
    /// status BLOCKED.
    Blocked,
}

/// Picks the next thread out of `selection` at step `step`.
pub trait Selector {
    fn select(&mut self, pool: &TaskPool, selection: &TidSet, step: usize) -> Selection;
}

/// Keeps running the previous thread while it remains selectable, and
/// otherwise switches to the smallest selectable tid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonPreemptive;

impl Selector for NonPreemptive {
    fn select(&mut self, pool: &TaskPool, selection: &TidSet, _step: usize) -> Selection {
        if let Some(last) = pool.last_executed() {
            if selection.contains(&last.tid()) {
                return Selection::Next(last.tid());
            }
        }
        match selection.iter().next() {
            Some(&tid) => Selection::Next(tid),
            None => Selection::Blocked,
        }
    }
}

/// Sleep-set filtering around an inner selector.
#[derive(Debug, Clone)]
pub struct SleepSets<S> {
    sleep: SleepSet,
    inner: S,
}

impl<S: Selector> SleepSets<S> {
    /// Loads the sleep set from the side-channel file in `schedules_dir`.
    pub fn new(inner: S, schedules_dir: &Path) -> io::Result<SleepSets<S>> {
        let sleep = SleepSet::read_from(&schedules_dir.join(SLEEPSET_FILE))?;
        trace!(sleeping = %sleep, "selector initialized");
        Ok(SleepSets { sleep, inner })
    }

    pub fn with_sleep(inner: S, sleep: SleepSet) -> SleepSets<S> {
        SleepSets { sleep, inner }
    }

    pub fn sleep(&self) -> &SleepSet {
        &self.sleep
    }
}

impl<S: Selector> Selector for SleepSets<S> {
    fn select(&mut self, pool: &TaskPool, selection: &TidSet, step: usize) -> Selection {
        assert!(!selection.is_empty());
        if step > 0 {
            if let Some(&current) = pool.last_executed() {
                self.sleep.wake_up_dependent(&current, |tid| pool.next(tid));
            }
        }
        let awake = self.sleep.awake(selection);
        trace!(step, ?selection, sleeping = %self.sleep, ?awake, "sleep-set selection");
        if awake.is_empty() {
            Selection::Blocked
        } else {
            self.inner.select(pool, &awake, step)
        }
    }
}

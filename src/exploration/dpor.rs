use crate::exploration::{
    HappensBefore, Reduction, SleepSet, SufficientSet, SufficientSetPolicy,
};
use crate::program::{Execution, Status, Tid, TidSet};
use crate::scheduler::{self, SchedulerSettings};

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::trace;

/// Counters specific to DPOR-based exploration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DporStatistics {
    nr_sleepset_blocked: u32,
}

impl DporStatistics {
    /// Number of explorations that ended with every runnable thread
    /// asleep.
    pub fn nr_sleepset_blocked(&self) -> u32 {
        self.nr_sleepset_blocked
    }

    fn increase_nr_sleepset_blocked(&mut self) {
        self.nr_sleepset_blocked += 1;
    }
}

/// Dynamic partial-order reduction over a pluggable sufficient-set
/// formulation.
///
/// Maintains, per stack frame, a [`SufficientSet`] whose sleep set is
/// propagated from the parent frame, and a [`HappensBefore`] relation the
/// policy consults to place backtrack points.
#[derive(Debug)]
pub struct Dpor<S> {
    frames: Vec<SufficientSet>,
    hb: HappensBefore,
    statistics: DporStatistics,
    policy: S,
}

impl<S: SufficientSetPolicy> Dpor<S> {
    pub fn new(policy: S) -> Dpor<S> {
        Dpor {
            frames: vec![SufficientSet::new()],
            hb: HappensBefore::new(0),
            statistics: DporStatistics::default(),
            policy,
        }
    }

    pub fn statistics(&self) -> &DporStatistics {
        &self.statistics
    }

    #[cfg(test)]
    pub(crate) fn nr_frames(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub(crate) fn frame(&self, index: usize) -> &SufficientSet {
        &self.frames[index]
    }

    #[cfg(test)]
    pub(crate) fn hb(&self) -> &HappensBefore {
        &self.hb
    }
}

impl<S: SufficientSetPolicy> Reduction for Dpor<S> {
    fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings::SleepSets
    }

    fn write_scheduler_files(&self, dir: &Path) -> io::Result<()> {
        assert!(!self.frames.is_empty());
        fs::create_dir_all(dir)?;
        self.frames
            .last()
            .unwrap()
            .sleep()
            .write_to(&dir.join(scheduler::SLEEPSET_FILE))
    }

    fn check_valid(&self, contains_locks: bool) -> bool {
        self.policy.check_valid(contains_locks)
    }

    fn reset(&mut self, execution: &Execution) {
        self.hb.reset(execution.nr_threads());
    }

    fn restore_state(&mut self, execution: &Execution, index: usize) {
        assert!(self.frames.len() > index);
        self.hb.restore(execution, index);
    }

    /// Adds the transition's thread to the backtrack set of its pre-state,
    /// propagates the sleep set into the new frame, extends the
    /// happens-before relation, and lets the policy place backtrack
    /// points.
    ///
    /// Must only be called on *new* transitions; re-running it on a
    /// restored prefix would overwrite sleep sets during propagation.
    fn update_state(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index);
        let t = execution.transition(index);
        let tid = t.instr().tid();

        self.frames.last_mut().unwrap().add_to_backtrack(tid);
        let sleep = SleepSet::propagate(self.frames.last().unwrap().sleep(), t);
        trace!(index, tid, %sleep, "dpor update");
        self.frames.push(SufficientSet::with_sleep(sleep));
        self.hb.update(execution, index);
        self.policy.update_state(execution, index);

        for point in self.policy.backtrack_points(execution, index, &self.hb) {
            self.policy
                .add_backtrack_point(execution, index, &mut self.frames, &self.hb, point);
        }
        debug_assert_eq!(self.frames.len(), index + 1);
    }

    fn update_after_exploration(&mut self, execution: &Execution, index: usize) {
        assert_eq!(self.frames.len(), index + 1);
        let tid = execution.transition(index).instr().tid();
        self.frames[index - 1].sleep_mut().add(tid);
        self.policy
            .update_after_exploration(execution, index, &mut self.frames[index - 1]);
    }

    /// `backtrack \ sleep` of the top frame, extended by the policy.
    fn pool(&mut self, _execution: &Execution) -> TidSet {
        let frame = self.frames.last().unwrap();
        let mut sufficient = frame.sleep().awake(frame.backtrack());
        self.policy.add_to_pool(&mut sufficient);
        sufficient
    }

    fn select_from_pool(&mut self, execution: &Execution, pool: &TidSet) -> Option<Tid> {
        assert!(!pool.is_empty());
        let frame = self.frames.last_mut().unwrap();
        let policy = &mut self.policy;
        pool.iter()
            .copied()
            .find(|&tid| policy.condition(execution, frame, tid))
    }

    fn pop_back(&mut self) {
        self.frames.pop();
        self.hb.pop_back();
        self.policy.pop_back();
    }

    fn update_statistics(&mut self, execution: &Execution) {
        if execution.status() == Status::Blocked {
            self.statistics.increase_nr_sleepset_blocked();
        }
    }

    fn close(&self, statistics_path: &Path) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(statistics_path)?;
        writeln!(file, "nr_sleepset_blocked\t{}", self.statistics.nr_sleepset_blocked)
    }

    fn path(&self) -> String {
        format!("dpor/{}", self.policy.path())
    }

    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()> {
        write!(out, "{}", self.frames[index])?;
        write!(out, " ")?;
        self.policy.dump_state(out, index)
    }
}

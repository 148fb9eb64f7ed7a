//! An in-process replayer for integration tests.
//!
//! Simulates small abstract programs: each thread is a list of visible
//! operations, optionally gated on another thread's termination (a join).
//! The simulator honors the real side channel: it reads `settings.txt` and
//! `sleepset.txt` from the schedules directory and drives the crate's own
//! sleep-set selector, and every produced trace is round-tripped through
//! the `record.txt` codec.

use statespace_explorer::exploration::SleepSet;
use statespace_explorer::program::{
    Execution, Instruction, LockOp, MemoryOp, Object, State, Status, Tid, TidSet,
};
use statespace_explorer::scheduler::selector::{NonPreemptive, Selection, Selector, SleepSets, TaskPool};
use statespace_explorer::scheduler::{
    read_settings, ReplayError, Replayer, Schedule, SchedulerSettings, SLEEPSET_FILE,
};
use statespace_explorer::trace;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Load(u64),
    Store(u64),
    Lock(u64),
    Unlock(u64),
}

/// One operation of a simulated thread, optionally blocked until another
/// thread terminated.
#[derive(Debug, Clone, Copy)]
pub struct SimOp {
    op: Op,
    wait_for: Option<Tid>,
}

pub fn op(op: Op) -> SimOp {
    SimOp { op, wait_for: None }
}

/// `op`, enabled only once `tid` has terminated.
pub fn op_after(operation: Op, tid: Tid) -> SimOp {
    SimOp { op: operation, wait_for: Some(tid) }
}

#[derive(Debug, Clone)]
pub struct SimProgram {
    threads: Vec<Vec<SimOp>>,
}

impl SimProgram {
    pub fn new(threads: Vec<Vec<SimOp>>) -> SimProgram {
        SimProgram { threads }
    }

    pub fn nr_threads(&self) -> usize {
        self.threads.len()
    }
}

/// Replays a [`SimProgram`] instead of spawning a process.
#[derive(Debug, Clone)]
pub struct SimulatedReplayer {
    program: SimProgram,
    record_path: Option<PathBuf>,
    record_short_path: Option<PathBuf>,
    max_free_steps: Option<usize>,
}

impl SimulatedReplayer {
    pub fn new(program: SimProgram) -> SimulatedReplayer {
        SimulatedReplayer {
            program,
            record_path: None,
            record_short_path: None,
            max_free_steps: None,
        }
    }

    /// Also writes `record.txt` / `record_short.txt`, as the real replay
    /// runtime would.
    pub fn with_record_files(
        program: SimProgram,
        record_path: PathBuf,
        record_short_path: PathBuf,
    ) -> SimulatedReplayer {
        SimulatedReplayer {
            record_path: Some(record_path),
            record_short_path: Some(record_short_path),
            ..SimulatedReplayer::new(program)
        }
    }

    /// Simulates a per-replay timeout: the run is cut off
    /// `max_free_steps` steps after the schedule prefix, as if the
    /// replayer had been killed, leaving a partial trace.
    pub fn truncated(program: SimProgram, max_free_steps: usize) -> SimulatedReplayer {
        SimulatedReplayer {
            max_free_steps: Some(max_free_steps),
            ..SimulatedReplayer::new(program)
        }
    }
}

struct Sim<'p> {
    program: &'p SimProgram,
    pc: Vec<usize>,
    lock_owners: BTreeMap<u64, Tid>,
}

impl<'p> Sim<'p> {
    fn new(program: &'p SimProgram) -> Sim<'p> {
        Sim {
            program,
            pc: vec![0; program.nr_threads()],
            lock_owners: BTreeMap::new(),
        }
    }

    fn sim_op(&self, tid: Tid) -> Option<SimOp> {
        self.program.threads[tid].get(self.pc[tid]).copied()
    }

    fn instruction(&self, tid: Tid) -> Option<Instruction> {
        self.sim_op(tid).map(|sim_op| match sim_op.op {
            Op::Load(obj) => {
                Instruction::Memory { tid, op: MemoryOp::Load, operand: Object(obj) }
            }
            Op::Store(obj) => {
                Instruction::Memory { tid, op: MemoryOp::Store, operand: Object(obj) }
            }
            Op::Lock(obj) => Instruction::Lock { tid, op: LockOp::Lock, operand: Object(obj) },
            Op::Unlock(obj) => {
                Instruction::Lock { tid, op: LockOp::Unlock, operand: Object(obj) }
            }
        })
    }

    fn finished(&self, tid: Tid) -> bool {
        self.pc[tid] == self.program.threads[tid].len()
    }

    fn all_finished(&self) -> bool {
        (0..self.program.nr_threads()).all(|tid| self.finished(tid))
    }

    fn is_enabled(&self, tid: Tid) -> bool {
        let sim_op = match self.sim_op(tid) {
            Some(sim_op) => sim_op,
            None => return false,
        };
        if let Some(target) = sim_op.wait_for {
            if !self.finished(target) {
                return false;
            }
        }
        match sim_op.op {
            Op::Lock(obj) => !self.lock_owners.contains_key(&obj),
            _ => true,
        }
    }

    fn enabled(&self) -> TidSet {
        (0..self.program.nr_threads())
            .filter(|&tid| self.is_enabled(tid))
            .collect()
    }

    fn state(&self) -> State {
        let mut state = State::new();
        for tid in 0..self.program.nr_threads() {
            if let Some(instruction) = self.instruction(tid) {
                state.set_next(instruction);
                if self.is_enabled(tid) {
                    state.set_enabled(tid);
                }
            }
        }
        state
    }

    fn task_pool(&self, last: Option<Instruction>) -> TaskPool {
        let mut pool = TaskPool::new();
        for tid in 0..self.program.nr_threads() {
            if let Some(instruction) = self.instruction(tid) {
                pool.set_task(instruction);
            }
        }
        if let Some(last) = last {
            pool.set_last_executed(last);
        }
        pool
    }

    fn execute(&mut self, tid: Tid) {
        let sim_op = self.sim_op(tid).expect("executing a finished thread");
        match sim_op.op {
            Op::Lock(obj) => {
                assert!(self.lock_owners.insert(obj, tid).is_none(), "lock already held");
            }
            Op::Unlock(obj) => {
                assert_eq!(self.lock_owners.remove(&obj), Some(tid), "unlock by non-owner");
            }
            Op::Load(_) | Op::Store(_) => {}
        }
        self.pc[tid] += 1;
    }
}

impl Replayer for SimulatedReplayer {
    fn replay(
        &mut self,
        _program: &Path,
        schedule: &Schedule,
        schedules_dir: &Path,
        _timeout: Option<Duration>,
    ) -> Result<Execution, ReplayError> {
        let settings =
            read_settings(schedules_dir).unwrap_or(SchedulerSettings::Nonpreemptive);
        let sleep = match settings {
            SchedulerSettings::SleepSets => {
                SleepSet::read_from(&schedules_dir.join(SLEEPSET_FILE)).unwrap()
            }
            SchedulerSettings::Nonpreemptive => SleepSet::new(),
        };
        let mut selector = SleepSets::with_sleep(NonPreemptive, sleep);

        let mut sim = Sim::new(&self.program);
        let mut execution = Execution::new(self.program.nr_threads(), sim.state());
        let mut last: Option<Instruction> = None;
        let mut step = 0;

        let status = loop {
            let enabled = sim.enabled();
            if enabled.is_empty() {
                break if sim.all_finished() { Status::Ok } else { Status::Deadlock };
            }
            if let Some(max_free_steps) = self.max_free_steps {
                if step >= schedule.len() + max_free_steps {
                    // the timeout kill leaves whatever was recorded so far
                    break Status::Ok;
                }
            }
            let pool = sim.task_pool(last);
            let tid = match schedule.get(step) {
                Some(forced) => {
                    assert!(
                        enabled.contains(&forced),
                        "schedule step {} picks disabled thread {}",
                        step,
                        forced
                    );
                    // keep the selector's sleep set in step; the forced
                    // pick itself bypasses it
                    let selection: TidSet = [forced].into_iter().collect();
                    let _ = selector.select(&pool, &selection, step);
                    forced
                }
                None => match selector.select(&pool, &enabled, step) {
                    Selection::Next(tid) => tid,
                    Selection::Blocked => break Status::Blocked,
                },
            };
            let instruction = sim.instruction(tid).unwrap();
            sim.execute(tid);
            execution.push(instruction, sim.state());
            last = Some(instruction);
            step += 1;
        };
        execution.set_status(status);

        // round-trip through the trace codec, as the real seam would
        let mut buffer = Vec::new();
        trace::write_record(&execution, &mut buffer).unwrap();
        let execution = trace::read_record(buffer.as_slice()).unwrap();

        if let Some(path) = &self.record_path {
            trace::write_record_file(&execution, path).unwrap();
        }
        if let Some(path) = &self.record_short_path {
            let mut buffer = Vec::new();
            trace::write_record_short(&execution, &mut buffer).unwrap();
            std::fs::write(path, buffer).unwrap();
        }
        Ok(execution)
    }
}

// Benchmark programs

/// One writer of slot 0 plus `nr_threads - 1` readers that each read their
/// own slot and then slot 0.
pub fn readers(nr_threads: usize) -> SimProgram {
    let mut threads = vec![vec![op(Op::Store(0))]];
    for tid in 1..nr_threads {
        threads.push(vec![op(Op::Load(tid as u64)), op(Op::Load(0))]);
    }
    SimProgram::new(threads)
}

/// Two threads write the same variable, but never concurrently: the main
/// thread joins the worker before its own write.
pub fn non_concurrent_writes() -> SimProgram {
    SimProgram::new(vec![
        vec![op_after(Op::Store(0), 1)],
        vec![op(Op::Store(0))],
    ])
}

/// Every thread stores to its own object.
pub fn disjoint_writers(nr_threads: usize) -> SimProgram {
    SimProgram::new(
        (0..nr_threads)
            .map(|tid| vec![op(Op::Store(tid as u64))])
            .collect(),
    )
}

/// Two threads race on one variable.
pub fn two_writers() -> SimProgram {
    SimProgram::new(vec![vec![op(Op::Store(0))], vec![op(Op::Store(0))]])
}

/// Two depositors each read the shared balance and write it back.
pub fn bank_account() -> SimProgram {
    SimProgram::new(vec![
        vec![op(Op::Load(0)), op(Op::Store(0))],
        vec![op(Op::Load(0)), op(Op::Store(0))],
    ])
}

/// Two threads take the same lock once each.
pub fn lock_pair() -> SimProgram {
    SimProgram::new(vec![
        vec![op(Op::Lock(9)), op(Op::Unlock(9))],
        vec![op(Op::Lock(9)), op(Op::Unlock(9))],
    ])
}

/// Classic ABBA deadlock candidate.
pub fn abba_locks() -> SimProgram {
    SimProgram::new(vec![
        vec![op(Op::Lock(1)), op(Op::Lock(2)), op(Op::Unlock(2)), op(Op::Unlock(1))],
        vec![op(Op::Lock(2)), op(Op::Lock(1)), op(Op::Unlock(1)), op(Op::Unlock(2))],
    ])
}

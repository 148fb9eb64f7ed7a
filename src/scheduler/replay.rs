use crate::program::Execution;
use crate::scheduler::{write_schedule, Schedule};
use crate::trace::{self, TraceError};

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Failure to obtain a trace from the replayer. Fatal to the exploration.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to run `{}`: {source}", program.display())]
    Spawn {
        program: PathBuf,
        source: io::Error,
    },

    #[error("failed to read the trace: {0}")]
    Trace(#[from] TraceError),
}

/// The record/replay runtime, as the exploration loop sees it.
///
/// A replayer runs the instrumented program under the given schedule
/// (reading the side-channel files in `schedules_dir` first) and returns
/// the observed execution. A timeout is not a failure; the partial trace
/// is returned like any other.
pub trait Replayer {
    fn replay(
        &mut self,
        program: &Path,
        schedule: &Schedule,
        schedules_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<Execution, ReplayError>;
}

/// Runs the instrumented program as a child process.
///
/// The schedule is written to `schedules_dir` before the child starts; the
/// child's instrumentation runtime reads it, enacts it, and writes the
/// trace to `record.txt`. On timeout the child is killed and whatever
/// trace it produced is parsed.
#[derive(Debug, Clone)]
pub struct ProcessReplayer {
    record_path: PathBuf,
    poll_interval: Duration,
}

impl ProcessReplayer {
    pub fn new() -> ProcessReplayer {
        ProcessReplayer {
            record_path: PathBuf::from("record.txt"),
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_record_path(record_path: impl Into<PathBuf>) -> ProcessReplayer {
        ProcessReplayer { record_path: record_path.into(), ..ProcessReplayer::new() }
    }
}

impl Default for ProcessReplayer {
    fn default() -> ProcessReplayer {
        ProcessReplayer::new()
    }
}

impl Replayer for ProcessReplayer {
    fn replay(
        &mut self,
        program: &Path,
        schedule: &Schedule,
        schedules_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<Execution, ReplayError> {
        let spawn_err = |source| ReplayError::Spawn { program: program.to_path_buf(), source };

        write_schedule(schedule, schedules_dir).map_err(spawn_err)?;

        debug!(program = %program.display(), %schedule, "replay");
        let mut child = Command::new(program)
            .env("STATESPACE_SCHEDULES_DIR", schedules_dir)
            .spawn()
            .map_err(spawn_err)?;

        match timeout {
            None => {
                child.wait().map_err(spawn_err)?;
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if child.try_wait().map_err(spawn_err)?.is_some() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        // not an error: the partial trace is consumed
                        warn!(program = %program.display(), "replay timed out");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    std::thread::sleep(self.poll_interval);
                }
            }
        }

        Ok(trace::read_record_file(&self.record_path)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::program::{Instruction, MemoryOp, Object, State};
    use crate::trace::write_record_file;

    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn shell_program(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("program.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).unwrap();
        path
    }

    /// The trace a replay killed after one step would leave behind.
    fn partial_trace() -> Execution {
        let store = Instruction::Memory { tid: 0, op: MemoryOp::Store, operand: Object(1) };
        let mut initial = State::new();
        initial.set_next(store);
        initial.set_enabled(0);
        let mut execution = Execution::new(2, initial);
        execution.push(store, State::new());
        execution
    }

    #[test]
    fn a_timed_out_replay_is_killed_and_yields_the_partial_trace() {
        let dir = tempfile::tempdir().unwrap();
        let record_path = dir.path().join("record.txt");
        let expected = partial_trace();
        write_record_file(&expected, &record_path).unwrap();

        let program = shell_program(dir.path(), "sleep 5");
        let mut replayer = ProcessReplayer::with_record_path(&record_path);

        let started = Instant::now();
        let execution = replayer
            .replay(
                &program,
                &Schedule::new(),
                dir.path(),
                Some(Duration::from_millis(100)),
            )
            .unwrap();

        // the child was killed well before its sleep finished, and the
        // trace it wrote so far is consumed like any other
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(execution, expected);
    }

    #[test]
    fn a_fast_child_finishes_within_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let record_path = dir.path().join("record.txt");
        let expected = partial_trace();
        write_record_file(&expected, &record_path).unwrap();

        let program = shell_program(dir.path(), "exit 0");
        let mut replayer = ProcessReplayer::with_record_path(&record_path);

        let execution = replayer
            .replay(
                &program,
                &Schedule::new(),
                dir.path(),
                Some(Duration::from_secs(30)),
            )
            .unwrap();
        assert_eq!(execution, expected);
    }

    #[test]
    fn a_missing_trace_is_a_replay_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = shell_program(dir.path(), "exit 0");
        let mut replayer = ProcessReplayer::with_record_path(dir.path().join("record.txt"));

        match replayer.replay(&program, &Schedule::new(), dir.path(), None) {
            Err(ReplayError::Trace(_)) => {}
            other => panic!("expected a trace error, got {:?}", other.map(|_| ())),
        }
    }
}

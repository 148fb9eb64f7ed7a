//! The stateful exploration core.
//!
//! Between replays the explorer maintains the execution observed so far as
//! a stack, a happens-before relation over it, and per-frame reduction
//! state. A [`Reduction`] decides which threads must still be scheduled
//! from each point; the [`DepthFirstSearch`] driver wraps it, tracks
//! explored alternatives, and synthesizes the next schedule; an
//! [`Exploration`] runs the replay-parse-update loop until no schedule is
//! left.

mod vector_clock;
pub use self::vector_clock::VectorClock;

pub mod dependence;

mod happens_before;
pub use self::happens_before::HappensBefore;

mod sleep_set;
pub use self::sleep_set::{ParseSleepSetError, SleepSet};

mod sufficient_set;
pub use self::sufficient_set::{BacktrackPoint, SufficientSet, SufficientSetPolicy};

mod persistent;
pub use self::persistent::Persistent;

mod source;
pub use self::source::Source;

mod bound_persistent;
pub use self::bound_persistent::{BoundPersistent, BoundPersistentOptions, SleepSetMode};

pub mod bound_functions;

mod bound;
pub use self::bound::{Bound, BoundState};

mod dpor;
pub use self::dpor::{Dpor, DporStatistics};

mod dfs;
pub use self::dfs::DepthFirstSearch;

use crate::program::{Execution, Tid, TidSet};
use crate::scheduler::{self, Replayer, ReplayError, Schedule, SchedulerSettings};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;

/// Capability set of a reduction mode, as seen by the depth-first driver.
///
/// Implementations are bound statically; there is one frame of reduction
/// state per transition of the current execution, plus one for the initial
/// state.
pub trait Reduction {
    /// Selector the replayer must use for this reduction.
    fn scheduler_settings(&self) -> SchedulerSettings;

    /// Writes the side-channel files the replayer reads before a run.
    fn write_scheduler_files(&self, dir: &Path) -> io::Result<()>;

    /// Whether the reduction can soundly explore a program of this shape.
    fn check_valid(&self, contains_locks: bool) -> bool;

    /// Prepares for a new replay of the retained prefix.
    fn reset(&mut self, execution: &Execution);

    /// Re-enters transition `index` of the retained prefix.
    fn restore_state(&mut self, execution: &Execution, index: usize);

    /// Processes the new transition `index`, pushing one frame.
    fn update_state(&mut self, execution: &Execution, index: usize);

    /// Called when the subtree below transition `index` is fully explored.
    fn update_after_exploration(&mut self, execution: &Execution, index: usize);

    /// The threads that still must be explored from the current final
    /// state. A subset of the enabled threads.
    fn pool(&mut self, execution: &Execution) -> TidSet;

    /// Picks a thread from a non-empty pool, or `None` if none qualifies.
    fn select_from_pool(&mut self, execution: &Execution, pool: &TidSet) -> Option<Tid>;

    /// Drops the top frame.
    fn pop_back(&mut self);

    fn update_statistics(&mut self, execution: &Execution);

    /// Appends reduction-specific counters to the statistics file.
    fn close(&self, statistics_path: &Path) -> io::Result<()>;

    /// Output-directory fragment naming this reduction.
    fn path(&self) -> String;

    /// Writes the frame dump for `exploration<N>.txt`.
    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()>;
}

/// What the exploration loop needs from a mode. Implemented by
/// [`DepthFirstSearch`] over any [`Reduction`].
pub trait Mode {
    fn scheduler_settings(&self) -> SchedulerSettings;
    fn write_scheduler_files(&self, dir: &Path) -> io::Result<()>;
    fn check_valid(&self, contains_locks: bool) -> bool;
    fn reset(&mut self, execution: &Execution);
    fn update_statistics(&mut self, execution: &Execution);
    fn restore_state(&mut self, execution: &Execution, index: usize);
    fn update_state(&mut self, execution: &Execution, index: usize);

    /// Synthesizes the next schedule by backtracking; leaves it empty when
    /// exploration is complete.
    fn new_schedule(&mut self, execution: &mut Execution, schedule: &mut Schedule);

    fn close(&self, statistics_path: &Path) -> io::Result<()>;
    fn path(&self) -> String;
    fn dump_state(&self, out: &mut dyn io::Write, index: usize) -> io::Result<()>;
}

/// Fatal failures of an exploration run.
#[derive(Debug, thiserror::Error)]
pub enum ExplorationError {
    /// The first replay was rejected by the mode (e.g. source sets on a
    /// lock-bearing program) or blocked immediately.
    #[error("invalid input program `{}`", .0.display())]
    InvalidProgram(PathBuf),

    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Wall- and CPU-time bookkeeping plus the exploration counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplorationStatistics {
    nr_explorations: u32,
    time_cpu: f64,
    time_wall: f64,
    cpu_start: f64,
    wall_start: Option<Instant>,
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn cpu_seconds() -> f64 {
            unsafe {
                let mut ts = std::mem::MaybeUninit::<libc::timespec>::uninit();
                libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, ts.as_mut_ptr());
                let ts = ts.assume_init();
                ts.tv_sec as f64 + ts.tv_nsec as f64 / 1_000_000_000.0
            }
        }
    } else {
        fn cpu_seconds() -> f64 {
            0.0
        }
    }
}

impl ExplorationStatistics {
    pub fn nr_explorations(&self) -> u32 {
        self.nr_explorations
    }

    pub fn time_cpu(&self) -> f64 {
        self.time_cpu
    }

    pub fn time_wall(&self) -> f64 {
        self.time_wall
    }

    fn increase_nr_explorations(&mut self) {
        self.nr_explorations += 1;
    }

    fn start_clock(&mut self) {
        self.cpu_start = cpu_seconds();
        self.wall_start = Some(Instant::now());
    }

    fn stop_clock(&mut self) {
        self.time_cpu = cpu_seconds() - self.cpu_start;
        self.time_wall = self
            .wall_start
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
    }

    fn dump(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "nr_explorations\t{}", self.nr_explorations)?;
        writeln!(file, "cpu_time(s)\t{}", self.time_cpu)?;
        writeln!(file, "wall_time(s)\t{}", self.time_wall)
    }
}

/// Run settings of an [`Exploration`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Archive `record_<N>.txt` / `record_short_<N>.txt` per run.
    pub keep_records: bool,
    /// Write `exploration<N>.txt` per-step state dumps.
    pub keep_logs: bool,
    /// Per-replay timeout. A timed-out replay yields a partial trace, not
    /// an error.
    pub timeout: Option<Duration>,
    /// Output directory; defaults to
    /// `./statespace_explorer_output/<program>/<mode path>`.
    pub output_dir: Option<PathBuf>,
    /// Directory of the side-channel files the replayer reads.
    pub schedules_dir: PathBuf,
    /// Trace file the replayer writes.
    pub record_path: PathBuf,
    /// Abbreviated trace file the replayer writes.
    pub record_short_path: PathBuf,
    /// When set, exploration progress is stored here between iterations
    /// and picked up again by the next run. Requires the `checkpoint`
    /// feature.
    pub checkpoint_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            keep_records: false,
            keep_logs: false,
            timeout: None,
            output_dir: None,
            schedules_dir: PathBuf::from("schedules"),
            record_path: PathBuf::from("record.txt"),
            record_short_path: PathBuf::from("record_short.txt"),
            checkpoint_file: None,
        }
    }
}

/// The exploration loop: replay, parse, restore-or-extend the mode state,
/// ask the mode for the next schedule, repeat.
#[derive(Debug)]
pub struct Exploration<M, R = scheduler::ProcessReplayer> {
    program: PathBuf,
    max_nr_explorations: u32,
    mode: M,
    replayer: R,
    execution: Execution,
    schedule: Schedule,
    statistics: ExplorationStatistics,
    done: bool,
    settings: Settings,
}

impl<M: Mode> Exploration<M> {
    pub fn new(program: impl Into<PathBuf>, max_nr_explorations: u32, mode: M) -> Exploration<M> {
        Exploration::with_replayer(
            program,
            max_nr_explorations,
            mode,
            scheduler::ProcessReplayer::new(),
        )
    }
}

impl<M: Mode, R: Replayer> Exploration<M, R> {
    /// An exploration driving a custom [`Replayer`], e.g. an in-process
    /// simulator in tests.
    pub fn with_replayer(
        program: impl Into<PathBuf>,
        max_nr_explorations: u32,
        mode: M,
        replayer: R,
    ) -> Exploration<M, R> {
        Exploration {
            program: program.into(),
            max_nr_explorations,
            mode,
            replayer,
            execution: Execution::default(),
            schedule: Schedule::new(),
            statistics: ExplorationStatistics::default(),
            done: false,
            settings: Settings::default(),
        }
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn statistics(&self) -> &ExplorationStatistics {
        &self.statistics
    }

    pub fn mode(&self) -> &M {
        &self.mode
    }

    fn output_dir(&self) -> PathBuf {
        match &self.settings.output_dir {
            Some(dir) => dir.clone(),
            None => {
                let program = self
                    .program
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "program".to_string());
                PathBuf::from("statespace_explorer_output")
                    .join(program)
                    .join(self.mode.path())
            }
        }
    }

    /// Runs the exploration, optionally seeded with an initial schedule.
    ///
    /// Visits one leaf of the exploration tree per replay until the mode
    /// reports no further schedule, `max_nr_explorations` is reached, or a
    /// fatal error occurs.
    pub fn run(&mut self, initial: Schedule) -> Result<(), ExplorationError> {
        let output_dir = self.output_dir();
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir)?;
        }
        fs::create_dir_all(&output_dir)?;
        fs::create_dir_all(&self.settings.schedules_dir)?;

        // opening once; reopening in append mode per iteration is costly
        let mut log_schedules = fs::File::create(output_dir.join("schedules.txt"))?;
        scheduler::write_settings(self.mode.scheduler_settings(), &self.settings.schedules_dir)?;

        self.schedule = initial;
        self.done = false;
        let mut from = 1;

        if let Some(path) = self.settings.checkpoint_file.clone() {
            if path.exists() {
                self.schedule = checkpoint::load(&path)?;
                info!(schedule = %self.schedule, "resuming from checkpoint");
            }
        }

        self.statistics.start_clock();
        while !self.done && self.statistics.nr_explorations() < self.max_nr_explorations {
            self.mode.write_scheduler_files(&self.settings.schedules_dir)?;
            self.execution = self.replayer.replay(
                &self.program,
                &self.schedule,
                &self.settings.schedules_dir,
                self.settings.timeout,
            )?;
            self.mode.reset(&self.execution);

            if self.statistics.nr_explorations() == 0
                && !self.mode.check_valid(self.execution.contains_locks())
            {
                return Err(ExplorationError::InvalidProgram(self.program.clone()));
            }

            self.statistics.increase_nr_explorations();
            self.mode.update_statistics(&self.execution);
            self.schedule = scheduler::schedule_of(&self.execution);
            info!(
                nr = self.statistics.nr_explorations(),
                schedule = %self.schedule,
                status = %self.execution.status(),
                "explored"
            );
            writeln!(log_schedules, "{}", self.schedule)?;
            if self.settings.keep_records {
                self.archive_records(&output_dir)?;
            }

            // update_state only ever sees new transitions; anything below
            // `from` is restored. The DPOR sleep-set propagation relies on
            // this.
            for index in 1..=self.execution.len() {
                if index < from {
                    self.mode.restore_state(&self.execution, index);
                } else {
                    self.mode.update_state(&self.execution, index);
                }
            }

            if self.settings.keep_logs {
                self.dump_branch(&output_dir)?;
            }

            self.mode.new_schedule(&mut self.execution, &mut self.schedule);
            if self.schedule.is_empty() {
                self.done = true;
                break;
            }
            from = self.schedule.len();

            if let Some(path) = self.settings.checkpoint_file.clone() {
                checkpoint::store(&path, &self.schedule, self.statistics.nr_explorations())?;
            }
        }

        self.close(&output_dir)
    }

    fn close(&mut self, output_dir: &Path) -> Result<(), ExplorationError> {
        self.statistics.stop_clock();
        let statistics_path = output_dir.join("statistics.txt");
        self.statistics.dump(&statistics_path)?;
        self.mode.close(&statistics_path)?;
        info!(
            nr_explorations = self.statistics.nr_explorations(),
            done = self.done,
            "exploration finished"
        );
        Ok(())
    }

    fn archive_records(&self, output_dir: &Path) -> io::Result<()> {
        let nr = self.statistics.nr_explorations();
        move_record(
            &self.settings.record_path,
            &output_dir.join(format!("record_{}.txt", nr)),
        )?;
        move_record(
            &self.settings.record_short_path,
            &output_dir.join(format!("record_short_{}.txt", nr)),
        )
    }

    fn dump_branch(&self, output_dir: &Path) -> io::Result<()> {
        let nr = self.statistics.nr_explorations();
        let mut file = fs::File::create(output_dir.join(format!("exploration{}.txt", nr)))?;
        for t in self.execution.transitions() {
            write!(file, "{} ", t.pre())?;
            self.mode.dump_state(&mut file, t.index() - 1)?;
            writeln!(file)?;
            writeln!(file, "{}", t)?;
        }
        Ok(())
    }
}

fn move_record(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // rename fails across filesystems
        Err(_) => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
    }
}

#[cfg(feature = "checkpoint")]
mod checkpoint {
    use crate::scheduler::Schedule;

    use std::fs;
    use std::io;
    use std::path::Path;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Checkpoint {
        schedule: Schedule,
        nr_explorations: u32,
    }

    pub(super) fn load(path: &Path) -> io::Result<Schedule> {
        let contents = fs::read_to_string(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(checkpoint.schedule)
    }

    pub(super) fn store(path: &Path, schedule: &Schedule, nr_explorations: u32) -> io::Result<()> {
        let checkpoint = Checkpoint { schedule: schedule.clone(), nr_explorations };
        let serialized = serde_json::to_string(&checkpoint)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, serialized)
    }
}

#[cfg(not(feature = "checkpoint"))]
mod checkpoint {
    use crate::scheduler::Schedule;

    use std::io;
    use std::path::Path;

    pub(super) fn load(_path: &Path) -> io::Result<Schedule> {
        panic!("not compiled with `checkpoint` feature")
    }

    pub(super) fn store(_path: &Path, _schedule: &Schedule, _nr: u32) -> io::Result<()> {
        panic!("not compiled with `checkpoint` feature")
    }
}

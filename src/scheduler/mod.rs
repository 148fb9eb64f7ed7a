//! The seam to the external record/replay runtime.
//!
//! The replayer is a separate process: before each run the explorer writes
//! the schedule and the side-channel files into a directory the replayer
//! reads, and after the run it parses the trace the replayer wrote. The
//! [`Replayer`] trait names that interface; [`ProcessReplayer`] is the
//! production implementation. The replay-side thread selection that honors
//! sleep sets lives in [`selector`].

mod replay;
pub use self::replay::{ProcessReplayer, ReplayError, Replayer};

pub mod selector;

use crate::program::{Execution, Tid};

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Schedule file consumed by the replayer.
pub const SCHEDULE_FILE: &str = "schedule.txt";
/// Selector tag consumed by the replayer.
pub const SETTINGS_FILE: &str = "settings.txt";
/// Sleep-set side channel consumed by the replayer's selector.
pub const SLEEPSET_FILE: &str = "sleepset.txt";

/// A prefix of thread ids the replayer must enact, one per step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub struct Schedule(Vec<Tid>);

impl Schedule {
    pub fn new() -> Schedule {
        Schedule::default()
    }

    pub fn push(&mut self, tid: Tid) {
        self.0.push(tid);
    }

    pub fn pop(&mut self) -> Option<Tid> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<Tid> {
        self.0.get(step).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Tid> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<Tid>> for Schedule {
    fn from(tids: Vec<Tid>) -> Schedule {
        Schedule(tids)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tid) in self.0.iter().enumerate() {
            if i > 0 {
                write!(fmt, " ")?;
            }
            write!(fmt, "{}", tid)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed schedule `{0}`")]
pub struct ParseScheduleError(pub String);

impl FromStr for Schedule {
    type Err = ParseScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(|part| part.parse().map_err(|_| ParseScheduleError(s.to_string())))
            .collect::<Result<Vec<Tid>, _>>()
            .map(Schedule)
    }
}

/// The schedule an execution followed: its thread ids in order.
pub fn schedule_of(execution: &Execution) -> Schedule {
    Schedule(execution.transitions().map(|t| t.instr().tid()).collect())
}

/// Which selector the replayer uses once the schedule prefix is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerSettings {
    Nonpreemptive,
    SleepSets,
}

impl SchedulerSettings {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerSettings::Nonpreemptive => "Nonpreemptive",
            SchedulerSettings::SleepSets => "SleepSets",
        }
    }
}

impl fmt::Display for SchedulerSettings {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown scheduler settings `{0}`")]
pub struct ParseSettingsError(pub String);

impl FromStr for SchedulerSettings {
    type Err = ParseSettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Nonpreemptive" => Ok(SchedulerSettings::Nonpreemptive),
            "SleepSets" => Ok(SchedulerSettings::SleepSets),
            _ => Err(ParseSettingsError(s.to_string())),
        }
    }
}

/// Writes the selector tag for the replayer.
pub fn write_settings(settings: SchedulerSettings, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(SETTINGS_FILE), format!("{}\n", settings))
}

/// Reads the selector tag back; the replay side of the channel.
pub fn read_settings(dir: &Path) -> io::Result<SchedulerSettings> {
    let contents = fs::read_to_string(dir.join(SETTINGS_FILE))?;
    contents
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))
}

/// Writes the schedule for the replayer.
pub fn write_schedule(schedule: &Schedule, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(SCHEDULE_FILE), format!("{}\n", schedule))
}

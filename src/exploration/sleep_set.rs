use crate::exploration::dependence::dependent;
use crate::program::{Instruction, Tid, TidSet, Transition};

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Threads whose immediate execution from a state would only reproduce an
/// interleaving already covered elsewhere.
///
/// A sleep set lives in the stack frame of the driver; it is created by
/// propagation from the parent frame, grown by backtracking, and written to
/// the side-channel file before each replay so the replayer starts with the
/// same view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SleepSet {
    sleeping: TidSet,
}

impl SleepSet {
    pub fn new() -> SleepSet {
        SleepSet::default()
    }

    /// Propagates `previous` over transition `t`: every sleeping thread
    /// whose pending instruction in `t.post` is dependent with `t` wakes
    /// up.
    pub fn propagate(previous: &SleepSet, t: Transition<'_>) -> SleepSet {
        let mut sleep = previous.clone();
        sleep.sleeping.retain(|&asleep| match t.post().next(asleep) {
            Some(next) => !dependent(t.instr(), next),
            None => true,
        });
        sleep
    }

    /// Replay-side wake-up: wakes every sleeping thread whose pending
    /// instruction (as reported by `next_of`) is dependent with `current`.
    pub fn wake_up_dependent<'a>(
        &mut self,
        current: &Instruction,
        next_of: impl Fn(Tid) -> Option<&'a Instruction>,
    ) {
        self.sleeping.retain(|&asleep| match next_of(asleep) {
            Some(next) => !dependent(current, next),
            None => true,
        });
    }

    pub fn add(&mut self, tid: Tid) {
        self.sleeping.insert(tid);
    }

    pub fn wake_up(&mut self, tid: Tid) {
        self.sleeping.remove(&tid);
    }

    pub fn is_awake(&self, tid: Tid) -> bool {
        !self.sleeping.contains(&tid)
    }

    /// `tids \ self`
    pub fn awake(&self, tids: &TidSet) -> TidSet {
        tids.difference(&self.sleeping).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sleeping.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Tid> + '_ {
        self.sleeping.iter().copied()
    }

    /// Writes the side-channel form: one line of space-separated tids.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, format!("{}\n", self))
    }

    /// Reads the side-channel form back. A missing file is an empty set,
    /// matching a replayer that starts before the first set was written.
    pub fn read_from(path: &Path) -> io::Result<SleepSet> {
        match fs::read_to_string(path) {
            Ok(contents) => contents
                .trim()
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SleepSet::new()),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for SleepSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tid in &self.sleeping {
            if !first {
                write!(fmt, " ")?;
            }
            write!(fmt, "{}", tid)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed sleep set `{0}`")]
pub struct ParseSleepSetError(pub String);

impl FromStr for SleepSet {
    type Err = ParseSleepSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sleep = SleepSet::new();
        for part in s.split_whitespace() {
            let tid: Tid = part.parse().map_err(|_| ParseSleepSetError(s.to_string()))?;
            sleep.add(tid);
        }
        Ok(sleep)
    }
}

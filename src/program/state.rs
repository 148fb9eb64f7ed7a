use crate::program::{Instruction, Tid, TidSet};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The program state at one point of an execution.
///
/// `next` maps every thread that still has a pending visible instruction to
/// that instruction; `enabled` is the subset of those threads the scheduler
/// may actually run. A thread can be in `next` but not `enabled`, e.g. when
/// it is blocked acquiring a lock another thread holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    enabled: TidSet,
    next: BTreeMap<Tid, Instruction>,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// Registers `instruction` as the pending instruction of its thread.
    pub fn set_next(&mut self, instruction: Instruction) {
        self.next.insert(instruction.tid(), instruction);
    }

    /// Marks `tid` as runnable.
    ///
    /// Panics if `tid` has no pending instruction; `enabled` must stay a
    /// subset of `dom(next)`.
    pub fn set_enabled(&mut self, tid: Tid) {
        assert!(self.next.contains_key(&tid), "enabled thread {} has no next instruction", tid);
        self.enabled.insert(tid);
    }

    pub fn enabled(&self) -> &TidSet {
        &self.enabled
    }

    pub fn is_enabled(&self, tid: Tid) -> bool {
        self.enabled.contains(&tid)
    }

    /// The pending instruction of `tid`, if it has one.
    pub fn next(&self, tid: Tid) -> Option<&Instruction> {
        self.next.get(&tid)
    }

    /// All pending instructions, keyed by thread, in tid order.
    pub fn next_instructions(&self) -> impl Iterator<Item = (Tid, &Instruction)> + '_ {
        self.next.iter().map(|(&tid, instruction)| (tid, instruction))
    }

    pub fn has_pending(&self) -> bool {
        !self.next.is_empty()
    }
}

impl fmt::Display for State {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "enabled=")?;
        let mut first = true;
        for tid in &self.enabled {
            if !first {
                write!(fmt, ",")?;
            }
            write!(fmt, "{}", tid)?;
            first = false;
        }
        write!(fmt, " next=")?;
        let mut first = true;
        for instruction in self.next.values() {
            if !first {
                write!(fmt, ";")?;
            }
            write!(fmt, "{}", instruction)?;
            first = false;
        }
        Ok(())
    }
}

/// Error parsing the textual form of a [`State`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed state `{0}`")]
pub struct ParseStateError(pub String);

impl FromStr for State {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseStateError(s.to_string());
        let rest = s.trim().strip_prefix("enabled=").ok_or_else(err)?;
        let (enabled_part, next_part) = rest.split_once(" next=").ok_or_else(err)?;

        let mut state = State::new();
        for entry in next_part.split(';').filter(|e| !e.is_empty()) {
            let instruction: Instruction = entry.parse().map_err(|_| err())?;
            state.set_next(instruction);
        }
        for entry in enabled_part.split(',').filter(|e| !e.is_empty()) {
            let tid: Tid = entry.parse().map_err(|_| err())?;
            if !state.next.contains_key(&tid) {
                return Err(err());
            }
            state.enabled.insert(tid);
        }
        Ok(state)
    }
}

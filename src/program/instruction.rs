use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Thread identifier within a single program run.
pub type Tid = usize;

/// Ordered set of thread identifiers.
///
/// Ordering matters: "the first element" of a pool is the smallest tid, and
/// several selection rules depend on that being deterministic.
pub type TidSet = BTreeSet<Tid>;

/// A tagged address identifying the object an instruction operates on.
///
/// Object equality is what drives the dependence relation; the explorer
/// never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Object(pub u64);

/// Visible operations on a memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Load,
    Store,
    ReadModifyWrite,
}

/// Visible operations on a lock object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    Lock,
    Trylock,
    Unlock,
}

/// One visible instruction of the instrumented program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Memory { tid: Tid, op: MemoryOp, operand: Object },
    Lock { tid: Tid, op: LockOp, operand: Object },
}

impl Instruction {
    /// The thread performing this instruction.
    pub fn tid(&self) -> Tid {
        match *self {
            Instruction::Memory { tid, .. } => tid,
            Instruction::Lock { tid, .. } => tid,
        }
    }

    /// The object this instruction operates on.
    pub fn operand(&self) -> Object {
        match *self {
            Instruction::Memory { operand, .. } => operand,
            Instruction::Lock { operand, .. } => operand,
        }
    }

    pub fn is_lock_op(&self) -> bool {
        matches!(self, Instruction::Lock { .. })
    }

    fn op_str(&self) -> &'static str {
        match *self {
            Instruction::Memory { op: MemoryOp::Load, .. } => "load",
            Instruction::Memory { op: MemoryOp::Store, .. } => "store",
            Instruction::Memory { op: MemoryOp::ReadModifyWrite, .. } => "rmw",
            Instruction::Lock { op: LockOp::Lock, .. } => "lock",
            Instruction::Lock { op: LockOp::Trylock, .. } => "trylock",
            Instruction::Lock { op: LockOp::Unlock, .. } => "unlock",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {} {}", self.tid(), self.op_str(), self.operand().0)
    }
}

/// Error parsing the textual form of an [`Instruction`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed instruction `{0}`")]
pub struct ParseInstructionError(pub String);

impl FromStr for Instruction {
    type Err = ParseInstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseInstructionError(s.to_string());
        let mut parts = s.split_whitespace();
        let tid: Tid = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let op = parts.next().ok_or_else(err)?;
        let operand = Object(parts.next().ok_or_else(err)?.parse().map_err(|_| err())?);
        if parts.next().is_some() {
            return Err(err());
        }
        let instruction = match op {
            "load" => Instruction::Memory { tid, op: MemoryOp::Load, operand },
            "store" => Instruction::Memory { tid, op: MemoryOp::Store, operand },
            "rmw" => Instruction::Memory { tid, op: MemoryOp::ReadModifyWrite, operand },
            "lock" => Instruction::Lock { tid, op: LockOp::Lock, operand },
            "trylock" => Instruction::Lock { tid, op: LockOp::Trylock, operand },
            "unlock" => Instruction::Lock { tid, op: LockOp::Unlock, operand },
            _ => return Err(err()),
        };
        Ok(instruction)
    }
}

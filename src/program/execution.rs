use crate::program::{Instruction, State};

use std::fmt;
use std::str::FromStr;

/// Terminal status of one replayed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    /// The replay-side sleep-set selector found every runnable thread
    /// asleep. A valid terminal state of a single exploration, not an
    /// error.
    Blocked,
    Deadlock,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Blocked => "BLOCKED",
            Status::Deadlock => "DEADLOCK",
            Status::Error => "ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown execution status `{0}`")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Status::Ok),
            "BLOCKED" => Ok(Status::Blocked),
            "DEADLOCK" => Ok(Status::Deadlock),
            "ERROR" => Ok(Status::Error),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// One observed execution of the instrumented program.
///
/// Stored as the initial state plus, per transition, the instruction and
/// the state it produced: `states.len() == len() + 1`. Transition indices
/// are 1-based throughout the exploration core; index 0 denotes "no
/// transition".
///
/// The only mutator besides trace construction is [`pop_last`], which the
/// depth-first driver uses to treat the execution as a stack.
///
/// [`pop_last`]: Execution::pop_last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    nr_threads: usize,
    states: Vec<State>,
    instructions: Vec<Instruction>,
    status: Status,
}

impl Default for Execution {
    fn default() -> Execution {
        Execution::new(0, State::new())
    }
}

/// Borrowed view of one transition of an [`Execution`].
#[derive(Debug, Clone, Copy)]
pub struct Transition<'e> {
    execution: &'e Execution,
    index: usize,
}

impl Execution {
    /// An execution with no transitions yet, starting in `initial`.
    pub fn new(nr_threads: usize, initial: State) -> Execution {
        Execution {
            nr_threads,
            states: vec![initial],
            instructions: Vec::new(),
            status: Status::Ok,
        }
    }

    /// Number of threads of the program; used to size vector clocks.
    pub fn nr_threads(&self) -> usize {
        self.nr_threads
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn initial_state(&self) -> &State {
        &self.states[0]
    }

    /// The state after the last transition.
    pub fn final_state(&self) -> &State {
        self.states.last().unwrap()
    }

    /// Appends a transition performing `instruction` and ending in `post`.
    ///
    /// Panics unless `instruction` is the pending, enabled instruction of
    /// its thread in the current final state.
    pub fn push(&mut self, instruction: Instruction, post: State) {
        let pre = self.final_state();
        assert_eq!(
            pre.next(instruction.tid()),
            Some(&instruction),
            "pushed instruction is not pending in the pre state"
        );
        assert!(pre.is_enabled(instruction.tid()), "pushed instruction is not enabled");
        self.instructions.push(instruction);
        self.states.push(post);
    }

    /// Removes the last transition. The driver's single backtracking
    /// mutator.
    pub fn pop_last(&mut self) {
        assert!(!self.is_empty());
        self.instructions.pop();
        self.states.pop();
    }

    /// The transition at 1-based `index`.
    pub fn transition(&self, index: usize) -> Transition<'_> {
        assert!(index >= 1 && index <= self.len(), "transition index {} out of range", index);
        Transition { execution: self, index }
    }

    pub fn last(&self) -> Transition<'_> {
        self.transition(self.len())
    }

    pub fn transitions(&self) -> impl Iterator<Item = Transition<'_>> + '_ {
        (1..=self.len()).map(move |index| self.transition(index))
    }

    /// Whether any transition or pending instruction is a lock operation.
    pub fn contains_locks(&self) -> bool {
        self.instructions.iter().any(Instruction::is_lock_op)
            || self
                .states
                .iter()
                .any(|s| s.next_instructions().any(|(_, i)| i.is_lock_op()))
    }
}

impl<'e> Transition<'e> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instr(&self) -> &'e Instruction {
        &self.execution.instructions[self.index - 1]
    }

    pub fn pre(&self) -> &'e State {
        &self.execution.states[self.index - 1]
    }

    pub fn post(&self) -> &'e State {
        &self.execution.states[self.index]
    }
}

impl fmt::Display for Transition<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.index, self.instr())
    }
}

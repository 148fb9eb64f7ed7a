//! Model of one execution of the instrumented program.
//!
//! The replay runtime reports an execution as a totally ordered sequence of
//! transitions, each carrying the instruction that was performed and the
//! program state around it. The exploration core treats this model as a
//! stack: transitions are appended while a trace is consumed and popped
//! while the driver backtracks.

mod instruction;
pub use self::instruction::{Instruction, LockOp, MemoryOp, Object, ParseInstructionError, Tid, TidSet};

mod state;
pub use self::state::{ParseStateError, State};

mod execution;
pub use self::execution::{Execution, ParseStatusError, Status, Transition};

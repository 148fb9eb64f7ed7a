#![deny(missing_debug_implementations, rust_2018_idioms)]

//! A state-space explorer for multithreaded programs.
//!
//! Concurrent programs hide bugs in rare thread interleavings: a test may
//! pass millions of times and still fail in production when the scheduler
//! happens to pick the one ordering nobody exercised. This crate attacks the
//! problem by *enumerating* interleavings instead of sampling them. The
//! program under test is compiled with a record-and-replay instrumentation
//! pass; the explorer repeatedly replays it under a chosen schedule, reads
//! back the trace of visible operations (loads, stores, lock operations),
//! and derives from that trace which alternative schedules still need to be
//! run.
//!
//! A naive enumeration explodes combinatorially, so the explorer implements
//! dynamic partial-order reduction: a vector-clock based happens-before
//! relation identifies which transitions actually race, and a pluggable
//! reduction mode (persistent sets, source sets, bounded search, or
//! bound-persistent sets) prunes schedules that only reorder independent
//! operations. Sleep sets suppress redundant re-exploration of commutative
//! branches.
//!
//! # Architecture
//!
//! The crate is the *driver* side of the tool:
//!
//! - [`program`] models one execution of the instrumented program: tagged
//!   instructions, per-step states, and the execution trace itself.
//! - [`trace`] is the textual codec for the `record.txt` file the replay
//!   runtime emits.
//! - [`scheduler`] holds the seam to the external replayer: the schedule and
//!   scheduler-settings file formats, the [`Replayer`](scheduler::Replayer)
//!   interface, and the replay-side sleep-set selector.
//! - [`exploration`] is the stateful core: vector clocks, the
//!   happens-before relation, sleep and sufficient sets, the reduction
//!   modes, the depth-first driver, and the outer exploration loop.
//!
//! Three binaries (`dpor`, `bounded-search`, `depth-first-search`) wire a
//! concrete reduction mode into [`exploration::Exploration`].
//!
//! # Diagnostics
//!
//! All diagnostics go through [`tracing`]. The binaries install a
//! subscriber filtered by the `EXPLORER_LOG` environment variable, so
//! `EXPLORER_LOG=trace` prints every scheduling decision of a run.

pub mod cli;
pub mod exploration;
pub mod program;
pub mod scheduler;
pub mod trace;

//! Textual codec for the traces the replayer emits.
//!
//! `record.txt` carries the full transition list:
//!
//! ```text
//! nr_threads 3
//! status OK
//! state enabled=0,1,2 next=0 store 1;1 load 0;2 load 2
//! 1 0 store 1
//! state enabled=1,2 next=1 load 0;2 load 2
//! 2 1 load 0
//! state enabled=2 next=2 load 2
//! ...
//! ```
//!
//! The first `state` line is the initial state; each transition line
//! (`<index> <instruction>`) is followed by the state it produced.
//! `record_short.txt` abbreviates a run to its schedule and status.

use crate::program::{Execution, Instruction, State, Status};
use crate::scheduler::schedule_of;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Failure to obtain an execution from a trace file.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace unreadable: {0}")]
    Io(#[from] io::Error),

    #[error("trace line {line}: {message}")]
    Parse { line: usize, message: String },
}

fn parse_error(line: usize, message: impl Into<String>) -> TraceError {
    TraceError::Parse { line, message: message.into() }
}

/// Writes the full trace of `execution`.
pub fn write_record(execution: &Execution, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "nr_threads {}", execution.nr_threads())?;
    writeln!(out, "status {}", execution.status())?;
    writeln!(out, "state {}", execution.initial_state())?;
    for t in execution.transitions() {
        writeln!(out, "{} {}", t.index(), t.instr())?;
        writeln!(out, "state {}", t.post())?;
    }
    Ok(())
}

/// Writes the abbreviated trace of `execution`.
pub fn write_record_short(execution: &Execution, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "schedule {}", schedule_of(execution))?;
    writeln!(out, "status {}", execution.status())
}

/// Line cursor skipping blanks, tracking 1-based file line numbers.
struct Lines {
    lines: Vec<String>,
    pos: usize,
}

impl Lines {
    fn next(&mut self) -> Option<(usize, String)> {
        while self.pos < self.lines.len() {
            self.pos += 1;
            let line = self.lines[self.pos - 1].trim();
            if !line.is_empty() {
                return Some((self.pos, line.to_string()));
            }
        }
        None
    }

    fn expect(&mut self, prefix: &str) -> Result<(usize, String), TraceError> {
        let end = self.lines.len();
        let (nr, line) = self
            .next()
            .ok_or_else(|| parse_error(end, format!("missing `{}` line", prefix.trim())))?;
        let rest = line
            .strip_prefix(prefix)
            .ok_or_else(|| parse_error(nr, format!("expected `{}`, got `{}`", prefix.trim(), line)))?;
        Ok((nr, rest.trim().to_string()))
    }
}

/// Reads a full trace back into an [`Execution`].
pub fn read_record(input: impl BufRead) -> Result<Execution, TraceError> {
    let mut lines = Lines {
        lines: input.lines().collect::<Result<_, _>>()?,
        pos: 0,
    };

    let (nr, nr_threads) = lines.expect("nr_threads ")?;
    let nr_threads: usize = nr_threads
        .parse()
        .map_err(|_| parse_error(nr, "malformed thread count"))?;

    let (nr, status) = lines.expect("status ")?;
    let status: Status = status.parse().map_err(|_| parse_error(nr, "unknown status"))?;

    let (nr, initial) = lines.expect("state ")?;
    let initial: State = initial.parse().map_err(|_| parse_error(nr, "malformed state"))?;

    let mut execution = Execution::new(nr_threads, initial);
    let mut expected_index = 1;
    while let Some((nr, line)) = lines.next() {
        let (index, instruction) = line
            .split_once(' ')
            .ok_or_else(|| parse_error(nr, "expected a transition"))?;
        let index: usize = index
            .parse()
            .map_err(|_| parse_error(nr, "malformed transition index"))?;
        if index != expected_index {
            return Err(parse_error(nr, format!("expected transition {}", expected_index)));
        }
        let instruction: Instruction = instruction
            .parse()
            .map_err(|_| parse_error(nr, "malformed instruction"))?;

        let (nr, post) = lines.expect("state ")?;
        let post: State = post.parse().map_err(|_| parse_error(nr, "malformed state"))?;

        if execution.final_state().next(instruction.tid()) != Some(&instruction)
            || !execution.final_state().is_enabled(instruction.tid())
        {
            return Err(parse_error(nr, "transition does not follow from its pre state"));
        }
        execution.push(instruction, post);
        expected_index += 1;
    }
    execution.set_status(status);
    Ok(execution)
}

/// Reads `record.txt` from disk.
pub fn read_record_file(path: &Path) -> Result<Execution, TraceError> {
    let file = fs::File::open(path)?;
    read_record(io::BufReader::new(file))
}

/// Writes `record.txt` to disk.
pub fn write_record_file(execution: &Execution, path: &Path) -> io::Result<()> {
    let mut out = io::BufWriter::new(fs::File::create(path)?);
    write_record(execution, &mut out)
}

//! Shared command-line handling for the exploration binaries.

use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// State-space exploration options.
#[derive(Debug, Parser)]
pub struct Options {
    /// The system under test, instrumented with the record-replay
    /// compiler pass
    #[arg(long = "i", value_name = "PATH")]
    pub program: PathBuf,

    /// The maximum number of executions explored
    #[arg(long = "max", value_name = "N")]
    pub max_nr_explorations: u32,

    /// The directory where output files are dumped
    #[arg(long = "o", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// The bound to be used with a bounded-search based exploration
    #[arg(long = "bound", value_name = "N", default_value_t = 0)]
    pub bound: u64,

    /// The bound function to be used with a bounded-search based
    /// exploration (values: preemptions)
    #[arg(long = "bound-function", value_name = "NAME", default_value = "preemptions")]
    pub bound_function: String,

    /// The sufficient-set implementation to be used with DPOR based
    /// exploration (values: persistent, source, bound-persistent)
    #[arg(long = "sufficient-set", value_name = "NAME", default_value = "persistent")]
    pub sufficient_set: String,
}

/// Parses the command line; prints help and exits 1 on malformed
/// arguments.
pub fn parse() -> Options {
    match Options::try_parse() {
        Ok(options) => options,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            process::exit(0);
        }
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    }
}

/// Installs the `tracing` subscriber, filtered by `EXPLORER_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("EXPLORER_LOG"))
        .without_time()
        .init();
}

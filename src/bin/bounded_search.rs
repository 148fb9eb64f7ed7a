//! Bounded search: explore every schedule within the bound.

use statespace_explorer::cli;
use statespace_explorer::exploration::bound_functions::Preemptions;
use statespace_explorer::exploration::{Bound, DepthFirstSearch, Exploration, Settings};
use statespace_explorer::scheduler::Schedule;

use std::process;

fn main() {
    cli::init_tracing();
    let options = cli::parse();

    if options.bound_function != "preemptions" {
        eprintln!(
            "unknown bound function `{}`; has to be in {{ preemptions }}",
            options.bound_function
        );
        process::exit(1);
    }

    let mode = DepthFirstSearch::new(Bound::<Preemptions>::new(options.bound));
    let mut exploration = Exploration::new(&options.program, options.max_nr_explorations, mode);
    exploration.set_settings(Settings {
        output_dir: options.output_dir.clone(),
        ..Settings::default()
    });
    if let Err(e) = exploration.run(Schedule::new()) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

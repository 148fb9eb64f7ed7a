//! DPOR-based exploration with a configurable sufficient-set
//! implementation.

use statespace_explorer::cli;
use statespace_explorer::exploration::bound_functions::Preemptions;
use statespace_explorer::exploration::{
    BoundPersistent, DepthFirstSearch, Dpor, Exploration, Mode, Persistent, Settings, Source,
};
use statespace_explorer::scheduler::Schedule;

use std::process;

fn main() {
    cli::init_tracing();
    let options = cli::parse();

    let result = match options.sufficient_set.as_str() {
        "persistent" => run(&options, DepthFirstSearch::new(Dpor::new(Persistent))),
        "source" => run(&options, DepthFirstSearch::new(Dpor::new(Source))),
        "bound-persistent" => run(
            &options,
            DepthFirstSearch::new(Dpor::new(BoundPersistent::<Preemptions>::new(options.bound))),
        ),
        other => {
            eprintln!(
                "unknown sufficient set `{}`; has to be in {{ persistent, source, bound-persistent }}",
                other
            );
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run<M: Mode>(
    options: &cli::Options,
    mode: M,
) -> Result<(), statespace_explorer::exploration::ExplorationError> {
    let mut exploration =
        Exploration::new(&options.program, options.max_nr_explorations, mode);
    exploration.set_settings(Settings {
        output_dir: options.output_dir.clone(),
        ..Settings::default()
    });
    exploration.run(Schedule::new())
}

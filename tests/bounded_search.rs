//! Exploration counts for plain bounded search.

#[allow(dead_code)]
mod common;

use common::{readers, two_writers, SimProgram, SimulatedReplayer};
use statespace_explorer::exploration::bound_functions::{BoundValue, Preemptions};
use statespace_explorer::exploration::{Bound, DepthFirstSearch, Exploration, Settings};
use statespace_explorer::scheduler::Schedule;

fn explore(bound: BoundValue, program: SimProgram, max: u32) -> u32 {
    let dir = tempfile::tempdir().unwrap();
    let mode = DepthFirstSearch::new(Bound::<Preemptions>::new(bound));
    let replayer = SimulatedReplayer::new(program);
    let mut exploration = Exploration::with_replayer("sim-program", max, mode, replayer);
    exploration.set_settings(Settings {
        output_dir: Some(dir.path().join("output")),
        schedules_dir: dir.path().join("schedules"),
        ..Settings::default()
    });
    exploration.run(Schedule::new()).unwrap();
    exploration.statistics().nr_explorations()
}

#[test]
fn preemption_bound_zero_enumerates_thread_orders() {
    // without preemptions, readers-nonpreemptive has 3! complete schedules
    assert_eq!(explore(0, readers(3), 100), 6);
    assert_eq!(explore(0, two_writers(), 100), 2);
}

#[test]
fn an_unbounded_search_enumerates_every_interleaving() {
    // 5 transitions in blocks of 1, 2 and 2: 5! / (1! 2! 2!) = 30
    assert_eq!(explore(BoundValue::MAX, readers(3), 1000), 30);
}

#[test]
fn an_unbounded_smoke_run_survives_thousands_of_explorations() {
    // readers with four reader threads: 9 transitions in blocks of
    // 1,2,2,2,2 give 9!/2^4 = 22680 interleavings
    let nr = explore(BoundValue::MAX, readers(5), 50_000);
    assert_eq!(nr, 22_680);
    assert!(nr >= 2_000);
}

#[test]
fn the_bound_trims_monotonically() {
    let unbounded = explore(BoundValue::MAX, readers(3), 1000);
    let one = explore(1, readers(3), 1000);
    let zero = explore(0, readers(3), 1000);
    assert!(zero <= one && one <= unbounded);
}

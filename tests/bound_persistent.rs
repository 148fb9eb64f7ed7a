//! Exploration counts for DPOR with bound-persistent sets.

#[allow(dead_code)]
mod common;

use common::{disjoint_writers, readers, two_writers, SimProgram, SimulatedReplayer};
use statespace_explorer::exploration::bound_functions::Preemptions;
use statespace_explorer::exploration::{
    BoundPersistent, BoundPersistentOptions, DepthFirstSearch, Dpor, Exploration, Settings,
    SleepSetMode,
};
use statespace_explorer::scheduler::Schedule;

fn explore(
    policy: BoundPersistent<Preemptions>,
    program: SimProgram,
    max: u32,
) -> (u32, u32) {
    let dir = tempfile::tempdir().unwrap();
    let mode = DepthFirstSearch::new(Dpor::new(policy));
    let replayer = SimulatedReplayer::new(program);
    let mut exploration = Exploration::with_replayer("sim-program", max, mode, replayer);
    exploration.set_settings(Settings {
        output_dir: Some(dir.path().join("output")),
        schedules_dir: dir.path().join("schedules"),
        ..Settings::default()
    });
    exploration.run(Schedule::new()).unwrap();
    let nr = exploration.statistics().nr_explorations();
    let blocked = exploration.mode().reduction().statistics().nr_sleepset_blocked();
    (nr, blocked)
}

#[test]
fn a_two_writer_race_needs_two_explorations_at_bound_zero() {
    assert_eq!(explore(BoundPersistent::new(0), two_writers(), 100), (2, 0));
}

#[test]
fn a_high_bound_behaves_like_persistent_sets() {
    // no subtree exceeds the bound, so pending points never materialize
    assert_eq!(explore(BoundPersistent::new(10), readers(3), 100), (5, 1));
}

#[test]
fn a_tight_bound_still_terminates() {
    let (nr, _) = explore(BoundPersistent::new(0), readers(3), 1000);
    assert!((2..=30).contains(&nr), "explored {} interleavings", nr);
}

#[test]
fn disjoint_threads_need_one_exploration() {
    assert_eq!(explore(BoundPersistent::new(0), disjoint_writers(4), 100), (1, 0));
}

#[test]
fn sleep_sets_never_still_covers_the_race() {
    let options = BoundPersistentOptions::new(true, true, true, SleepSetMode::Never);
    let policy = BoundPersistent::with_options(2, options);
    let (nr, blocked) = explore(policy, two_writers(), 100);
    assert_eq!(blocked, 0);
    assert_eq!(nr, 2);
}

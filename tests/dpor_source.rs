//! End-to-end exploration counts for DPOR with source sets.

#[allow(dead_code)]
mod common;

use common::{lock_pair, readers, two_writers, SimProgram, SimulatedReplayer};
use statespace_explorer::exploration::{
    DepthFirstSearch, Dpor, Exploration, ExplorationError, Persistent, Settings, Source,
    SufficientSetPolicy,
};
use statespace_explorer::scheduler::Schedule;

fn explore<S: SufficientSetPolicy>(
    policy: S,
    program: SimProgram,
    max: u32,
) -> Result<(u32, u32), ExplorationError> {
    let dir = tempfile::tempdir().unwrap();
    let mode = DepthFirstSearch::new(Dpor::new(policy));
    let replayer = SimulatedReplayer::new(program);
    let mut exploration = Exploration::with_replayer("sim-program", max, mode, replayer);
    exploration.set_settings(Settings {
        output_dir: Some(dir.path().join("output")),
        schedules_dir: dir.path().join("schedules"),
        ..Settings::default()
    });
    exploration.run(Schedule::new())?;
    let nr = exploration.statistics().nr_explorations();
    let blocked = exploration.mode().reduction().statistics().nr_sleepset_blocked();
    Ok((nr, blocked))
}

#[test]
fn readers_nonpreemptive_needs_four_explorations() {
    // source sets skip the sleep-set-blocked fifth run of persistent sets
    assert_eq!(explore(Source, readers(3), 100).unwrap(), (4, 0));
}

#[test]
fn source_explores_fewer_runs_than_persistent() {
    let (source, _) = explore(Source, readers(3), 100).unwrap();
    let (persistent, _) = explore(Persistent, readers(3), 100).unwrap();
    assert!(source < persistent, "source {} vs persistent {}", source, persistent);
}

#[test]
fn a_two_writer_race_needs_two_explorations() {
    assert_eq!(explore(Source, two_writers(), 100).unwrap(), (2, 0));
}

#[test]
fn lock_bearing_programs_are_rejected() {
    match explore(Source, lock_pair(), 100) {
        Err(ExplorationError::InvalidProgram(_)) => {}
        other => panic!("expected an invalid-program error, got {:?}", other.map(|_| ())),
    }
}

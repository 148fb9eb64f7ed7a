use crate::exploration::{BacktrackPoint, HappensBefore, SufficientSet, SufficientSetPolicy};
use crate::program::{Execution, TidSet};

use tracing::{error, trace};

/// Source-set sufficient sets (Abdulla, Aronis, Jonsson & Sagonas).
///
/// Backtrack points are the covering of each new transition. At a point,
/// nothing is added if the frame's backtrack set already intersects the
/// front of the incomparable suffix; otherwise one representative of the
/// front is.
///
/// Source sets assume no thread can disable another, so programs with lock
/// operations are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Source;

impl SufficientSetPolicy for Source {
    fn path(&self) -> String {
        "source".to_string()
    }

    fn check_valid(&self, contains_locks: bool) -> bool {
        if contains_locks {
            error!("source sets assume threads do not disable each other");
        }
        !contains_locks
    }

    fn backtrack_points(
        &self,
        execution: &Execution,
        index: usize,
        hb: &HappensBefore,
    ) -> Vec<BacktrackPoint> {
        let instr = execution.transition(index).instr();
        let covering = hb.covering(execution, index, instr);
        let points: Vec<_> = covering
            .into_iter()
            .map(|covering_index| BacktrackPoint { tid: instr.tid(), index: covering_index })
            .collect();
        trace!(index, ?points, "source backtrack points");
        points
    }

    fn add_backtrack_point(
        &mut self,
        execution: &Execution,
        index: usize,
        frames: &mut [SufficientSet],
        hb: &HappensBefore,
        point: BacktrackPoint,
    ) {
        let mut suffix = hb.incomparable_after(execution, point.index, index);
        suffix.insert(index);
        let front_tids = hb.tids(execution, &hb.front(execution, &suffix));
        assert!(!front_tids.is_empty());

        let frame = &frames[point.index - 1];
        let sources_for: TidSet =
            frame.backtrack().intersection(&front_tids).copied().collect();
        if sources_for.is_empty() {
            let add = if front_tids.contains(&point.tid) {
                point.tid
            } else {
                *front_tids.iter().next().unwrap()
            };
            trace!(%point, add, "add source backtrack point");
            frames[point.index - 1].add_to_backtrack(add);
        }
    }
}

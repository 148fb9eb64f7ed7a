use crate::exploration::{BacktrackPoint, HappensBefore, SufficientSet, SufficientSetPolicy};
use crate::program::{Execution, TidSet};

use tracing::trace;

/// Persistent-set sufficient sets (Flanagan & Godefroid).
///
/// For every pending instruction of the pre-state of a new transition, the
/// most recent dependent and co-enabled transition in the prefix becomes a
/// backtrack point. At the point, the pending thread itself is preferred;
/// if it is disabled or asleep there, a thread-transitive alternative is
/// added, and failing that every enabled thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Persistent;

impl Persistent {
    /// The alternative threads that can stand in for `point.tid` at the
    /// backtrack point: threads whose later transition reaches `point.tid`
    /// thread-transitively, restricted to threads enabled at the point and
    /// (optionally) awake there.
    pub(crate) fn alternatives(
        execution: &Execution,
        index: usize,
        frame: &SufficientSet,
        hb: &HappensBefore,
        point: BacktrackPoint,
        use_sleep: bool,
    ) -> TidSet {
        let mut alt = hb.thread_transitive_relation(execution, index, point.index, point.tid);
        alt.insert(point.tid);
        let enabled = execution.transition(point.index).pre().enabled();
        let alt_enabled: TidSet = alt.intersection(enabled).copied().collect();
        if use_sleep {
            frame.sleep().awake(&alt_enabled)
        } else {
            alt_enabled
        }
    }
}

impl SufficientSetPolicy for Persistent {
    fn path(&self) -> String {
        "persistent".to_string()
    }

    fn backtrack_points(
        &self,
        execution: &Execution,
        index: usize,
        hb: &HappensBefore,
    ) -> Vec<BacktrackPoint> {
        let mut points = Vec::new();
        for (tid, next) in execution.transition(index).pre().next_instructions() {
            let max_dep = hb.max_dependent(execution, index, next, true, true);
            if max_dep > 0 {
                points.push(BacktrackPoint { tid, index: max_dep });
            }
        }
        trace!(index, ?points, "persistent backtrack points");
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
        let state = execution.transition(point.index).pre();
        let frame = &frames[point.index - 1];
        // prioritize point.tid to avoid the call to alternatives
        if state.is_enabled(point.tid) && frame.sleep().is_awake(point.tid) {
            trace!(%point, add = point.tid, "add backtrack point");
            frames[point.index - 1].add_to_backtrack(point.tid);
            return;
        }
        let alternatives = Persistent::alternatives(execution, index, frame, hb, point, true);
        if let Some(&alt) = alternatives.iter().next() {
            trace!(%point, add = alt, "add backtrack point (alternative)");
            frames[point.index - 1].add_to_backtrack(alt);
        } else {
            trace!(%point, "add backtrack point (all enabled)");
            let enabled = state.enabled().clone();
            frames[point.index - 1].add_all_to_backtrack(&enabled);
        }
    }
}

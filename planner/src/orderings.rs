use std::collections::BTreeMap;

use weaver_collections::IdSet;
use weaver_model::StepTime;

use crate::plan::Step;
use crate::GOAL_ID;

/// An ordering constraint: `before_id` at `t1` is no later than
/// `after_id` at `t2`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Ordering {
    pub before_id: usize,
    pub t1: StepTime,
    pub after_id: usize,
    pub t2: StepTime,
}

impl Ordering {
    pub fn new(before_id: usize, t1: StepTime, after_id: usize, t2: StepTime) -> Ordering {
        Ordering {
            before_id,
            t1,
            after_id,
            t2,
        }
    }
}

/// The ordering constraints of a plan.
///
/// The two variants expose the same capability set; the binary engine
/// ignores step times (steps are atomic), the temporal engine tracks one
/// start and one end timepoint per step in a simple temporal network.
#[derive(Clone, Debug)]
pub enum Orderings {
    Binary(BinaryOrderings),
    Temporal(TemporalOrderings),
}

impl Orderings {
    pub fn is_temporal(&self) -> bool {
        matches!(self, Orderings::Temporal(_))
    }

    /// Returns the orderings refined with `o`, or `None` when that would
    /// be inconsistent.
    pub fn refine(&self, o: Ordering) -> Option<Orderings> {
        match self {
            Orderings::Binary(b) => b.refine(o).map(Orderings::Binary),
            Orderings::Temporal(t) => t.refine(o).map(Orderings::Temporal),
        }
    }

    /// Registers a new step (its timepoints and duration constraint).
    pub fn refine_step(&self, step: &Step) -> Option<Orderings> {
        match self {
            Orderings::Binary(b) => Some(Orderings::Binary(b.with_capacity_for(step.id))),
            Orderings::Temporal(t) => t.add_step(step).map(Orderings::Temporal),
        }
    }

    /// Imposes heuristic lower bounds on a step's start and end times.
    /// A no-op for binary orderings.
    pub fn refine_bounds(&self, step_id: usize, min_start: f32, min_end: f32) -> Option<Orderings> {
        match self {
            Orderings::Binary(_) => Some(self.clone()),
            Orderings::Temporal(t) => t.refine_bounds(step_id, min_start, min_end).map(Orderings::Temporal),
        }
    }

    /// True iff `id1@t1 < id2@t2` is possible.
    pub fn possibly_before(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match self {
            Orderings::Binary(b) => b.possibly_before(id1, id2),
            Orderings::Temporal(t) => t.possibly_before(id1, t1, id2, t2),
        }
    }

    /// True iff `id1@t1 > id2@t2` is possible.
    pub fn possibly_after(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        self.possibly_before(id2, t2, id1, t1)
    }

    /// True iff `id1@t1 >= id2@t2` is possible.
    pub fn possibly_not_before(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match self {
            Orderings::Binary(b) => b.possibly_not_before(id1, id2),
            Orderings::Temporal(t) => t.possibly_not_before(id1, t1, id2, t2),
        }
    }

    /// True iff `id1@t1 <= id2@t2` is possible.
    pub fn possibly_not_after(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match self {
            Orderings::Binary(b) => b.possibly_not_after(id1, id2),
            Orderings::Temporal(t) => t.possibly_not_after(id1, t1, id2, t2),
        }
    }

    /// If the two steps can overlap in time, the four concurrency flags
    /// (start-start, start-end, end-start, end-end); `None` otherwise.
    /// Binary plans always admit a total order, so they never report
    /// concurrency.
    pub fn possibly_concurrent(&self, id1: usize, id2: usize) -> Option<(bool, bool, bool, bool)> {
        match self {
            Orderings::Binary(_) => None,
            Orderings::Temporal(t) => t.possibly_concurrent(id1, id2),
        }
    }

    /// Earliest start and end times per ordinary step, plus the makespan.
    pub fn schedule(&self) -> (BTreeMap<usize, f32>, BTreeMap<usize, f32>, f32) {
        match self {
            Orderings::Binary(b) => b.schedule(),
            Orderings::Temporal(t) => t.schedule(),
        }
    }
}

/// Ordering constraints over atomic steps: one transitive-closure bitset
/// pair per ordinary step, copied on refinement.
///
/// The initial step (id 0) is implicitly before everything and the goal
/// step implicitly after everything; neither is stored.
#[derive(Clone, Debug, Default)]
pub struct BinaryOrderings {
    /// `before[i]` holds `id - 1` for every step id strictly before step
    /// `i + 1`; `after[i]` is the converse.
    before: Vec<IdSet<usize>>,
    after: Vec<IdSet<usize>>,
}

impl BinaryOrderings {
    pub fn new() -> BinaryOrderings {
        BinaryOrderings::default()
    }

    fn ordinary(id: usize) -> bool {
        id != 0 && id != GOAL_ID
    }

    /// True iff `a` is necessarily strictly before `b`.
    fn ordered(&self, a: usize, b: usize) -> bool {
        if a == b {
            false
        } else if a == 0 || b == GOAL_ID {
            true
        } else if b == 0 || a == GOAL_ID {
            false
        } else {
            self.before
                .get(b - 1)
                .map_or(false, |set| set.contains(a - 1))
        }
    }

    pub fn possibly_before(&self, a: usize, b: usize) -> bool {
        a != b && !self.ordered(b, a)
    }

    pub fn possibly_not_before(&self, a: usize, b: usize) -> bool {
        a == b || !self.ordered(a, b)
    }

    pub fn possibly_not_after(&self, a: usize, b: usize) -> bool {
        a == b || !self.ordered(b, a)
    }

    fn with_capacity_for(&self, id: usize) -> BinaryOrderings {
        let mut copy = self.clone();
        if Self::ordinary(id) {
            while copy.before.len() < id {
                copy.before.push(IdSet::new());
                copy.after.push(IdSet::new());
            }
        }
        copy
    }

    pub fn refine(&self, o: Ordering) -> Option<BinaryOrderings> {
        let (a, b) = (o.before_id, o.after_id);
        if a == b || a == 0 || b == GOAL_ID {
            return Some(self.clone());
        }
        if b == 0 || a == GOAL_ID || self.ordered(b, a) {
            return None;
        }
        if self.ordered(a, b) {
            return Some(self.clone());
        }
        let mut copy = self.with_capacity_for(a.max(b));
        // predecessors of a (plus a) become predecessors of b and of
        // everything after b; symmetrically for successors
        let mut preds = copy.before[a - 1].clone();
        preds.insert(a - 1);
        let mut succs = copy.after[b - 1].clone();
        succs.insert(b - 1);
        for s in succs.iter() {
            copy.before[s].union_with(&preds);
        }
        for p in preds.iter() {
            copy.after[p].union_with(&succs);
        }
        Some(copy)
    }

    pub fn schedule(&self) -> (BTreeMap<usize, f32>, BTreeMap<usize, f32>, f32) {
        let n = self.before.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| self.before[i].len());
        let mut depth = vec![1usize; n];
        for &i in &order {
            let d = self.before[i]
                .iter()
                .map(|p| depth[p] + 1)
                .max()
                .unwrap_or(1);
            depth[i] = d;
        }
        let mut starts = BTreeMap::new();
        let mut ends = BTreeMap::new();
        let mut makespan = 0.0f32;
        for i in 0..n {
            let t = depth[i] as f32;
            starts.insert(i + 1, t);
            ends.insert(i + 1, t);
            makespan = makespan.max(t);
        }
        (starts, ends, makespan)
    }
}

const INF: f32 = f32::INFINITY;

/// Ordering constraints over step timepoints: an all-pairs distance matrix
/// where `dist[i][j]` bounds `t_j - t_i` from above, tightened and
/// propagated on each refinement.
///
/// Timepoint 0 is the time origin (the initial step, pinned at 0); every
/// other timepoint is constrained to be nonnegative.
#[derive(Clone, Debug)]
pub struct TemporalOrderings {
    timepoints: BTreeMap<usize, (usize, usize)>,
    dist: Vec<Vec<f32>>,
}

impl TemporalOrderings {
    pub fn new() -> TemporalOrderings {
        let mut orderings = TemporalOrderings {
            timepoints: BTreeMap::new(),
            dist: vec![vec![0.0]],
        };
        orderings.timepoints.insert(0, (0, 0));
        // the goal step is instantaneous, somewhere at or after the origin
        let goal = orderings.new_timepoint();
        orderings.timepoints.insert(GOAL_ID, (goal, goal));
        orderings
    }

    fn new_timepoint(&mut self) -> usize {
        let n = self.dist.len();
        for row in &mut self.dist {
            row.push(INF);
        }
        let mut row = vec![INF; n + 1];
        row[n] = 0.0;
        self.dist.push(row);
        // t_0 - t_new <= 0: the new timepoint is at or after the origin
        let consistent = self.tighten(n, 0, 0.0);
        debug_assert!(consistent);
        n
    }

    fn timepoint(&self, id: usize, t: StepTime) -> Option<usize> {
        self.timepoints.get(&id).map(|&(s, e)| match t {
            StepTime::Start => s,
            StepTime::End => e,
        })
    }

    /// Tightens `t_j - t_i <= w` and propagates. False on inconsistency.
    fn tighten(&mut self, i: usize, j: usize, w: f32) -> bool {
        if self.dist[i][j] <= w {
            return true;
        }
        self.dist[i][j] = w;
        let n = self.dist.len();
        for u in 0..n {
            let du_i = self.dist[u][i];
            if du_i == INF {
                continue;
            }
            for v in 0..n {
                let dj_v = self.dist[j][v];
                if dj_v == INF {
                    continue;
                }
                let via = du_i + w + dj_v;
                if via < self.dist[u][v] {
                    self.dist[u][v] = via;
                }
            }
        }
        (0..n).all(|x| self.dist[x][x] >= 0.0)
    }

    /// Registers the two timepoints of a step with its duration
    /// constraint. Already-registered steps are left untouched.
    pub fn add_step(&self, step: &Step) -> Option<TemporalOrderings> {
        if self.timepoints.contains_key(&step.id) {
            return Some(self.clone());
        }
        let mut copy = self.clone();
        let start = copy.new_timepoint();
        let end = copy.new_timepoint();
        copy.timepoints.insert(step.id, (start, end));
        let (min_dur, max_dur) = if step.action.durative {
            (step.action.min_duration, step.action.max_duration)
        } else {
            (0.0, 0.0)
        };
        if !copy.tighten(start, end, max_dur) || !copy.tighten(end, start, -min_dur) {
            return None;
        }
        Some(copy)
    }

    /// Pins both timepoints of a step to an absolute time, as needed for
    /// timed initial literals.
    pub fn pin_step(&self, id: usize, time: f32) -> Option<TemporalOrderings> {
        let mut copy = self.clone();
        let (s, e) = *copy.timepoints.get(&id)?;
        if copy.tighten(0, s, time)
            && copy.tighten(s, 0, -time)
            && copy.tighten(0, e, time)
            && copy.tighten(e, 0, -time)
        {
            Some(copy)
        } else {
            None
        }
    }

    pub fn refine(&self, o: Ordering) -> Option<TemporalOrderings> {
        let tp_before = self.timepoint(o.before_id, o.t1);
        let tp_after = self.timepoint(o.after_id, o.t2);
        let (tp_before, tp_after) = match (tp_before, tp_after) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                debug_assert!(false, "ordering over unregistered step");
                return None;
            }
        };
        let mut copy = self.clone();
        // t_before <= t_after
        if copy.tighten(tp_after, tp_before, 0.0) {
            Some(copy)
        } else {
            None
        }
    }

    pub fn refine_bounds(&self, step_id: usize, min_start: f32, min_end: f32) -> Option<TemporalOrderings> {
        if !min_start.is_finite() || !min_end.is_finite() {
            return None;
        }
        let (s, e) = *self.timepoints.get(&step_id)?;
        let mut copy = self.clone();
        if copy.tighten(s, 0, -min_start) && copy.tighten(e, 0, -min_end) {
            Some(copy)
        } else {
            None
        }
    }

    pub fn possibly_before(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match (self.timepoint(id1, t1), self.timepoint(id2, t2)) {
            (Some(a), Some(b)) => self.dist[a][b] > 0.0,
            _ => id1 != id2,
        }
    }

    pub fn possibly_not_before(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match (self.timepoint(id1, t1), self.timepoint(id2, t2)) {
            (Some(a), Some(b)) => self.dist[b][a] >= 0.0,
            _ => true,
        }
    }

    pub fn possibly_not_after(&self, id1: usize, t1: StepTime, id2: usize, t2: StepTime) -> bool {
        match (self.timepoint(id1, t1), self.timepoint(id2, t2)) {
            (Some(a), Some(b)) => self.dist[a][b] >= 0.0,
            _ => true,
        }
    }

    pub fn possibly_concurrent(&self, id1: usize, id2: usize) -> Option<(bool, bool, bool, bool)> {
        if id1 == id2 || id1 == 0 || id2 == 0 || id1 == GOAL_ID || id2 == GOAL_ID {
            return None;
        }
        let &(s1, e1) = self.timepoints.get(&id1)?;
        let &(s2, e2) = self.timepoints.get(&id2)?;
        let coincide = |a: usize, b: usize| self.dist[a][b] >= 0.0 && self.dist[b][a] >= 0.0;
        let flags = (
            coincide(s1, s2),
            coincide(s1, e2),
            coincide(e1, s2),
            coincide(e1, e2),
        );
        if flags.0 || flags.1 || flags.2 || flags.3 {
            Some(flags)
        } else {
            None
        }
    }

    pub fn schedule(&self) -> (BTreeMap<usize, f32>, BTreeMap<usize, f32>, f32) {
        let mut starts = BTreeMap::new();
        let mut ends = BTreeMap::new();
        let mut makespan = 0.0f32;
        for (&id, &(s, e)) in &self.timepoints {
            if id == 0 || id == GOAL_ID {
                continue;
            }
            let earliest_start = -self.dist[s][0];
            let earliest_end = -self.dist[e][0];
            starts.insert(id, earliest_start);
            ends.insert(id, earliest_end);
            makespan = makespan.max(earliest_end);
        }
        (starts, ends, makespan)
    }
}

impl Default for TemporalOrderings {
    fn default() -> Self {
        TemporalOrderings::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use weaver_model::Action;

    fn step(id: usize) -> Step {
        Step {
            id,
            action: Rc::new(Action::new("a")),
        }
    }

    fn durative_step(id: usize, dur: f32) -> Step {
        Step {
            id,
            action: Rc::new(Action::new("a").durative(dur, dur)),
        }
    }

    #[test]
    fn binary_cycle_rejected() {
        let o = BinaryOrderings::new();
        let o = o
            .refine(Ordering::new(1, StepTime::End, 2, StepTime::Start))
            .unwrap();
        let o = o
            .refine(Ordering::new(2, StepTime::End, 3, StepTime::Start))
            .unwrap();
        assert!(o.ordered(1, 3));
        assert!(o.refine(Ordering::new(3, StepTime::End, 1, StepTime::Start)).is_none());
    }

    #[test]
    fn binary_initial_and_goal_are_implicit() {
        let o = BinaryOrderings::new();
        assert!(o.possibly_before(0, 5));
        assert!(!o.possibly_before(5, 0));
        assert!(o.possibly_before(5, GOAL_ID));
        // the goal step can never be at or before an ordinary step
        assert!(!o.possibly_not_after(GOAL_ID, 5));
    }

    #[test]
    fn binary_schedule_depth() {
        let o = BinaryOrderings::new()
            .refine(Ordering::new(1, StepTime::End, 2, StepTime::Start))
            .unwrap()
            .refine(Ordering::new(2, StepTime::End, 3, StepTime::Start))
            .unwrap();
        let (starts, _, makespan) = o.schedule();
        assert_eq!(starts[&1], 1.0);
        assert_eq!(starts[&2], 2.0);
        assert_eq!(starts[&3], 3.0);
        assert_eq!(makespan, 3.0);
    }

    #[test]
    fn temporal_orders_and_detects_inconsistency() {
        let t = TemporalOrderings::new();
        let t = t.add_step(&durative_step(1, 2.0)).unwrap();
        let t = t.add_step(&durative_step(2, 3.0)).unwrap();
        let t = t
            .refine(Ordering::new(1, StepTime::End, 2, StepTime::Start))
            .unwrap();
        assert!(!t.possibly_before(2, StepTime::Start, 1, StepTime::End));
        assert!(t
            .refine(Ordering::new(2, StepTime::End, 1, StepTime::Start))
            .is_none());
        let (starts, ends, makespan) = t.schedule();
        assert_eq!(starts[&1], 0.0);
        assert_eq!(ends[&1], 2.0);
        assert_eq!(starts[&2], 2.0);
        assert_eq!(makespan, 5.0);
    }

    #[test]
    fn temporal_concurrency_flags() {
        let t = TemporalOrderings::new();
        let t = t.add_step(&durative_step(1, 2.0)).unwrap();
        let t = t.add_step(&durative_step(2, 2.0)).unwrap();
        assert!(t.possibly_concurrent(1, 2).is_some());
        let t = t
            .refine(Ordering::new(1, StepTime::End, 2, StepTime::Start))
            .unwrap();
        // end of 1 may still coincide with start of 2
        let flags = t.possibly_concurrent(1, 2).unwrap();
        assert!(!flags.0);
        assert!(flags.2);
    }

    #[test]
    fn pinned_step_schedules_at_absolute_time() {
        let t = TemporalOrderings::new();
        let t = t.add_step(&step(1)).unwrap();
        let t = t.pin_step(1, 4.5).unwrap();
        let (starts, _, makespan) = t.schedule();
        assert_eq!(starts[&1], 4.5);
        assert_eq!(makespan, 4.5);
    }
}

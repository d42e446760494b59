//! Combining the streams of a query plan into one ordered id sequence.

use msgstore_core::MessageId;
use tracing::warn;

use super::intersect::{Flow, MultiFilter, NumberUnion, Order, Pos};
use super::plan::{DimensionPlan, Part, QueryPlan, SourceId};

#[derive(Debug)]
enum Dim {
    Direct,
    Union(NumberUnion),
}

/// Merge state of one running query.
///
/// Cursors report entries and exhaustion through [`QueryState::on_entry`]
/// and [`QueryState::on_done`]; both return the ids that became results, in
/// order. A single dimension passes its stream through; several are
/// intersected.
#[derive(Debug)]
pub(crate) struct QueryState {
    dims: Vec<Dim>,
    /// Dimensions whose end has been reported to the merge.
    ended: Vec<bool>,
    merge: Option<MultiFilter>,
    finished: bool,
}

impl QueryState {
    pub(crate) fn new(plan: &QueryPlan) -> Self {
        let order = Order::new(plan.direction.is_reverse());
        let dims: Vec<Dim> = plan
            .dimensions
            .iter()
            .map(|d| match d {
                DimensionPlan::Direct(_) => Dim::Direct,
                DimensionPlan::Union { numbers, .. } => {
                    Dim::Union(NumberUnion::new(numbers.len(), order))
                }
            })
            .collect();
        let merge = (dims.len() > 1).then(|| MultiFilter::new(dims.len(), order));
        Self {
            ended: vec![false; dims.len()],
            dims,
            merge,
            finished: false,
        }
    }

    /// A cursor yielded `id` at timestamp `ts`.
    pub(crate) fn on_entry(&mut self, source: SourceId, id: MessageId, ts: i64) -> Vec<MessageId> {
        if self.finished || self.ended[source.dim] {
            return Vec::new();
        }
        let produced = match (&mut self.dims[source.dim], source.part) {
            (Dim::Direct, Part::Direct) => vec![(ts, id)],
            (Dim::Union(union), Part::Clock) => union.on_clock(id, ts),
            (Dim::Union(union), Part::Number(k)) => union.on_number(k, id, ts),
            (_, part) => {
                warn!(dim = source.dim, ?part, "entry from a source the plan does not have");
                Vec::new()
            }
        };
        let out = self.feed(source.dim, produced);
        self.settle(source.dim);
        out
    }

    /// A cursor ran out of entries.
    pub(crate) fn on_done(&mut self, source: SourceId) -> Vec<MessageId> {
        if self.finished || self.ended[source.dim] {
            return Vec::new();
        }
        if matches!(self.dims[source.dim], Dim::Direct) {
            self.end(source.dim);
            return Vec::new();
        }
        let produced = match (&mut self.dims[source.dim], source.part) {
            (Dim::Union(union), Part::Clock) => union.finish_clock(),
            (Dim::Union(union), Part::Number(k)) => union.finish_number(k),
            _ => Vec::new(),
        };
        let out = self.feed(source.dim, produced);
        self.settle(source.dim);
        out
    }

    /// Whether the cursor behind `source` should keep scanning.
    pub(crate) fn wants(&self, source: SourceId) -> bool {
        if self.finished || self.ended[source.dim] {
            return false;
        }
        match (&self.dims[source.dim], source.part) {
            (Dim::Direct, _) => true,
            (Dim::Union(union), Part::Clock) => union.wants_clock(),
            (Dim::Union(union), Part::Number(k)) => union.wants_number(k),
            (Dim::Union(_), Part::Direct) => false,
        }
    }

    /// Whether every result has been produced.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop the query without further results.
    pub(crate) fn abort(&mut self) {
        self.finished = true;
    }

    fn feed(&mut self, dim: usize, produced: Vec<Pos>) -> Vec<MessageId> {
        let Some(merge) = self.merge.as_mut() else {
            return produced.into_iter().map(|(_, id)| id).collect();
        };
        let mut out = Vec::new();
        for (ts, id) in produced {
            let (hit, flow) = merge.push(dim, id, ts);
            out.extend(hit);
            if flow == Flow::Stop {
                break;
            }
        }
        if merge.is_done(dim) {
            self.ended[dim] = true;
            if let Dim::Union(union) = &mut self.dims[dim] {
                union.close();
            }
        }
        if merge.is_finished() {
            self.finished = true;
        }
        out
    }

    /// Report a union's end once it can produce nothing more.
    fn settle(&mut self, dim: usize) {
        let exhausted = matches!(&self.dims[dim], Dim::Union(union) if union.is_finished());
        if exhausted {
            self.end(dim);
        }
    }

    fn end(&mut self, dim: usize) {
        if self.ended[dim] {
            return;
        }
        self.ended[dim] = true;
        match self.merge.as_mut() {
            Some(merge) => {
                merge.finish(dim);
                self.finished = merge.is_finished();
            }
            None => self.finished = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use msgstore_core::{Delivery, MessageFilter};

    use super::*;

    fn id(n: u64) -> MessageId {
        MessageId::new(n)
    }

    fn source(dim: usize, part: Part) -> SourceId {
        SourceId { dim, part }
    }

    #[test]
    fn test_single_dimension_passes_through() {
        let plan = QueryPlan::new(&MessageFilter::new(), false);
        let mut state = QueryState::new(&plan);
        let s = source(0, Part::Direct);
        assert_eq!(state.on_entry(s, id(1), 1), vec![id(1)]);
        assert_eq!(state.on_entry(s, id(2), 2), vec![id(2)]);
        assert!(state.wants(s));
        assert!(state.on_done(s).is_empty());
        assert!(state.is_finished());
        assert!(!state.wants(s));
    }

    #[test]
    fn test_union_alone_feeds_results() {
        let plan = QueryPlan::new(&MessageFilter::new().numbers(["+1", "+2"]), false);
        let mut state = QueryState::new(&plan);
        let clock = source(0, Part::Clock);
        let n1 = source(0, Part::Number(0));
        let n2 = source(0, Part::Number(1));

        let mut out = Vec::new();
        out.extend(state.on_entry(clock, id(1), 10));
        out.extend(state.on_entry(clock, id(2), 20));
        out.extend(state.on_entry(clock, id(3), 30));
        out.extend(state.on_entry(n2, id(3), 30));
        out.extend(state.on_entry(n1, id(1), 10));
        out.extend(state.on_done(n1));
        out.extend(state.on_done(n2));
        assert_eq!(out, vec![id(1), id(3)]);
        assert!(!state.is_finished() || !state.wants(clock));
        out.extend(state.on_done(clock));
        assert!(state.is_finished());
    }

    #[test]
    fn test_union_inside_intersection() {
        let filter = MessageFilter::new()
            .delivery(Delivery::Received)
            .numbers(["+1", "+2"]);
        let plan = QueryPlan::new(&filter, false);
        let mut state = QueryState::new(&plan);
        let delivery = source(0, Part::Direct);
        let clock = source(1, Part::Clock);
        let n1 = source(1, Part::Number(0));
        let n2 = source(1, Part::Number(1));

        let mut out = Vec::new();
        // Received: 2, 3, 5. Numbers: +1 -> 1, 2; +2 -> 5.
        out.extend(state.on_entry(delivery, id(2), 20));
        out.extend(state.on_entry(n1, id(1), 10));
        out.extend(state.on_entry(n1, id(2), 20));
        out.extend(state.on_entry(n2, id(5), 50));
        for (n, ts) in [(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)] {
            out.extend(state.on_entry(clock, id(n), ts));
        }
        assert_eq!(out, vec![id(2)]);
        out.extend(state.on_entry(delivery, id(3), 30));
        out.extend(state.on_entry(delivery, id(5), 50));
        // 5 waits in the clock until "+1" is known to be past it.
        assert_eq!(out, vec![id(2)]);
        out.extend(state.on_done(n1));
        assert_eq!(out, vec![id(2), id(5)]);
        out.extend(state.on_done(delivery));
        assert!(state.is_finished());
        assert!(!state.wants(clock));
    }

    #[test]
    fn test_abort_stops_everything() {
        let plan = QueryPlan::new(&MessageFilter::new().read(true), true);
        let mut state = QueryState::new(&plan);
        state.abort();
        let s = source(0, Part::Direct);
        assert!(!state.wants(s));
        assert!(state.on_entry(s, id(1), 1).is_empty());
    }
}

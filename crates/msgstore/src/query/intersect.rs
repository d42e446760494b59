//! Incremental intersection and union of sorted id streams.
//!
//! Every stream yields `(timestamp, id)` positions in the same total order
//! (ascending, or descending for reverse queries), because every index
//! entry sorts by timestamp and then by primary key. Streams advance
//! independently; nothing here assumes how their arrivals interleave.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use msgstore_core::MessageId;

/// A position in scan order.
pub(crate) type Pos = (i64, MessageId);

/// Whether a stream should keep scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Order {
    reverse: bool,
}

impl Order {
    pub(crate) fn new(reverse: bool) -> Self {
        Self { reverse }
    }

    /// Whether a stream at `frontier` has moved strictly beyond `pos`.
    fn passed(self, frontier: Pos, pos: Pos) -> bool {
        if self.reverse {
            frontier < pos
        } else {
            frontier > pos
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Intersection
// ─────────────────────────────────────────────────────────────────────────────

/// Intersection of several dimension streams.
///
/// A candidate is an id seen by some but not all dimensions. It becomes a
/// hit when the last dimension sees it, and is dropped as soon as some
/// dimension that has not seen it is exhausted or has moved past it.
#[derive(Debug)]
pub(crate) struct MultiFilter {
    order: Order,
    frontiers: Vec<Option<Pos>>,
    done: Vec<bool>,
    /// Candidate positions with the set of dimensions that have seen them.
    pending: BTreeMap<Pos, u64>,
    finished: bool,
}

impl MultiFilter {
    pub(crate) fn new(dimensions: usize, order: Order) -> Self {
        debug_assert!((1..=64).contains(&dimensions));
        Self {
            order,
            frontiers: vec![None; dimensions],
            done: vec![false; dimensions],
            pending: BTreeMap::new(),
            finished: false,
        }
    }

    fn full(&self) -> u64 {
        u64::MAX >> (64 - self.done.len())
    }

    /// Feed one entry of dimension `dim`. Returns the id if it now matches
    /// every dimension.
    pub(crate) fn push(&mut self, dim: usize, id: MessageId, ts: i64) -> (Option<MessageId>, Flow) {
        if self.finished || self.done[dim] {
            return (None, Flow::Stop);
        }
        let pos = (ts, id);
        self.frontiers[dim] = Some(pos);

        let seen = self.pending.remove(&pos).unwrap_or(0) | bit(dim);
        let hit = if seen == self.full() {
            Some(id)
        } else {
            if !self.is_dead(pos, seen) {
                self.pending.insert(pos, seen);
            }
            None
        };

        self.prune(dim, pos);
        let flow = if self.beyond_exhausted(pos) {
            // Everything this dimension could still yield lies past the end
            // of an exhausted one.
            self.finish(dim);
            Flow::Stop
        } else {
            self.refresh();
            if self.finished {
                Flow::Stop
            } else {
                Flow::Continue
            }
        };
        (hit, flow)
    }

    /// Dimension `dim` has no more entries.
    pub(crate) fn finish(&mut self, dim: usize) {
        if self.done[dim] {
            return;
        }
        self.done[dim] = true;
        self.pending.retain(|_, seen| *seen & bit(dim) != 0);
        self.refresh();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn is_done(&self, dim: usize) -> bool {
        self.finished || self.done[dim]
    }

    /// Number of candidates waiting on other dimensions.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn is_dead(&self, pos: Pos, seen: u64) -> bool {
        (0..self.done.len()).any(|j| {
            seen & bit(j) == 0
                && (self.done[j]
                    || self.frontiers[j].map_or(false, |f| self.order.passed(f, pos)))
        })
    }

    /// Drop candidates `dim` has moved past without seeing.
    fn prune(&mut self, dim: usize, frontier: Pos) {
        let order = self.order;
        self.pending
            .retain(|pos, seen| *seen & bit(dim) != 0 || !order.passed(frontier, *pos));
    }

    fn beyond_exhausted(&self, pos: Pos) -> bool {
        (0..self.done.len()).any(|j| {
            self.done[j]
                && self.frontiers[j].map_or(true, |f| self.order.passed(pos, f))
        })
    }

    /// The intersection is complete when every dimension is exhausted, or
    /// when an exhausted dimension has no candidate left: any future hit
    /// would need that dimension to have seen it.
    fn refresh(&mut self) {
        let all_done = self.done.iter().all(|d| *d);
        let starved = (0..self.done.len())
            .any(|j| self.done[j] && !self.pending.values().any(|seen| seen & bit(j) != 0));
        self.finished = all_done || starved;
    }
}

fn bit(dim: usize) -> u64 {
    1 << dim
}

// ─────────────────────────────────────────────────────────────────────────────
// Number union
// ─────────────────────────────────────────────────────────────────────────────

/// Messages exchanged with any of several numbers, in clock order.
///
/// The clock stream lists every message of the date range. Each number
/// stream marks its ids as members. A clock entry is emitted once it is a
/// member, and discarded once every number stream has moved past it or is
/// exhausted.
#[derive(Debug)]
pub(crate) struct NumberUnion {
    order: Order,
    clock: VecDeque<Pos>,
    clock_done: bool,
    /// Last clock position resolved either way.
    decided: Option<Pos>,
    members: BTreeSet<Pos>,
    frontiers: Vec<Option<Pos>>,
    done: Vec<bool>,
    closed: bool,
}

impl NumberUnion {
    pub(crate) fn new(numbers: usize, order: Order) -> Self {
        Self {
            order,
            clock: VecDeque::new(),
            clock_done: false,
            decided: None,
            members: BTreeSet::new(),
            frontiers: vec![None; numbers],
            done: vec![false; numbers],
            closed: false,
        }
    }

    pub(crate) fn on_clock(&mut self, id: MessageId, ts: i64) -> Vec<Pos> {
        if self.is_finished() {
            return Vec::new();
        }
        self.clock.push_back((ts, id));
        self.drain()
    }

    pub(crate) fn on_number(&mut self, k: usize, id: MessageId, ts: i64) -> Vec<Pos> {
        if self.is_finished() {
            return Vec::new();
        }
        let pos = (ts, id);
        self.frontiers[k] = Some(pos);
        let resolved = self
            .decided
            .map_or(false, |d| !self.order.passed(pos, d));
        if !resolved {
            self.members.insert(pos);
        }
        self.drain()
    }

    pub(crate) fn finish_clock(&mut self) -> Vec<Pos> {
        self.clock_done = true;
        self.drain()
    }

    pub(crate) fn finish_number(&mut self, k: usize) -> Vec<Pos> {
        self.done[k] = true;
        self.drain()
    }

    /// Stop producing output regardless of remaining input.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.clock.clear();
        self.members.clear();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.closed
            || (self.clock_done && self.clock.is_empty())
            || (self.done.iter().all(|d| *d) && self.members.is_empty())
    }

    pub(crate) fn wants_clock(&self) -> bool {
        !self.is_finished() && !self.clock_done
    }

    pub(crate) fn wants_number(&self, k: usize) -> bool {
        !self.is_finished() && !self.done[k]
    }

    fn drain(&mut self) -> Vec<Pos> {
        let mut out = Vec::new();
        while let Some(&pos) = self.clock.front() {
            if self.members.remove(&pos) {
                out.push(pos);
            } else if !self.all_numbers_passed(pos) {
                break;
            }
            self.clock.pop_front();
            self.decided = Some(pos);
        }
        // Members the clock has moved past were saved after the clock page
        // was read; they are never emitted.
        if let Some(decided) = self.decided {
            let order = self.order;
            self.members.retain(|&m| order.passed(m, decided));
        }
        out
    }

    #[cfg(test)]
    fn member_len(&self) -> usize {
        self.members.len()
    }

    fn all_numbers_passed(&self, pos: Pos) -> bool {
        (0..self.done.len()).all(|k| {
            self.done[k] || self.frontiers[k].map_or(false, |f| self.order.passed(f, pos))
        })
    }
}

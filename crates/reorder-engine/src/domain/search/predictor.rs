//! Best-First Race Search
//!
//! [`RaceSearch`] answers one question: can the candidate accesses `e1` and
//! `e2` be brought to the front of their threads at the same time by some
//! reordering that respects the closure, locks and read values?
//!
//! # Structure
//!
//! ```text
//! ┌─────────────┐ pop lowest ┌─────────────┐ expand ┌─────────────┐
//! │ open set    │ ─────────▶ │ arena[node] │ ─────▶ │ successors  │
//! │ BinaryHeap  │            │ is_witness? │        │ seen-set    │
//! └─────────────┘ ◀───────── └─────────────┘ ◀───── └─────────────┘
//!                  push new                  dedup
//! ```
//!
//! Nodes are owned by the arena for the lifetime of the search; parents are
//! arena indices, so a witness is rebuilt by walking indices back to the root.

use super::include_set::IncludeSet;
use super::trace::{NodeId, Query, Trace};
use crate::domain::context::TraceContext;
use crate::domain::event::{Event, EventId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::trace;

/// Result of one candidate-pair search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// True if a witness reordering exists
    pub race: bool,
    /// Nodes popped from the open set
    pub nodes_explored: u64,
    /// Events of the witness reordering, when requested and found
    pub witness: Option<Vec<Event>>,
}

/// Open-set entry
///
/// # Critical: Reverse Ordering
///
/// Rust's BinaryHeap is a MAX-heap. The search pops the lowest priority, so
/// the comparison is reversed; ties go to the older node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: u32,
    node: NodeId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Search state for one query
pub struct RaceSearch<'q> {
    query: Query<'q>,
    arena: Vec<Trace>,
    open_set: BinaryHeap<QueueEntry>,
    /// Fingerprint → arena nodes with that fingerprint
    seen: HashMap<u64, Vec<NodeId>>,
    nodes_explored: u64,
}

impl<'q> RaceSearch<'q> {
    /// Prepare a search rooted at the initial node of `query`
    pub fn new(query: Query<'q>) -> Self {
        let mut search = Self {
            query,
            arena: Vec::new(),
            open_set: BinaryHeap::new(),
            seen: HashMap::new(),
            nodes_explored: 0,
        };
        let root = Trace::initial(&search.query);
        search.insert(root);
        search
    }

    /// Run until a witness is found or the open set is exhausted
    pub fn run(mut self, want_witness: bool) -> SearchOutcome {
        while let Some(QueueEntry { node, .. }) = self.open_set.pop() {
            self.nodes_explored += 1;

            if self.arena[node].is_witness(&self.query) {
                trace!(
                    e1 = %self.query.e1,
                    e2 = %self.query.e2,
                    nodes = self.nodes_explored,
                    "witness found"
                );
                return SearchOutcome {
                    race: true,
                    nodes_explored: self.nodes_explored,
                    witness: want_witness.then(|| self.witness(node)),
                };
            }

            let successors: Vec<Trace> = self.arena[node]
                .executable_events(&self.query)
                .into_iter()
                .map(|id| self.arena[node].append(&self.query, id, node))
                .collect();
            for successor in successors {
                if !self.is_seen(&successor) {
                    self.insert(successor);
                }
            }
        }

        SearchOutcome {
            race: false,
            nodes_explored: self.nodes_explored,
            witness: None,
        }
    }

    fn insert(&mut self, node: Trace) {
        let id = self.arena.len();
        self.seen.entry(node.fingerprint()).or_default().push(id);
        self.open_set.push(QueueEntry {
            priority: node.priority(),
            node: id,
        });
        self.arena.push(node);
    }

    fn is_seen(&self, node: &Trace) -> bool {
        self.seen
            .get(&node.fingerprint())
            .is_some_and(|ids| ids.iter().any(|&id| self.arena[id] == *node))
    }

    /// Events executed from the root to `node`, in execution order
    fn witness(&self, node: NodeId) -> Vec<Event> {
        let mut path = vec![node];
        while let Some(parent) = path.last().and_then(|&n| self.arena[n].parent()) {
            path.push(parent);
        }
        path.reverse();

        path.windows(2)
            .flat_map(|step| self.arena[step[1]].consumed_since(&self.arena[step[0]], self.query.ctx))
            .collect()
    }
}

/// Search for a reordering witnessing `(e1, e2)` inside a precomputed slice
pub fn verify_sc(
    ctx: &TraceContext,
    iset: &IncludeSet,
    e1: EventId,
    e2: EventId,
    want_witness: bool,
) -> SearchOutcome {
    RaceSearch::new(Query::new(ctx, iset, e1, e2)).run(want_witness)
}

/// Slice the trace for `(e1, e2)` and search for a witness
pub fn is_data_race(ctx: &TraceContext, e1: EventId, e2: EventId, want_witness: bool) -> SearchOutcome {
    let iset = IncludeSet::find(ctx, e1, e2);
    trace!(%e1, %e2, included = iset.len(), "include set computed");
    verify_sc(ctx, &iset, e1, e2, want_witness)
}

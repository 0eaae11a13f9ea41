//! Happens-Before Closure
//!
//! The closure is built once per trace from a set of direct ordering edges
//! (program order, fork→begin, end→join, sole-writer write→read) by replaying
//! the trace in global sequence order and joining each event's clock with the
//! clocks of its direct predecessors.
//!
//! Besides the ordering test, the closure keeps the direct predecessor lists
//! ("transitive reduction"). Slicing and executability checks walk these lists
//! one edge at a time instead of materializing full ancestor sets.

use super::vector_clock::VectorClock;
use crate::domain::event::{Event, EventId, ThreadId};
use std::collections::HashMap;
use tracing::warn;

/// Happens-before relation over the events of one trace
#[derive(Debug, Clone, Default)]
pub struct Closure {
    /// `clocks[t][i]` is the clock of event `(t, i)`
    clocks: Vec<Vec<VectorClock>>,
    /// `reduction[t][i]` lists the direct predecessors of event `(t, i)`
    reduction: Vec<Vec<Vec<EventId>>>,
}

impl Closure {
    /// Start building a closure for a trace with `num_threads` threads
    pub fn builder(num_threads: usize) -> ClosureBuilder {
        ClosureBuilder::new(num_threads)
    }

    /// Returns true if `e1` is ordered at or before `e2`
    ///
    /// This is the reflexive `≤` on clocks: `happens_before(e, e)` holds.
    /// Unknown events are never ordered.
    pub fn happens_before(&self, e1: EventId, e2: EventId) -> bool {
        match (self.clock(e1), self.clock(e2)) {
            (Some(c1), Some(c2)) => c1.precedes(c2),
            _ => false,
        }
    }

    /// Strict ordering: `e1 != e2` and `e1` happens before `e2`
    ///
    /// Every event ticks its own thread's component and predecessors are
    /// always replayed first, so two distinct events never share a clock and
    /// this agrees with `happens_before` on distinct events.
    #[inline]
    pub fn ordered(&self, e1: EventId, e2: EventId) -> bool {
        e1 != e2 && self.happens_before(e1, e2)
    }

    /// Returns true if neither event is ordered before the other
    #[inline]
    pub fn concurrent(&self, e1: EventId, e2: EventId) -> bool {
        !self.happens_before(e1, e2) && !self.happens_before(e2, e1)
    }

    /// Direct predecessors of `e`: the minimal set of events that must
    /// happen before it
    pub fn direct_predecessors(&self, e: EventId) -> &[EventId] {
        self.reduction
            .get(e.thread.as_index())
            .and_then(|thread| thread.get(e.index))
            .map_or(&[], Vec::as_slice)
    }

    /// Clock assigned to `e`
    pub fn clock(&self, e: EventId) -> Option<&VectorClock> {
        self.clocks
            .get(e.thread.as_index())
            .and_then(|thread| thread.get(e.index))
    }

    /// Number of threads covered
    pub fn num_threads(&self) -> usize {
        self.clocks.len()
    }
}

/// Collects direct ordering edges and runs the vector-clock replay
#[derive(Debug)]
pub struct ClosureBuilder {
    num_threads: usize,
    reduction: HashMap<EventId, Vec<EventId>>,
}

impl ClosureBuilder {
    /// Create a builder for a trace with `num_threads` threads
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            reduction: HashMap::new(),
        }
    }

    /// Record that `before` must happen before `event`
    ///
    /// Duplicate edges are ignored.
    pub fn add_relation(&mut self, event: EventId, before: EventId) -> &mut Self {
        let preds = self.reduction.entry(event).or_default();
        if !preds.contains(&before) {
            preds.push(before);
        }
        self
    }

    /// Replay `events` (per-thread sequences) in global sequence order and
    /// compute every event's clock
    pub fn build(self, events: &[Vec<Event>]) -> Closure {
        let num_threads = self.num_threads.max(events.len());
        let mut reduction = self.reduction;

        let mut order: Vec<(u32, EventId)> = events
            .iter()
            .enumerate()
            .flat_map(|(t, thread)| {
                thread.iter().enumerate().map(move |(i, e)| {
                    (e.seq(), EventId::new(ThreadId(t as u32), i))
                })
            })
            .collect();
        order.sort_unstable();

        let mut thread_clocks = vec![VectorClock::new(num_threads); num_threads];
        let mut clocks: Vec<Vec<Option<VectorClock>>> =
            events.iter().map(|thread| vec![None; thread.len()]).collect();
        clocks.resize_with(num_threads, Vec::new);

        for (_, id) in order {
            let t = id.thread.as_index();
            let mut clock = thread_clocks[t].clone();
            clock.tick(id.thread);

            for pred in reduction.get(&id).map_or(&[][..], Vec::as_slice) {
                let known = clocks
                    .get(pred.thread.as_index())
                    .and_then(|thread| thread.get(pred.index))
                    .and_then(Option::as_ref);
                match known {
                    Some(pred_clock) => clock.merge(pred_clock),
                    None => warn!(event = %id, predecessor = %pred, "ordering edge points forward in the trace, ignored"),
                }
            }

            thread_clocks[t] = clock.clone();
            clocks[t][id.index] = Some(clock);
        }

        let clocks = clocks
            .into_iter()
            .map(|thread| {
                thread
                    .into_iter()
                    .map(|c| c.unwrap_or_else(|| VectorClock::new(num_threads)))
                    .collect()
            })
            .collect();

        let mut per_thread: Vec<Vec<Vec<EventId>>> =
            events.iter().map(|thread| vec![Vec::new(); thread.len()]).collect();
        per_thread.resize_with(num_threads, Vec::new);
        for (id, preds) in reduction.drain() {
            if let Some(slot) = per_thread
                .get_mut(id.thread.as_index())
                .and_then(|thread| thread.get_mut(id.index))
            {
                *slot = preds;
            }
        }

        Closure {
            clocks,
            reduction: per_thread,
        }
    }
}

//! Trace Context (Preprocessing Output)
//!
//! [`TraceContext`] is built once per input trace and shared read-only by
//! every candidate-pair search. It holds:
//!
//! - per-thread event sequences in program order
//! - `var → value → writers` and `var → value → readers` indexes
//! - the acquire → matching release pairing
//! - the thread → fork event mapping
//! - the locks held at every read and write
//! - the happens-before [`Closure`]
//!
//! Candidate pairs are conflicting accesses on the same variable from
//! different threads, with no common lock and no closure ordering.

use super::causality::Closure;
use super::event::{event_at, Event, EventId, EventKind, ThreadId, Value, VarId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// `var → value → events` index
pub type ValueIndex = HashMap<VarId, HashMap<Value, Vec<EventId>>>;

/// Two conflicting accesses worth testing, ordered by global sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    /// Access appearing first in the input trace
    pub first: EventId,
    /// Access appearing second in the input trace
    pub second: EventId,
}

impl CandidatePair {
    /// Order `a` and `b` by their position in the input trace
    pub fn ordered(events: &[Vec<Event>], a: EventId, b: EventId) -> Self {
        if event_at(events, a).seq() < event_at(events, b).seq() {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }
}

/// Read-only analysis context shared by all searches over one trace
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    events: Vec<Vec<Event>>,
    writers: ValueIndex,
    readers: ValueIndex,
    acquire_release: HashMap<EventId, EventId>,
    forks: HashMap<ThreadId, EventId>,
    held_locks: HashMap<EventId, Vec<VarId>>,
    closure: Closure,
}

impl TraceContext {
    /// Index `events` (per-thread, program order, dense thread ids) and build
    /// the closure
    pub fn build(events: Vec<Vec<Event>>) -> Self {
        let mut writers = ValueIndex::new();
        let mut readers = ValueIndex::new();
        let mut acquire_release = HashMap::new();
        let mut forks = HashMap::new();
        let mut held_locks: HashMap<EventId, Vec<VarId>> = HashMap::new();
        let mut joins = Vec::new();

        for (t, thread) in events.iter().enumerate() {
            let tid = ThreadId(t as u32);
            let mut acquired: HashMap<VarId, EventId> = HashMap::new();

            for (i, e) in thread.iter().enumerate() {
                let id = EventId::new(tid, i);
                match e.kind() {
                    EventKind::Acquire => {
                        acquired.insert(e.var(), id);
                    }
                    EventKind::Release => {
                        if let Some(acq) = acquired.remove(&e.var()) {
                            acquire_release.insert(acq, id);
                        }
                    }
                    EventKind::Read | EventKind::Write => {
                        let index = if e.kind() == EventKind::Read {
                            &mut readers
                        } else {
                            &mut writers
                        };
                        index
                            .entry(e.var())
                            .or_default()
                            .entry(e.value())
                            .or_default()
                            .push(id);

                        if !acquired.is_empty() {
                            let mut locks: Vec<VarId> = acquired.keys().copied().collect();
                            locks.sort_unstable();
                            held_locks.insert(id, locks);
                        }
                    }
                    EventKind::Fork => {
                        forks.insert(e.target_thread(), id);
                    }
                    EventKind::Join => joins.push(id),
                    EventKind::Begin | EventKind::End => {}
                }
            }
        }

        let mut builder = Closure::builder(events.len());

        // Program order
        for (t, thread) in events.iter().enumerate() {
            let tid = ThreadId(t as u32);
            for i in 1..thread.len() {
                builder.add_relation(EventId::new(tid, i), EventId::new(tid, i - 1));
            }
        }

        // Fork → first event of the forked thread
        for (&child, &fork) in &forks {
            if events.get(child.as_index()).is_some_and(|t| !t.is_empty()) {
                builder.add_relation(EventId::new(child, 0), fork);
            }
        }

        // Last event of the joined thread → join
        for &join in &joins {
            let target = event_at(&events, join).target_thread();
            if let Some(len) = events.get(target.as_index()).map(Vec::len).filter(|&l| l > 0) {
                builder.add_relation(join, EventId::new(target, len - 1));
            }
        }

        // Sole writer → every read of the value it wrote
        for (var, by_value) in &writers {
            for (value, ws) in by_value {
                let [w] = ws.as_slice() else { continue };
                let w_seq = event_at(&events, *w).seq();
                let reads = readers.get(var).and_then(|m| m.get(value));
                for &r in reads.into_iter().flatten() {
                    if w_seq < event_at(&events, r).seq() {
                        builder.add_relation(r, *w);
                    }
                }
            }
        }

        let closure = builder.build(&events);
        debug!(
            threads = events.len(),
            events = events.iter().map(Vec::len).sum::<usize>(),
            "trace context built"
        );

        Self {
            events,
            writers,
            readers,
            acquire_release,
            forks,
            held_locks,
            closure,
        }
    }

    /// Per-thread event sequences
    #[inline]
    pub fn events(&self) -> &[Vec<Event>] {
        &self.events
    }

    /// Events of one thread
    #[inline]
    pub fn thread_events(&self, thread: ThreadId) -> &[Event] {
        self.events.get(thread.as_index()).map_or(&[], Vec::as_slice)
    }

    /// Event named by `id`
    #[inline]
    pub fn event(&self, id: EventId) -> &Event {
        event_at(&self.events, id)
    }

    /// Number of threads
    #[inline]
    pub fn num_threads(&self) -> usize {
        self.events.len()
    }

    /// Last event of a thread, if it has any
    pub fn last_event(&self, thread: ThreadId) -> Option<EventId> {
        self.thread_events(thread)
            .len()
            .checked_sub(1)
            .map(|i| EventId::new(thread, i))
    }

    /// Writes of `value` to `var` ("good writes" for a read of that value)
    pub fn writers_of(&self, var: VarId, value: Value) -> &[EventId] {
        lookup(&self.writers, var, value)
    }

    /// Reads that observed `value` in `var`
    pub fn readers_of(&self, var: VarId, value: Value) -> &[EventId] {
        lookup(&self.readers, var, value)
    }

    /// Release matching an acquire
    pub fn release_of(&self, acquire: EventId) -> Option<EventId> {
        self.acquire_release.get(&acquire).copied()
    }

    /// Fork event that creates `thread`
    pub fn fork_of(&self, thread: ThreadId) -> Option<EventId> {
        self.forks.get(&thread).copied()
    }

    /// Locks held while executing an access
    pub fn held_locks(&self, id: EventId) -> &[VarId] {
        self.held_locks.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Happens-before closure
    #[inline]
    pub fn closure(&self) -> &Closure {
        &self.closure
    }

    /// Returns true if `a` and `b` may race: different threads, same
    /// variable, at least one write, no common lock, unordered by the closure
    pub fn is_candidate(&self, a: EventId, b: EventId) -> bool {
        let (ea, eb) = (self.event(a), self.event(b));
        a.thread != b.thread
            && ea.kind().is_access()
            && eb.kind().is_access()
            && (ea.kind() == EventKind::Write || eb.kind() == EventKind::Write)
            && ea.var() == eb.var()
            && !self.has_common_lock(a, b)
            && self.closure.concurrent(a, b)
    }

    fn has_common_lock(&self, a: EventId, b: EventId) -> bool {
        let lb = self.held_locks(b);
        self.held_locks(a).iter().any(|l| lb.contains(l))
    }

    /// Candidate race pairs, sorted by the sequence numbers of their events
    pub fn candidate_pairs(&self) -> Vec<CandidatePair> {
        let mut writes_by_var: HashMap<VarId, Vec<EventId>> = HashMap::new();
        for (&var, by_value) in &self.writers {
            writes_by_var.insert(var, by_value.values().flatten().copied().collect());
        }

        let mut pairs = HashSet::new();
        for (var, writes) in &writes_by_var {
            for (i, &w) in writes.iter().enumerate() {
                for &w2 in &writes[i + 1..] {
                    if self.is_candidate(w, w2) {
                        pairs.insert(CandidatePair::ordered(&self.events, w, w2));
                    }
                }

                let reads = self.readers.get(var).into_iter().flat_map(|m| m.values().flatten());
                for &r in reads {
                    if self.is_candidate(w, r) {
                        pairs.insert(CandidatePair::ordered(&self.events, w, r));
                    }
                }
            }
        }

        let mut pairs: Vec<CandidatePair> = pairs.into_iter().collect();
        pairs.sort_by_key(|p| (self.event(p.first).seq(), self.event(p.second).seq()));
        pairs
    }
}

fn lookup(index: &ValueIndex, var: VarId, value: Value) -> &[EventId] {
    index
        .get(&var)
        .and_then(|m| m.get(&value))
        .map_or(&[], Vec::as_slice)
}

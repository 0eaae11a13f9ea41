//! Search Node
//!
//! A [`Trace`] is one node of the race search: a partial reordering of the
//! sliced trace, described by where every thread's cursor stands and what
//! shared memory looks like after the events consumed so far.
//!
//! # Node Identity
//!
//! Two nodes are the same state iff their cursor vectors and memory maps are
//! equal. Lock ownership is a function of the consumed prefixes and is left
//! out, as are the parent link and the cached priority.
//!
//! # Sharing
//!
//! Nodes live in the search arena and refer to their parent by [`NodeId`].
//! Memory and lock maps are behind `Arc` and copied on write, so a successor
//! that only moves a cursor shares both maps with its parent.

use super::include_set::IncludeSet;
use crate::domain::context::TraceContext;
use crate::domain::event::{Event, EventId, EventKind, ThreadId, Value, VarId};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a node in the search arena
pub type NodeId = usize;

/// Canonical shared memory: variables absent from the map hold 0
pub type Memory = BTreeMap<VarId, Value>;

/// Weight of each event e1/e2 still has to wait for
pub const DISTANCE_WEIGHT: u32 = 100;
/// Weight of each unexecuted predecessor of a blocked event
pub const PREDECESSOR_WEIGHT: u32 = 20;
/// Weight of the distance to a releasing, forking or ending event
pub const SYNC_WEIGHT: u32 = 2;
/// Weight of the average distance to a good write
pub const READ_WEIGHT: u32 = 1;
/// Ceiling of one unblock cost term
pub const UNBLOCK_THRESHOLD: u32 = 80;

/// Position of one thread inside a search node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Thread has no event in the include set
    Unused,
    /// Thread exists only once its Fork runs
    ToBeForked,
    /// Next event to execute is at this index (== length when exhausted)
    At(usize),
    /// Thread executed its End event
    Completed,
}

impl Cursor {
    /// Number of the thread's events consumed so far
    #[inline]
    pub fn consumed(self, thread_len: usize) -> usize {
        match self {
            Cursor::Unused | Cursor::ToBeForked => 0,
            Cursor::At(c) => c,
            Cursor::Completed => thread_len,
        }
    }
}

/// One race question: the shared context, the slice and the candidate pair
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// Shared trace context
    pub ctx: &'a TraceContext,
    /// Slice for this pair
    pub iset: &'a IncludeSet,
    /// First candidate access
    pub e1: EventId,
    /// Second candidate access
    pub e2: EventId,
}

impl<'a> Query<'a> {
    /// Bundle a race question
    pub fn new(ctx: &'a TraceContext, iset: &'a IncludeSet, e1: EventId, e2: EventId) -> Self {
        Self { ctx, iset, e1, e2 }
    }

    #[inline]
    fn is_target(&self, id: EventId) -> bool {
        id == self.e1 || id == self.e2
    }

    /// Returns true if `id` comes before e1 or e2 on the same thread
    #[inline]
    fn precedes_target(&self, id: EventId) -> bool {
        [self.e1, self.e2]
            .iter()
            .any(|t| t.thread == id.thread && id.index < t.index)
    }
}

/// Search node
#[derive(Debug, Clone)]
pub struct Trace {
    cursors: Vec<Cursor>,
    memory: Arc<Memory>,
    /// Lock → acquire event currently holding it
    locks: Arc<HashMap<VarId, EventId>>,
    parent: Option<NodeId>,
    /// Event appended to the parent to produce this node
    last: Option<EventId>,
    priority: u32,
}

impl Trace {
    /// Root node of the search for `query`
    ///
    /// Threads outside the slice are [`Cursor::Unused`], threads created by a
    /// Fork start as [`Cursor::ToBeForked`], every other thread starts at its
    /// first event.
    pub fn initial(query: &Query<'_>) -> Self {
        let cursors = (0..query.ctx.num_threads())
            .map(|t| {
                let thread = ThreadId(t as u32);
                if !query.iset.is_used(thread) {
                    Cursor::Unused
                } else if query.ctx.fork_of(thread).is_some() {
                    Cursor::ToBeForked
                } else {
                    Cursor::At(0)
                }
            })
            .collect();

        let mut root = Self {
            cursors,
            memory: Arc::default(),
            locks: Arc::default(),
            parent: None,
            last: None,
            priority: 0,
        };
        root.priority = root.compute_priority(query);
        root
    }

    /// Cursor of `thread`
    #[inline]
    pub fn cursor(&self, thread: ThreadId) -> Cursor {
        self.cursors
            .get(thread.as_index())
            .copied()
            .unwrap_or(Cursor::Unused)
    }

    /// All cursors, indexed by thread
    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }

    /// Current memory
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Current value of `var`
    #[inline]
    pub fn value_of(&self, var: VarId) -> Value {
        self.memory.get(&var).copied().unwrap_or(0)
    }

    /// Acquire event holding `lock`, if held
    pub fn lock_holder(&self, lock: VarId) -> Option<EventId> {
        self.locks.get(&lock).copied()
    }

    /// Search priority (lower is explored first)
    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Parent node in the arena
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Event appended to reach this node
    #[inline]
    pub fn last(&self) -> Option<EventId> {
        self.last
    }

    /// Returns true if `id` was consumed in this node
    #[inline]
    pub fn is_executed(&self, id: EventId) -> bool {
        match self.cursor(id.thread) {
            Cursor::Completed => true,
            Cursor::At(c) => c > id.index,
            Cursor::Unused | Cursor::ToBeForked => false,
        }
    }

    /// Returns true if `id` is its thread's next event and may run now
    pub fn is_executable(&self, query: &Query<'_>, id: EventId) -> bool {
        if self.cursor(id.thread) != Cursor::At(id.index) || !query.iset.contains(id) {
            return false;
        }
        if !self.predecessors_executed(query.ctx, id) {
            return false;
        }

        let event = query.ctx.event(id);
        match event.kind() {
            EventKind::Acquire => !self.locks.contains_key(&event.var()),
            EventKind::Release => self
                .locks
                .get(&event.var())
                .is_some_and(|holder| holder.thread == id.thread),
            EventKind::Write => !self.is_held_var(query, id),
            EventKind::Read => self.value_of(event.var()) == event.value(),
            EventKind::Join => query
                .ctx
                .last_event(event.target_thread())
                .map_or(true, |end| self.is_executed(end)),
            EventKind::Fork | EventKind::Begin | EventKind::End => true,
        }
    }

    /// Events that can be appended, never stepping onto e1 or e2
    pub fn executable_events(&self, query: &Query<'_>) -> Vec<EventId> {
        self.cursors
            .iter()
            .enumerate()
            .filter_map(|(t, cursor)| match *cursor {
                Cursor::At(c) => Some(EventId::new(ThreadId(t as u32), c)),
                _ => None,
            })
            .filter(|&id| !query.is_target(id) && self.is_executable(query, id))
            .collect()
    }

    /// Successor node produced by executing `id`
    ///
    /// Consecutive reads that already see their value are consumed right
    /// away without branching, and the priority is computed on the result.
    pub fn append(&self, query: &Query<'_>, id: EventId, parent: NodeId) -> Self {
        let mut next = self.clone();
        next.parent = Some(parent);
        next.last = Some(id);
        next.cursors[id.thread.as_index()] = Cursor::At(id.index + 1);

        let event = *query.ctx.event(id);
        match event.kind() {
            EventKind::Acquire => {
                Arc::make_mut(&mut next.locks).insert(event.var(), id);
            }
            EventKind::Release => {
                Arc::make_mut(&mut next.locks).remove(&event.var());
            }
            EventKind::Write => next.store(event.var(), event.value()),
            EventKind::Fork => {
                let target = event.target_thread();
                if next.cursor(target) == Cursor::ToBeForked && query.iset.is_used(target) {
                    next.cursors[target.as_index()] = Cursor::At(0);
                }
            }
            EventKind::End => next.cursors[id.thread.as_index()] = Cursor::Completed,
            EventKind::Read | EventKind::Begin | EventKind::Join => {}
        }

        next.advance_reads(query);
        next.priority = next.compute_priority(query);
        next
    }

    /// Returns true if e1 and e2 are both the next events of their threads
    /// with every direct predecessor executed
    pub fn is_witness(&self, query: &Query<'_>) -> bool {
        [query.e1, query.e2].into_iter().all(|e| {
            self.cursor(e.thread) == Cursor::At(e.index)
                && self.predecessors_executed(query.ctx, e)
        })
    }

    /// Events consumed going from `parent` to this node, in execution order
    ///
    /// The appended event comes first, followed by the reads consumed by
    /// fast-forwarding.
    pub fn consumed_since(&self, parent: &Trace, ctx: &TraceContext) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(last) = self.last {
            events.push(*ctx.event(last));
        }

        for (t, (before, after)) in parent.cursors.iter().zip(&self.cursors).enumerate() {
            let thread = ThreadId(t as u32);
            let len = ctx.thread_events(thread).len();
            for index in before.consumed(len)..after.consumed(len) {
                let id = EventId::new(thread, index);
                if Some(id) != self.last {
                    events.push(*ctx.event(id));
                }
            }
        }
        events
    }

    /// Hash of the node identity (cursors and memory)
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn predecessors_executed(&self, ctx: &TraceContext, id: EventId) -> bool {
        ctx.closure()
            .direct_predecessors(id)
            .iter()
            .all(|&p| self.is_executed(p))
    }

    fn store(&mut self, var: VarId, value: Value) {
        if self.value_of(var) == value {
            return;
        }
        let memory = Arc::make_mut(&mut self.memory);
        if value == 0 {
            memory.remove(&var);
        } else {
            memory.insert(var, value);
        }
    }

    /// A write is held back while it would destroy a value that a pending
    /// read ahead of e1 or e2 on their threads still needs and no other
    /// write can restore
    ///
    /// Reads past a target are in the slice only to close a critical
    /// section; the search never runs them, so they hold nothing.
    fn is_held_var(&self, query: &Query<'_>, write: EventId) -> bool {
        let ctx = query.ctx;
        let event = ctx.event(write);
        let var = event.var();
        let current = self.value_of(var);

        if event.value() == current {
            return false;
        }

        let pending = |id: &&EventId| query.iset.contains(**id) && !self.is_executed(**id);
        if ctx.writers_of(var, current).iter().any(|w| pending(&w)) {
            return false;
        }

        ctx.readers_of(var, current)
            .iter()
            .filter(pending)
            .any(|r| query.precedes_target(*r))
    }

    fn advance_reads(&mut self, query: &Query<'_>) {
        for t in 0..self.cursors.len() {
            while let Cursor::At(c) = self.cursors[t] {
                let id = EventId::new(ThreadId(t as u32), c);
                if !query.iset.contains(id)
                    || query.is_target(id)
                    || !self.predecessors_executed(query.ctx, id)
                {
                    break;
                }

                let event = query.ctx.event(id);
                if event.kind() != EventKind::Read || self.value_of(event.var()) != event.value() {
                    break;
                }
                self.cursors[t] = Cursor::At(c + 1);
            }
        }
    }

    // ========================================================================
    // Priority
    // ========================================================================

    /// `(dist(e1) + dist(e2)) * 100` plus the cost to unblock the next event
    /// of e1's and e2's threads
    fn compute_priority(&self, query: &Query<'_>) -> u32 {
        let distance = self
            .distance(query.e1)
            .saturating_add(self.distance(query.e2))
            .saturating_mul(DISTANCE_WEIGHT);

        [query.e1, query.e2]
            .into_iter()
            .map(|target| self.blocked_cost(query, target))
            .fold(distance, u32::saturating_add)
    }

    /// Events `thread(e)` still has to run before reaching `e`
    fn distance(&self, e: EventId) -> u32 {
        let remaining = match self.cursor(e.thread) {
            Cursor::Unused | Cursor::ToBeForked => e.index,
            Cursor::Completed => 0,
            Cursor::At(c) => e.index.saturating_sub(c),
        };
        u32::try_from(remaining).unwrap_or(u32::MAX)
    }

    fn blocked_cost(&self, query: &Query<'_>, target: EventId) -> u32 {
        match self.cursor(target.thread) {
            Cursor::At(c) => {
                let next = EventId::new(target.thread, c);
                if next == target || !query.iset.contains(next) || self.is_executable(query, next) {
                    0
                } else {
                    self.unblock_cost(query, next)
                }
            }
            Cursor::ToBeForked => query
                .ctx
                .fork_of(target.thread)
                .map_or(0, |fork| {
                    self.distance(fork)
                        .saturating_mul(SYNC_WEIGHT)
                        .min(UNBLOCK_THRESHOLD)
                }),
            Cursor::Unused | Cursor::Completed => 0,
        }
    }

    fn unblock_cost(&self, query: &Query<'_>, blocked: EventId) -> u32 {
        let ctx = query.ctx;
        let pending = ctx
            .closure()
            .direct_predecessors(blocked)
            .iter()
            .filter(|&&p| !self.is_executed(p))
            .count();
        let mut cost = u32::try_from(pending)
            .unwrap_or(u32::MAX)
            .saturating_mul(PREDECESSOR_WEIGHT);

        let event = ctx.event(blocked);
        let extra = match event.kind() {
            EventKind::Acquire => self
                .lock_holder(event.var())
                .and_then(|acquire| ctx.release_of(acquire))
                .map_or(0, |release| self.distance(release).saturating_mul(SYNC_WEIGHT)),
            EventKind::Read => {
                let distances: Vec<u32> = ctx
                    .writers_of(event.var(), event.value())
                    .iter()
                    .filter(|w| {
                        w.thread != blocked.thread
                            && query.iset.contains(**w)
                            && !self.is_executed(**w)
                    })
                    .map(|&w| self.distance(w))
                    .collect();
                match distances.len() {
                    0 => UNBLOCK_THRESHOLD,
                    n => {
                        let total = distances.iter().fold(0u32, |acc, d| acc.saturating_add(*d));
                        (total / n as u32).saturating_mul(READ_WEIGHT)
                    }
                }
            }
            EventKind::Join => ctx
                .last_event(event.target_thread())
                .map_or(0, |end| self.distance(end).saturating_mul(SYNC_WEIGHT)),
            EventKind::Begin => ctx
                .fork_of(blocked.thread)
                .map_or(0, |fork| self.distance(fork).saturating_mul(SYNC_WEIGHT)),
            // A blocked write waits on a read ahead of e1 or e2
            EventKind::Write | EventKind::Release | EventKind::Fork | EventKind::End => 0,
        };

        cost = cost.saturating_add(extra);
        cost.min(UNBLOCK_THRESHOLD)
    }
}

impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.cursors == other.cursors && self.memory == other.memory
    }
}

impl Eq for Trace {}

impl Hash for Trace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cursors.hash(state);
        self.memory.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, t: u32, var: VarId, value: Value, seq: u32) -> Event {
        Event::new(kind, ThreadId(t), var, value, seq)
    }

    fn id(t: u32, i: usize) -> EventId {
        EventId::new(ThreadId(t), i)
    }

    /// T0: w(x)=1 w(x)=2       T1: r(x)=1
    fn two_writes_one_read() -> TraceContext {
        TraceContext::build(vec![
            vec![ev(EventKind::Write, 0, 0, 1, 0), ev(EventKind::Write, 0, 0, 2, 1)],
            vec![ev(EventKind::Read, 1, 0, 1, 2)],
        ])
    }

    #[test]
    fn test_initial_cursors() {
        let ctx = TraceContext::build(vec![
            vec![ev(EventKind::Fork, 0, 1, 0, 0), ev(EventKind::Write, 0, 0, 1, 3)],
            vec![ev(EventKind::Begin, 1, 0, 0, 1), ev(EventKind::Write, 1, 0, 2, 2)],
            vec![ev(EventKind::Write, 2, 4, 1, 4)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 1));
        let root = Trace::initial(&query);

        assert_eq!(
            root.cursors(),
            &[Cursor::At(0), Cursor::ToBeForked, Cursor::Unused]
        );
        assert!(root.memory().is_empty());
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_fork_starts_thread() {
        let ctx = TraceContext::build(vec![
            vec![ev(EventKind::Fork, 0, 1, 0, 0), ev(EventKind::Write, 0, 0, 1, 3)],
            vec![ev(EventKind::Begin, 1, 0, 0, 1), ev(EventKind::Write, 1, 0, 2, 2)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 1));
        let root = Trace::initial(&query);

        assert_eq!(root.executable_events(&query), vec![id(0, 0)]);
        let forked = root.append(&query, id(0, 0), 0);
        assert_eq!(forked.cursor(ThreadId(1)), Cursor::At(0));
        assert_eq!(forked.executable_events(&query), vec![id(1, 0)]);

        let begun = forked.append(&query, id(1, 0), 1);
        assert!(begun.is_witness(&query));
        assert!(begun.executable_events(&query).is_empty());
    }

    #[test]
    fn test_read_needs_matching_value() {
        let ctx = two_writes_one_read();
        let iset = IncludeSet::find(&ctx, id(0, 1), id(0, 1));
        let query = Query::new(&ctx, &iset, id(0, 0), id(0, 0));
        let root = Trace::initial(&query);

        // r(x)=1 sits outside this slice
        assert!(!root.is_executable(&query, id(1, 0)));

        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 0));
        let query = Query::new(&ctx, &iset, id(0, 1), id(0, 1));
        let root = Trace::initial(&query);
        assert!(!root.is_executable(&query, id(1, 0)));
        let after = root.append(&query, id(0, 0), 0);
        assert_eq!(after.value_of(0), 1);
        // Fast-forwarded through the read that now sees 1
        assert_eq!(after.cursor(ThreadId(1)), Cursor::At(1));
    }

    #[test]
    fn test_locks() {
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Acquire, 0, 9, 0, 0),
                ev(EventKind::Release, 0, 9, 0, 1),
                ev(EventKind::Write, 0, 0, 1, 4),
            ],
            vec![
                ev(EventKind::Acquire, 1, 9, 0, 2),
                ev(EventKind::Release, 1, 9, 0, 3),
                ev(EventKind::Write, 1, 0, 2, 5),
            ],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 2), id(1, 2));
        let query = Query::new(&ctx, &iset, id(0, 2), id(1, 2));
        let root = Trace::initial(&query);
        assert_eq!(root.executable_events(&query), vec![id(0, 0), id(1, 0)]);

        let held = root.append(&query, id(0, 0), 0);
        assert_eq!(held.lock_holder(9), Some(id(0, 0)));
        assert!(!held.is_executable(&query, id(1, 0)));
        assert!(held.is_executable(&query, id(0, 1)));

        let released = held.append(&query, id(0, 1), 1);
        assert_eq!(released.lock_holder(9), None);
        assert!(released.is_executable(&query, id(1, 0)));
    }

    #[test]
    fn test_join_waits_for_end() {
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Fork, 0, 1, 0, 0),
                ev(EventKind::Join, 0, 1, 0, 3),
                ev(EventKind::Write, 0, 0, 1, 4),
            ],
            vec![ev(EventKind::Begin, 1, 0, 0, 1), ev(EventKind::End, 1, 0, 0, 2)],
            vec![ev(EventKind::Write, 2, 0, 2, 5)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 2), id(2, 0));
        let query = Query::new(&ctx, &iset, id(0, 2), id(2, 0));

        let mut node = Trace::initial(&query);
        let forked = node.append(&query, id(0, 0), 0);
        assert!(!forked.is_executable(&query, id(0, 1)));
        node = forked.append(&query, id(1, 0), 1).append(&query, id(1, 1), 2);
        assert_eq!(node.cursor(ThreadId(1)), Cursor::Completed);
        assert!(node.is_executable(&query, id(0, 1)));
    }

    #[test]
    fn test_identity_ignores_parent_and_locks() {
        let ctx = two_writes_one_read();
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 0));
        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 0));
        let root = Trace::initial(&query);

        let a = root.append(&query, id(0, 0), 0);
        let mut b = root.append(&query, id(0, 0), 7);
        Arc::make_mut(&mut b.locks).insert(3, id(1, 0));

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, root);
    }

    #[test]
    fn test_writing_zero_keeps_memory_canonical() {
        let ctx = TraceContext::build(vec![
            vec![ev(EventKind::Write, 0, 0, 1, 0), ev(EventKind::Write, 0, 0, 0, 1)],
            vec![ev(EventKind::Write, 1, 5, 5, 2)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 0));
        let query = Query::new(&ctx, &iset, id(1, 0), id(1, 0));
        let root = Trace::initial(&query);
        let one = root.append(&query, id(0, 0), 0);
        let zero = one.append(&query, id(0, 1), 1);

        assert!(zero.memory().is_empty());
        assert_eq!(zero.memory(), root.memory());
    }

    #[test]
    fn test_priority_prefers_progress() {
        let ctx = two_writes_one_read();
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 0));
        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 0));
        let root = Trace::initial(&query);
        let next = root.append(&query, id(0, 0), 0);

        assert_eq!(root.priority(), DISTANCE_WEIGHT);
        assert_eq!(next.priority(), 0);
        assert!(next.is_witness(&query));
        assert_eq!(next.consumed_since(&root, &ctx), vec![*ctx.event(id(0, 0))]);
    }

    #[test]
    fn test_write_held_until_needed_read_runs() {
        // T0 must still read y=0 before e1, so T1 may not overwrite it yet
        let ctx = TraceContext::build(vec![
            vec![ev(EventKind::Read, 0, 1, 0, 0), ev(EventKind::Write, 0, 0, 1, 1)],
            vec![ev(EventKind::Write, 1, 1, 5, 2), ev(EventKind::Write, 1, 0, 2, 3)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 1));
        let root = Trace::initial(&query);

        assert!(!root.is_executable(&query, id(1, 0)));
        let read = root.append(&query, id(0, 0), 0);
        assert!(read.is_executable(&query, id(1, 0)));
    }

    #[test]
    fn test_reads_past_target_do_not_hold_writes() {
        // T0: acq L, w(x)=1 (e1), r(z)=0, rel L    T1: w(z)=5, w(x)=2 (e2)
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Acquire, 0, 9, 0, 0),
                ev(EventKind::Write, 0, 0, 1, 1),
                ev(EventKind::Read, 0, 2, 0, 2),
                ev(EventKind::Release, 0, 9, 0, 3),
            ],
            vec![ev(EventKind::Write, 1, 2, 5, 4), ev(EventKind::Write, 1, 0, 2, 5)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 1), id(1, 1));
        assert_eq!(iset.cutoffs(), &[Some(3), Some(1)]);

        let query = Query::new(&ctx, &iset, id(0, 1), id(1, 1));
        let root = Trace::initial(&query);
        assert!(root.is_executable(&query, id(1, 0)));

        let acquired = root.append(&query, id(0, 0), 0);
        assert_eq!(acquired.executable_events(&query), vec![id(1, 0)]);
        assert!(acquired.append(&query, id(1, 0), 1).is_witness(&query));
    }

    #[test]
    fn test_priority_charges_lock_release_distance() {
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Acquire, 0, 9, 0, 0),
                ev(EventKind::Write, 0, 1, 1, 1),
                ev(EventKind::Release, 0, 9, 0, 2),
                ev(EventKind::Write, 0, 0, 1, 5),
            ],
            vec![
                ev(EventKind::Acquire, 1, 9, 0, 3),
                ev(EventKind::Release, 1, 9, 0, 4),
                ev(EventKind::Write, 1, 0, 2, 6),
            ],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 3), id(1, 2));
        let query = Query::new(&ctx, &iset, id(0, 3), id(1, 2));
        let root = Trace::initial(&query);
        assert_eq!(root.priority(), 5 * DISTANCE_WEIGHT);

        // T1's acquire now waits on T0's release, one event away
        let held = root.append(&query, id(0, 0), 0);
        assert_eq!(held.priority(), 4 * DISTANCE_WEIGHT + SYNC_WEIGHT);
    }

    #[test]
    fn test_priority_averages_good_write_distance() {
        // T1's r(y)=1 precedes the only write of 1 in the input, so no edge
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Write, 0, 3, 7, 1),
                ev(EventKind::Write, 0, 1, 1, 2),
                ev(EventKind::Write, 0, 0, 1, 4),
            ],
            vec![ev(EventKind::Read, 1, 1, 1, 0), ev(EventKind::Write, 1, 0, 2, 3)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 2), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 2), id(1, 1));
        let root = Trace::initial(&query);
        assert_eq!(root.priority(), 3 * DISTANCE_WEIGHT + READ_WEIGHT);

        let next = root.append(&query, id(0, 0), 0);
        assert_eq!(next.priority(), 2 * DISTANCE_WEIGHT);
    }

    #[test]
    fn test_priority_read_without_good_write_hits_threshold() {
        let ctx = TraceContext::build(vec![
            vec![ev(EventKind::Write, 0, 0, 1, 1)],
            vec![ev(EventKind::Read, 1, 1, 3, 0), ev(EventKind::Write, 1, 0, 2, 2)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 0), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 0), id(1, 1));

        let root = Trace::initial(&query);
        assert_eq!(root.priority(), DISTANCE_WEIGHT + UNBLOCK_THRESHOLD);
    }

    #[test]
    fn test_priority_counts_pending_predecessors() {
        // w(y)=1 is the sole writer read by T1, so it orders T1's read
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Write, 0, 3, 1, 0),
                ev(EventKind::Write, 0, 1, 1, 1),
                ev(EventKind::Write, 0, 0, 1, 3),
            ],
            vec![ev(EventKind::Read, 1, 1, 1, 2), ev(EventKind::Write, 1, 0, 2, 4)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 2), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 2), id(1, 1));

        let root = Trace::initial(&query);
        assert_eq!(
            root.priority(),
            3 * DISTANCE_WEIGHT + PREDECESSOR_WEIGHT + READ_WEIGHT
        );
    }

    #[test]
    fn test_priority_charges_join_distance() {
        let ctx = TraceContext::build(vec![
            vec![
                ev(EventKind::Fork, 0, 1, 0, 0),
                ev(EventKind::Join, 0, 1, 0, 4),
                ev(EventKind::Write, 0, 0, 1, 5),
            ],
            vec![
                ev(EventKind::Begin, 1, 0, 0, 1),
                ev(EventKind::Write, 1, 4, 1, 2),
                ev(EventKind::End, 1, 0, 0, 3),
            ],
            vec![ev(EventKind::Write, 2, 0, 2, 6)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 2), id(2, 0));
        let query = Query::new(&ctx, &iset, id(0, 2), id(2, 0));
        let forked = Trace::initial(&query).append(&query, id(0, 0), 0);

        // The join waits on T1's End, two events away
        assert_eq!(
            forked.priority(),
            DISTANCE_WEIGHT + PREDECESSOR_WEIGHT + 2 * SYNC_WEIGHT
        );
    }

    #[test]
    fn test_priority_caps_fork_distance() {
        let mut parent: Vec<Event> = (0..45)
            .map(|i| ev(EventKind::Write, 0, 3, i + 1, i))
            .collect();
        parent.push(ev(EventKind::Fork, 0, 1, 0, 45));
        parent.push(ev(EventKind::Write, 0, 0, 1, 48));
        let ctx = TraceContext::build(vec![
            parent,
            vec![ev(EventKind::Begin, 1, 0, 0, 46), ev(EventKind::Write, 1, 0, 2, 47)],
        ]);
        let iset = IncludeSet::find(&ctx, id(0, 46), id(1, 1));
        let query = Query::new(&ctx, &iset, id(0, 46), id(1, 1));

        let root = Trace::initial(&query);
        assert_eq!(root.cursor(ThreadId(1)), Cursor::ToBeForked);
        assert_eq!(root.priority(), 47 * DISTANCE_WEIGHT + UNBLOCK_THRESHOLD);
    }
}

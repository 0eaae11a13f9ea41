//! Include Set (Backward Dependency Slice)
//!
//! For a candidate pair `(e1, e2)` the include set bounds, per thread, the
//! prefix of events that can influence whether the two accesses can be
//! driven next to each other. The search never looks past these cutoffs.
//!
//! # Algorithm
//!
//! A stack of inclusive ranges is walked backward. Every event pulled in adds:
//!
//! 1. its direct happens-before predecessors
//! 2. for a read, every write that could have produced the observed value
//! 3. for lock events, enough of the thread to close the critical section
//!
//! ```text
//! T0: [0 ........ c0]  c0 = cutoff(T0)
//! T1: [0 ... c1]       c1 = cutoff(T1)
//! T2: (unused)
//! ```
//!
//! Cutoffs only grow. A range already covered by its thread's cutoff is never
//! pushed again, which bounds the walk on mutually dependent read/write chains.

use crate::domain::context::TraceContext;
use crate::domain::event::{EventId, EventKind, ThreadId, VarId};
use std::collections::HashSet;

/// Per-thread inclusive cutoffs; `None` means the thread is not involved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeSet {
    cutoffs: Vec<Option<usize>>,
}

impl IncludeSet {
    /// Compute the slice for `(e1, e2)`
    ///
    /// A self-pair (`e1 == e2`) yields exactly that one index with no
    /// backward expansion.
    pub fn find(ctx: &TraceContext, e1: EventId, e2: EventId) -> Self {
        let mut cutoffs = vec![None; ctx.num_threads()];

        if e1 == e2 {
            if let Some(slot) = cutoffs.get_mut(e1.thread.as_index()) {
                *slot = Some(e1.index);
            }
            return Self { cutoffs };
        }

        let mut slicer = Slicer {
            ctx,
            stack: Vec::new(),
            acquires: vec![HashSet::new(); ctx.num_threads()],
            releases: vec![HashSet::new(); ctx.num_threads()],
            cutoffs,
        };
        slicer.add_range(e1);
        slicer.add_range(e2);
        slicer.run();

        Self {
            cutoffs: slicer.cutoffs,
        }
    }

    /// Inclusive cutoff of `thread`
    #[inline]
    pub fn cutoff(&self, thread: ThreadId) -> Option<usize> {
        self.cutoffs.get(thread.as_index()).copied().flatten()
    }

    /// Returns true if `id` lies inside its thread's cutoff
    #[inline]
    pub fn contains(&self, id: EventId) -> bool {
        self.cutoff(id.thread).is_some_and(|c| id.index <= c)
    }

    /// Returns true if any event of `thread` is included
    #[inline]
    pub fn is_used(&self, thread: ThreadId) -> bool {
        self.cutoff(thread).is_some()
    }

    /// All cutoffs, indexed by thread
    pub fn cutoffs(&self) -> &[Option<usize>] {
        &self.cutoffs
    }

    /// Number of included events
    pub fn len(&self) -> usize {
        self.cutoffs.iter().flatten().map(|c| c + 1).sum()
    }

    /// Returns true if no event is included
    pub fn is_empty(&self) -> bool {
        self.cutoffs.iter().all(Option::is_none)
    }
}

/// Inclusive range of one thread's events, processed from `end` down to `start`
#[derive(Debug, Clone, Copy)]
struct Range {
    thread: ThreadId,
    start: usize,
    end: usize,
}

/// Worklist state for one `find` call
struct Slicer<'a> {
    ctx: &'a TraceContext,
    cutoffs: Vec<Option<usize>>,
    stack: Vec<Range>,
    /// Acquires seen without their release, per thread
    acquires: Vec<HashSet<VarId>>,
    /// Releases seen without their acquire, per thread
    releases: Vec<HashSet<VarId>>,
}

impl Slicer<'_> {
    fn run(&mut self) {
        while let Some(range) = self.stack.pop() {
            for index in (range.start..=range.end).rev() {
                self.include_event(EventId::new(range.thread, index));
            }
        }
    }

    /// Extend `e`'s thread cutoff to cover `e`, pushing the newly covered part
    fn add_range(&mut self, e: EventId) {
        let Some(slot) = self.cutoffs.get_mut(e.thread.as_index()) else {
            return;
        };
        let start = match *slot {
            Some(c) if c >= e.index => return,
            Some(c) => c + 1,
            None => 0,
        };

        *slot = Some(e.index);
        self.stack.push(Range {
            thread: e.thread,
            start,
            end: e.index,
        });
    }

    fn include_event(&mut self, e: EventId) {
        let ctx = self.ctx;
        for &pred in ctx.closure().direct_predecessors(e) {
            self.add_range(pred);
        }

        let event = *ctx.event(e);
        let t = e.thread.as_index();
        match event.kind() {
            EventKind::Read => {
                for &w in ctx.writers_of(event.var(), event.value()) {
                    // Same-thread writes after the read cannot feed it
                    if w.thread == e.thread && w.index > e.index {
                        continue;
                    }
                    self.add_range(w);
                }
            }
            EventKind::Acquire => {
                if !self.releases[t].remove(&event.var()) {
                    self.acquires[t].insert(event.var());
                    self.match_acquires(e.thread);
                }
            }
            EventKind::Release => {
                if !self.acquires[t].remove(&event.var()) {
                    self.releases[t].insert(event.var());
                }
            }
            EventKind::Write
            | EventKind::Begin
            | EventKind::End
            | EventKind::Fork
            | EventKind::Join => {}
        }
    }

    /// Walk `thread` forward past its cutoff until its open acquires close
    ///
    /// Ranges of one thread are pushed in index order, so any later range of
    /// `thread` was popped before the acquire's range and its releases are
    /// already matched.
    fn match_acquires(&mut self, thread: ThreadId) {
        let t = thread.as_index();
        let len = self.ctx.thread_events(thread).len();

        while !self.acquires[t].is_empty() {
            let next = match self.cutoffs[t] {
                Some(c) if c + 1 < len => c + 1,
                _ => break,
            };
            self.cutoffs[t] = Some(next);
            self.include_event(EventId::new(thread, next));
        }
    }
}

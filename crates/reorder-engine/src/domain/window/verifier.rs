//! Window Verifier
//!
//! Decides, one window at a time, whether the trace read so far can be
//! explained by some sequential interleaving.
//!
//! # Carried State
//!
//! ```text
//! window k-1                    window k
//! ┌────────────┐   memories    ┌────────────────────────────┐
//! │ {m1,m2,..} │ ────────────▶ │ DFS from every mi          │──▶ {m1',..}
//! │ lock table │ ────────────▶ │ locks held at the boundary │
//! └────────────┘               └────────────────────────────┘
//! ```
//!
//! Every completed interleaving of a window contributes its final memory to
//! the next window's set. An empty set means no interleaving exists.
//!
//! # Cost Estimate
//!
//! [`WindowVerifier::estimate_cost`] predicts how many nodes the exhaustive
//! search of a window would visit, without running it. Each random walk
//! follows one random successor for [`FLATTEN_DEPTH`] steps, multiplies the
//! running branching factor by the sampled width at that depth and charges
//! the steps taken at that width. The mean over [`ESTIMATE_ATTEMPTS`] walks is
//! scaled by the number of carried memories.

use crate::domain::event::{Event, EventKind, ThreadId, Value, VarId};
use crate::domain::search::Memory;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Random walks averaged by one cost estimate
pub const ESTIMATE_ATTEMPTS: u32 = 100;
/// Steps a walk takes before sampling the branching factor
pub const FLATTEN_DEPTH: usize = 5;

/// Lock still held when a window ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHold {
    /// Thread that acquired the lock
    pub thread: ThreadId,
    /// Acquires without a release so far
    pub depth: u32,
}

/// Fixed-point state carried from one window to the next
#[derive(Debug, Clone)]
pub struct WindowVerifier {
    states: HashSet<Memory>,
    locks: BTreeMap<VarId, LockHold>,
    windows: usize,
}

impl Default for WindowVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowVerifier {
    /// Start from the single empty memory with no lock held
    pub fn new() -> Self {
        Self {
            states: HashSet::from([Memory::new()]),
            locks: BTreeMap::new(),
            windows: 0,
        }
    }

    /// Memories reachable at the end of the last window
    pub fn states(&self) -> &HashSet<Memory> {
        &self.states
    }

    /// Locks held across the last window boundary
    pub fn locks(&self) -> &BTreeMap<VarId, LockHold> {
        &self.locks
    }

    /// Windows processed so far
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Process the next window; returns false if no interleaving of it
    /// completes from any carried memory
    pub fn step(&mut self, events: &[Event]) -> bool {
        if let Some((lock, hold)) = self.locks.iter().find(|(_, h)| h.depth > 1) {
            warn!(
                lock,
                thread = %hold.thread,
                depth = hold.depth,
                "lock acquired repeatedly across a window boundary"
            );
            self.states.clear();
            return false;
        }

        let window = Window::new(events);
        let carried: BTreeMap<VarId, ThreadId> =
            self.locks.iter().map(|(&l, h)| (l, h.thread)).collect();

        let mut next = HashSet::new();
        for memory in &self.states {
            window.explore(memory, &carried, &mut next);
        }

        self.carry_locks(events);
        self.windows += 1;
        self.states = next;
        !self.states.is_empty()
    }

    /// Estimated node count of the exhaustive search [`step`](Self::step)
    /// would run on `events`
    ///
    /// A window entered with a lock held more than once is rejected without
    /// search and costs 1. Memories are sampled in sorted order so a seeded
    /// `rng` gives a reproducible estimate.
    pub fn estimate_cost<R: Rng>(&self, events: &[Event], rng: &mut R) -> f64 {
        if self.locks.values().any(|h| h.depth > 1) {
            return 1.0;
        }
        if self.states.is_empty() {
            return 0.0;
        }

        let window = Window::new(events);
        let carried: BTreeMap<VarId, ThreadId> =
            self.locks.iter().map(|(&l, h)| (l, h.thread)).collect();
        let mut memories: Vec<&Memory> = self.states.iter().collect();
        memories.sort();

        let mut total: u64 = 0;
        for _ in 0..ESTIMATE_ATTEMPTS {
            let memory = memories[rng.gen_range(0..memories.len())];
            let root = window.root(memory, &carried);
            total = total.saturating_add(window.random_walk(root, rng));
        }

        total as f64 / f64::from(ESTIMATE_ATTEMPTS) * memories.len() as f64
    }

    /// Replay lock events in input order to find what is held at the boundary
    fn carry_locks(&mut self, events: &[Event]) {
        for event in events {
            match event.kind() {
                EventKind::Acquire => {
                    let hold = self.locks.entry(event.var()).or_insert(LockHold {
                        thread: event.thread(),
                        depth: 0,
                    });
                    hold.thread = event.thread();
                    hold.depth += 1;
                }
                EventKind::Release => {
                    if let Some(hold) = self.locks.get_mut(&event.var()) {
                        hold.depth = hold.depth.saturating_sub(1);
                        if hold.depth == 0 {
                            self.locks.remove(&event.var());
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// One window split into per-thread program order
struct Window<'a> {
    threads: Vec<Vec<&'a Event>>,
    /// Forked thread → position of its Fork
    forks: HashMap<ThreadId, (usize, usize)>,
    /// Thread → position of its last event in this window
    last: HashMap<ThreadId, (usize, usize)>,
}

/// Search node inside a window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowNode {
    cursors: Vec<usize>,
    memory: Memory,
    locks: BTreeMap<VarId, ThreadId>,
}

impl WindowNode {
    fn value_of(&self, var: VarId) -> Value {
        self.memory.get(&var).copied().unwrap_or(0)
    }
}

impl<'a> Window<'a> {
    fn new(events: &'a [Event]) -> Self {
        let mut local: HashMap<ThreadId, usize> = HashMap::new();
        let mut threads: Vec<Vec<&Event>> = Vec::new();
        let mut forks = HashMap::new();
        let mut last = HashMap::new();

        for event in events {
            let t = *local.entry(event.thread()).or_insert_with(|| {
                threads.push(Vec::new());
                threads.len() - 1
            });
            let index = threads[t].len();
            threads[t].push(event);

            if event.kind() == EventKind::Fork {
                forks.insert(event.target_thread(), (t, index));
            }
            last.insert(event.thread(), (t, index));
        }

        Self {
            threads,
            forks,
            last,
        }
    }

    fn is_finished(&self, node: &WindowNode) -> bool {
        node.cursors
            .iter()
            .zip(&self.threads)
            .all(|(&c, thread)| c >= thread.len())
    }

    fn next_event(&self, node: &WindowNode, t: usize) -> Option<&'a Event> {
        self.threads[t].get(node.cursors[t]).copied()
    }

    fn executed(node: &WindowNode, (t, index): (usize, usize)) -> bool {
        node.cursors[t] > index
    }

    fn is_executable(&self, node: &WindowNode, event: &Event) -> bool {
        match event.kind() {
            EventKind::Read => node.value_of(event.var()) == event.value(),
            EventKind::Write => true,
            EventKind::Acquire => !node.locks.contains_key(&event.var()),
            EventKind::Release => node.locks.get(&event.var()) == Some(&event.thread()),
            EventKind::Begin => self
                .forks
                .get(&event.thread())
                .map_or(true, |&fork| Self::executed(node, fork)),
            EventKind::Join => self
                .last
                .get(&event.target_thread())
                .map_or(true, |&end| Self::executed(node, end)),
            EventKind::Fork | EventKind::End => true,
        }
    }

    fn apply(node: &WindowNode, t: usize, event: &Event) -> WindowNode {
        let mut next = node.clone();
        next.cursors[t] += 1;

        match event.kind() {
            EventKind::Acquire => {
                next.locks.insert(event.var(), event.thread());
            }
            EventKind::Release => {
                next.locks.remove(&event.var());
            }
            EventKind::Write => {
                if event.value() == 0 {
                    next.memory.remove(&event.var());
                } else {
                    next.memory.insert(event.var(), event.value());
                }
            }
            EventKind::Read
            | EventKind::Begin
            | EventKind::End
            | EventKind::Fork
            | EventKind::Join => {}
        }
        next
    }

    fn root(&self, memory: &Memory, locks: &BTreeMap<VarId, ThreadId>) -> WindowNode {
        WindowNode {
            cursors: vec![0; self.threads.len()],
            memory: memory.clone(),
            locks: locks.clone(),
        }
    }

    /// Nodes reached by running one executable next event
    fn successors(&self, node: &WindowNode) -> Vec<WindowNode> {
        (0..self.threads.len())
            .filter_map(|t| {
                let event = self.next_event(node, t)?;
                self.is_executable(node, event)
                    .then(|| Self::apply(node, t, event))
            })
            .collect()
    }

    /// Exhaustive DFS from `memory`, adding every completing memory to `out`
    fn explore(
        &self,
        memory: &Memory,
        locks: &BTreeMap<VarId, ThreadId>,
        out: &mut HashSet<Memory>,
    ) {
        let root = self.root(memory, locks);
        let mut seen = HashSet::from([root.clone()]);
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            if self.is_finished(&node) {
                out.insert(node.memory);
                continue;
            }

            for successor in self.successors(&node) {
                if seen.insert(successor.clone()) {
                    stack.push(successor);
                }
            }
        }
    }

    /// One sampled search cost from `root`
    fn random_walk<R: Rng>(&self, root: WindowNode, rng: &mut R) -> u64 {
        let mut cost: u64 = 1;
        let mut degree: u64 = 1;
        let mut current = root;

        while !self.is_finished(&current) {
            let mut seen = HashSet::new();
            let mut stack = vec![(current, 0)];
            let mut level_cost: u64 = 0;
            let mut level_degree: u64 = 0;
            let mut frontier = Vec::new();

            while let Some((node, depth)) = stack.pop() {
                if self.is_finished(&node) {
                    return cost.saturating_add(level_cost);
                }
                level_cost += 1;

                let mut successors = self.successors(&node);
                if successors.is_empty() {
                    continue;
                }
                let width = successors.len() as u64;
                let picked = successors.swap_remove(rng.gen_range(0..successors.len()));

                if depth == FLATTEN_DEPTH {
                    level_degree += width;
                    frontier.push(picked);
                } else if seen.insert(picked.clone()) {
                    stack.push((picked, depth + 1));
                }
            }

            degree = degree.saturating_mul(level_degree);
            cost = cost.saturating_add(degree.saturating_mul(level_cost));
            if frontier.is_empty() {
                return cost;
            }
            current = frontier.swap_remove(rng.gen_range(0..frontier.len()));
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ev(kind: EventKind, t: u32, var: VarId, value: Value, seq: u32) -> Event {
        Event::new(kind, ThreadId(t), var, value, seq)
    }

    #[test]
    fn test_conflicting_writes_are_consistent() {
        let mut verifier = WindowVerifier::new();
        let ok = verifier.step(&[
            ev(EventKind::Write, 0, 0, 1, 0),
            ev(EventKind::Write, 1, 0, 2, 1),
        ]);

        assert!(ok);
        // Either write can land last
        assert_eq!(verifier.states().len(), 2);
        assert_eq!(verifier.windows(), 1);
    }

    #[test]
    fn test_unreachable_read_is_inconsistent() {
        let mut verifier = WindowVerifier::new();
        let ok = verifier.step(&[
            ev(EventKind::Write, 0, 0, 1, 0),
            ev(EventKind::Read, 1, 0, 7, 1),
        ]);

        assert!(!ok);
        assert!(verifier.states().is_empty());
    }

    #[test]
    fn test_read_constrains_later_window() {
        let mut verifier = WindowVerifier::new();
        assert!(verifier.step(&[
            ev(EventKind::Write, 0, 0, 1, 0),
            ev(EventKind::Write, 1, 0, 2, 1),
        ]));
        assert!(verifier.step(&[ev(EventKind::Read, 2, 0, 2, 2)]));
        assert_eq!(verifier.states().len(), 1);
        assert!(!verifier.step(&[ev(EventKind::Read, 2, 0, 1, 3)]));
    }

    #[test]
    fn test_lock_held_across_boundary() {
        let mut verifier = WindowVerifier::new();
        assert!(verifier.step(&[
            ev(EventKind::Acquire, 0, 9, 0, 0),
            ev(EventKind::Write, 0, 0, 1, 1),
        ]));
        assert_eq!(
            verifier.locks().get(&9),
            Some(&LockHold {
                thread: ThreadId(0),
                depth: 1
            })
        );

        // T1 cannot take the lock before T0 releases it
        assert!(verifier.step(&[
            ev(EventKind::Release, 0, 9, 0, 2),
            ev(EventKind::Acquire, 1, 9, 0, 3),
        ]));
        assert_eq!(verifier.locks().get(&9).map(|h| h.thread), Some(ThreadId(1)));
    }

    #[test]
    fn test_release_by_other_thread_fails() {
        let mut verifier = WindowVerifier::new();
        assert!(verifier.step(&[ev(EventKind::Acquire, 0, 9, 0, 0)]));
        assert!(!verifier.step(&[ev(EventKind::Release, 1, 9, 0, 1)]));
    }

    #[test]
    fn test_double_acquire_is_inconsistent() {
        let mut verifier = WindowVerifier::new();
        assert!(!verifier.step(&[
            ev(EventKind::Acquire, 0, 9, 0, 0),
            ev(EventKind::Acquire, 1, 9, 0, 1),
        ]));
        assert_eq!(verifier.locks().get(&9).map(|h| h.depth), Some(2));
        assert!(!verifier.step(&[ev(EventKind::Write, 0, 0, 1, 2)]));
    }

    #[test]
    fn test_fork_and_join_order_threads() {
        // Parent reads 0 before the fork and 5 after the join
        let mut verifier = WindowVerifier::new();
        assert!(verifier.step(&[
            ev(EventKind::Read, 0, 0, 0, 0),
            ev(EventKind::Fork, 0, 1, 0, 1),
            ev(EventKind::Begin, 1, 0, 0, 2),
            ev(EventKind::Write, 1, 0, 5, 3),
            ev(EventKind::End, 1, 0, 0, 4),
            ev(EventKind::Join, 0, 1, 0, 5),
            ev(EventKind::Read, 0, 0, 5, 6),
        ]));

        // After the join the child's write is visible, so 0 cannot be read
        let mut verifier = WindowVerifier::new();
        assert!(!verifier.step(&[
            ev(EventKind::Fork, 0, 1, 0, 0),
            ev(EventKind::Begin, 1, 0, 0, 1),
            ev(EventKind::Write, 1, 0, 5, 2),
            ev(EventKind::End, 1, 0, 0, 3),
            ev(EventKind::Join, 0, 1, 0, 4),
            ev(EventKind::Read, 0, 0, 0, 5),
        ]));
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_single_event_costs_root_and_leaf() {
        let verifier = WindowVerifier::new();
        let cost = verifier.estimate_cost(&[ev(EventKind::Write, 0, 0, 1, 0)], &mut rng());
        assert_eq!(cost, 2.0);
    }

    #[test]
    fn test_dead_end_costs_root_only() {
        let verifier = WindowVerifier::new();
        let cost = verifier.estimate_cost(&[ev(EventKind::Read, 0, 0, 7, 0)], &mut rng());
        assert_eq!(cost, 1.0);
    }

    #[test]
    fn test_interleavings_of_two_writes() {
        let verifier = WindowVerifier::new();
        let events = [ev(EventKind::Write, 0, 0, 1, 0), ev(EventKind::Write, 1, 0, 2, 1)];
        assert_eq!(verifier.estimate_cost(&events, &mut rng()), 3.0);
    }

    #[test]
    fn test_long_window_is_flattened() {
        // Six steps to the sampling depth, then one more to the leaf
        let events: Vec<Event> = (0..7).map(|i| ev(EventKind::Write, 0, 0, i + 1, i)).collect();
        let verifier = WindowVerifier::new();
        assert_eq!(verifier.estimate_cost(&events, &mut rng()), 8.0);
    }

    #[test]
    fn test_scaled_by_carried_memories() {
        let mut verifier = WindowVerifier::new();
        assert!(verifier.step(&[
            ev(EventKind::Write, 0, 0, 1, 0),
            ev(EventKind::Write, 1, 0, 2, 1),
        ]));
        assert_eq!(verifier.states().len(), 2);

        let cost = verifier.estimate_cost(&[ev(EventKind::Write, 2, 1, 1, 2)], &mut rng());
        assert_eq!(cost, 4.0);
    }

    #[test]
    fn test_repeated_lock_costs_one() {
        let mut verifier = WindowVerifier::new();
        verifier.step(&[
            ev(EventKind::Acquire, 0, 9, 0, 0),
            ev(EventKind::Acquire, 1, 9, 0, 1),
        ]);
        let cost = verifier.estimate_cost(&[ev(EventKind::Write, 0, 0, 1, 2)], &mut rng());
        assert_eq!(cost, 1.0);
    }

    #[test]
    fn test_seeded_estimate_is_reproducible() {
        let events: Vec<Event> = (0..12)
            .map(|i| ev(EventKind::Write, i % 3, 0, i + 1, i))
            .collect();
        let verifier = WindowVerifier::new();

        let a = verifier.estimate_cost(&events, &mut StdRng::seed_from_u64(42));
        let b = verifier.estimate_cost(&events, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert!(a > 1.0);
    }
}

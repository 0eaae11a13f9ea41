//! Vector Clock Implementation
//!
//! Vector clocks are used to track causality (happens-before relation)
//! between trace events.
//!
//! # Theory
//!
//! Given events e1 and e2:
//! - e1 is ordered before e2 if VC(e1) ≤ VC(e2) componentwise
//! - e1 and e2 are concurrent if neither clock precedes the other
//!
//! # Implementation
//!
//! The width is the number of threads in the trace, fixed when the clock is
//! created. Clocks of different widths are never compared.

use crate::domain::event::ThreadId;
use std::fmt;

/// Vector clock for tracking causality
///
/// # Representation
///
/// - `clock[i]` = number of events of thread i known to precede this point
///
/// # Example
///
/// ```text
/// Thread 0: [5, 2, 3]  (T0 has executed 5 events, last saw T1 at 2, T2 at 3)
/// Thread 1: [4, 7, 3]  (T1 has executed 7 events, last saw T0 at 4, T2 at 3)
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VectorClock {
    clocks: Vec<u32>,
}

impl VectorClock {
    /// Create a new vector clock of the given width, initialized to zero
    #[inline]
    pub fn new(width: usize) -> Self {
        Self {
            clocks: vec![0; width],
        }
    }

    /// Number of components
    #[inline]
    pub fn width(&self) -> usize {
        self.clocks.len()
    }

    /// Increment the component of a specific thread
    ///
    /// ```text
    /// [1, 0, 0] --tick(T0)--> [2, 0, 0]
    /// ```
    #[inline]
    pub fn tick(&mut self, thread: ThreadId) {
        if let Some(c) = self.clocks.get_mut(thread.as_index()) {
            *c = c.saturating_add(1);
        }
    }

    /// Merge with another vector clock (element-wise max)
    ///
    /// ```text
    /// self:  [3, 1, 2]
    /// other: [2, 5, 1]
    /// result:[3, 5, 2]
    /// ```
    #[inline]
    pub fn merge(&mut self, other: &VectorClock) {
        for (mine, theirs) in self.clocks.iter_mut().zip(&other.clocks) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// Componentwise `≤`
    ///
    /// Reflexive: a clock precedes itself.
    ///
    /// ```text
    /// [1, 2, 3] precedes [2, 3, 4]  ✓
    /// [1, 2, 3] precedes [1, 2, 3]  ✓
    /// [1, 3, 3] precedes [2, 2, 4]  ✗ (3 > 2)
    /// ```
    pub fn precedes(&self, other: &VectorClock) -> bool {
        self.clocks
            .iter()
            .zip(&other.clocks)
            .all(|(mine, theirs)| mine <= theirs)
    }

    /// Get the component for a specific thread
    #[inline]
    pub fn get(&self, thread: ThreadId) -> u32 {
        self.clocks.get(thread.as_index()).copied().unwrap_or(0)
    }

    /// Set the component for a specific thread (used in testing)
    #[inline]
    pub fn set(&mut self, thread: ThreadId, value: u32) {
        if let Some(c) = self.clocks.get_mut(thread.as_index()) {
            *c = value;
        }
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC[")?;
        for (i, val) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", val)?;
        }
        write!(f, "]")
    }
}

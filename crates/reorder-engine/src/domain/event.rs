//! Trace Event Definitions
//!
//! An [`Event`] is one record of a recorded execution. Events are immutable
//! once decoded; every analysis refers to them through an [`EventId`], the
//! (thread, thread-local index) position of the event inside its thread.
//!
//! # Wire Layout
//!
//! A record is a single `u64`:
//!
//! ```text
//!  63    60 59        52 51                 32 31                         0
//! ┌────────┬────────────┬─────────────────────┬────────────────────────────┐
//! │  kind  │   thread   │  variable / lock id │           value            │
//! │ 4 bits │   8 bits   │       20 bits       │          32 bits           │
//! └────────┴────────────┴─────────────────────┴────────────────────────────┘
//! ```
//!
//! Fork and Join carry the target thread id in the variable slot.

use crate::error::{TraceError, TraceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variable or lock identifier (20 significant bits)
pub type VarId = u32;

/// Value stored in a variable
pub type Value = u32;

const KIND_SHIFT: u32 = 60;
const THREAD_SHIFT: u32 = 52;
const VAR_SHIFT: u32 = 32;

const KIND_MASK: u64 = 0xF;
const THREAD_MASK: u64 = 0xFF;
const VAR_MASK: u64 = 0xF_FFFF;
const VALUE_MASK: u64 = 0xFFFF_FFFF;

/// Number of thread ids addressable by the 8-bit thread field
pub const MAX_THREADS: usize = 256;

/// A dense thread identifier
///
/// After parsing, thread ids are `0..n` in order of first appearance, so a
/// `ThreadId` doubles as an index into per-thread vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Create a new ThreadId
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        ThreadId(id)
    }

    /// Convert to a vector index
    #[inline(always)]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// Read of a shared variable
    Read = 0,
    /// Write to a shared variable
    Write = 1,
    /// Lock acquire
    Acquire = 2,
    /// Lock release
    Release = 3,
    /// First event of a forked thread
    Begin = 4,
    /// Last event of a thread
    End = 5,
    /// Fork of the thread named in the variable slot
    Fork = 6,
    /// Join on the thread named in the variable slot
    Join = 7,
}

impl EventKind {
    /// Decode the 4-bit kind field
    #[inline]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(EventKind::Read),
            1 => Some(EventKind::Write),
            2 => Some(EventKind::Acquire),
            3 => Some(EventKind::Release),
            4 => Some(EventKind::Begin),
            5 => Some(EventKind::End),
            6 => Some(EventKind::Fork),
            7 => Some(EventKind::Join),
            _ => None,
        }
    }

    /// Human-readable name used in witness files
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::Read => "Read",
            EventKind::Write => "Write",
            EventKind::Acquire => "Acquire",
            EventKind::Release => "Release",
            EventKind::Begin => "Begin",
            EventKind::End => "End",
            EventKind::Fork => "Fork",
            EventKind::Join => "Join",
        }
    }

    /// True for reads and writes
    #[inline]
    pub const fn is_access(self) -> bool {
        matches!(self, EventKind::Read | EventKind::Write)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single decoded trace event
///
/// `seq` is the position of the event in the full input trace; record order is
/// the global sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    kind: EventKind,
    thread: ThreadId,
    var: VarId,
    value: Value,
    seq: u32,
}

impl Event {
    /// Create an event from its fields
    ///
    /// `var` is truncated to its 20-bit field so that `encode` round-trips.
    #[inline]
    pub const fn new(kind: EventKind, thread: ThreadId, var: VarId, value: Value, seq: u32) -> Self {
        Self {
            kind,
            thread,
            var: var & (VAR_MASK as u32),
            value,
            seq,
        }
    }

    /// Decode a raw record read at position `seq`
    pub fn decode(raw: u64, seq: u32) -> TraceResult<Self> {
        let bits = ((raw >> KIND_SHIFT) & KIND_MASK) as u8;
        let kind = EventKind::from_bits(bits).ok_or(TraceError::UnknownKind {
            index: seq,
            raw,
            kind: bits,
        })?;

        Ok(Self {
            kind,
            thread: ThreadId(((raw >> THREAD_SHIFT) & THREAD_MASK) as u32),
            var: ((raw >> VAR_SHIFT) & VAR_MASK) as u32,
            value: (raw & VALUE_MASK) as u32,
            seq,
        })
    }

    /// Encode into the packed record layout
    ///
    /// The sequence number is positional and not part of the record.
    pub const fn encode(&self) -> u64 {
        ((self.kind as u64 & KIND_MASK) << KIND_SHIFT)
            | ((self.thread.0 as u64 & THREAD_MASK) << THREAD_SHIFT)
            | ((self.var as u64 & VAR_MASK) << VAR_SHIFT)
            | (self.value as u64 & VALUE_MASK)
    }

    /// Event kind
    #[inline(always)]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Owning thread
    #[inline(always)]
    pub const fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Variable or lock id
    #[inline(always)]
    pub const fn var(&self) -> VarId {
        self.var
    }

    /// Value read or written
    #[inline(always)]
    pub const fn value(&self) -> Value {
        self.value
    }

    /// Position in the full input trace
    #[inline(always)]
    pub const fn seq(&self) -> u32 {
        self.seq
    }

    /// Thread forked or joined by a Fork/Join event
    #[inline]
    pub const fn target_thread(&self) -> ThreadId {
        ThreadId(self.var)
    }

    /// Copy of this event owned by another thread
    #[inline]
    pub const fn with_thread(self, thread: ThreadId) -> Self {
        Self { thread, ..self }
    }

    /// Copy of this event with a different variable slot
    #[inline]
    pub const fn with_var(self, var: VarId) -> Self {
        Self { var, ..self }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @{}",
            self.kind, self.thread, self.var, self.value, self.seq
        )
    }
}

/// Position of an event within its thread
///
/// Ordering within a thread is index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    /// Owning thread
    pub thread: ThreadId,
    /// Thread-local index
    pub index: usize,
}

impl EventId {
    /// Create a new EventId
    #[inline(always)]
    pub const fn new(thread: ThreadId, index: usize) -> Self {
        Self { thread, index }
    }

    /// Id of the previous event in the same thread
    #[inline]
    pub fn prev(self) -> Option<Self> {
        self.index.checked_sub(1).map(|index| Self::new(self.thread, index))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}#{}", self.thread.0, self.index)
    }
}

/// Look up an event by id
///
/// # Panics
///
/// Panics if `id` does not name an event in `events`.
#[inline]
pub fn event_at(events: &[Vec<Event>], id: EventId) -> &Event {
    &events[id.thread.as_index()][id.index]
}

//! Domain Layer
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Event Model                   Causality Module             │
//! │  ├─ Event / EventKind          ├─ VectorClock               │
//! │  └─ EventId / ThreadId         └─ Closure (+ reduction)     │
//! │                                                             │
//! │                   Trace Context                             │
//! │                   ├─ writer / reader indexes                │
//! │                   ├─ lock pairing, fork map                 │
//! │                   └─ candidate pairs                        │
//! │                                                             │
//! │  Search Module                 Window Module                │
//! │  ├─ IncludeSet                 ├─ WindowVerifier            │
//! │  ├─ Trace (search node)        ├─ WindowSource              │
//! │  └─ RaceSearch (best-first)    └─ windowing()               │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous and single-threaded per query. The
//! parallel fan-out over candidate pairs lives in the adapters layer.

pub mod causality;
pub mod context;
pub mod event;
pub mod search;
pub mod window;

pub use causality::{Closure, ClosureBuilder, VectorClock};
pub use context::{CandidatePair, TraceContext};
pub use event::{Event, EventId, EventKind, ThreadId, Value, VarId, MAX_THREADS};
pub use search::{is_data_race, verify_sc, IncludeSet, SearchOutcome};
pub use window::{
    verify_windows, windowing, EventWindows, WindowReport, WindowSource, WindowVerifier,
};

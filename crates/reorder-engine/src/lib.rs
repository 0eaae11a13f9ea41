//! Reorder: Predictive Race Detection Engine
//!
//! # Overview
//!
//! `reorder-engine` takes one recorded execution of a concurrent program and
//! asks two questions about it:
//!
//! 1. **Race prediction**: for each pair of conflicting accesses, is there a
//!    different interleaving, consistent with program order, fork/join,
//!    locking and the values every read observed, in which both accesses are
//!    about to execute at the same time?
//! 2. **SC verification**: can the observed reads be explained by some
//!    sequentially consistent interleaving at all?
//!
//! # Layered Architecture
//!
//! - **Domain**: event model, happens-before closure, slicing, best-first
//!   race search, windowed SC verification
//! - **Infrastructure**: binary trace records, text converter, witness files
//! - **Adapters**: parallel fan-out over candidate pairs
//!
//! # Pipeline
//!
//! ```text
//! binary trace ──parse──▶ TraceContext ──candidate_pairs──▶ RacePool
//!                          (indexes,                         │ per pair:
//!                           closure)                         │ IncludeSet
//!                                                            │ RaceSearch
//!                                                            ▼
//!                                                      PredictionReport
//! ```
//!
//! # Usage
//!
//! ```rust
//! use reorder_engine::{Event, EventKind, PredictorConfig, RacePool, ThreadId, TraceContext};
//! use std::sync::Arc;
//!
//! // T0 writes x, T1 reads the initial value of x
//! let ctx = TraceContext::build(vec![
//!     vec![Event::new(EventKind::Write, ThreadId(0), 0, 1, 0)],
//!     vec![Event::new(EventKind::Read, ThreadId(1), 0, 0, 1)],
//! ]);
//!
//! let pool = RacePool::new(Arc::new(ctx), PredictorConfig::default()).unwrap();
//! let report = pool.run();
//! assert_eq!(report.num_races(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Event model
pub use domain::{Event, EventId, EventKind, ThreadId, Value, VarId};

// Analysis
pub use domain::{
    is_data_race, verify_sc, verify_windows, windowing, CandidatePair, Closure, EventWindows,
    IncludeSet, SearchOutcome, TraceContext, WindowReport, WindowSource, WindowVerifier,
};

// Configuration & errors
pub use config::{PredictorConfig, WindowConfig};
pub use error::{TraceError, TraceResult};

// File formats
pub use infrastructure::{parse_trace, ParsedTrace, TraceReader, TraceWriter, Witness};

// Parallel driver
pub use adapters::{PairStats, PredictionReport, RacePool, RaceReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

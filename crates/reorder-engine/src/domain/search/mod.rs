//! Race Search Module
//!
//! ```text
//! candidate (e1, e2)
//!        │
//!        ▼
//! ┌──────────────┐   cutoffs   ┌──────────────┐   nodes   ┌──────────────┐
//! │ IncludeSet   │ ──────────▶ │ Trace        │ ────────▶ │ RaceSearch   │
//! │ backward     │             │ cursors +    │           │ best-first,  │
//! │ slice        │             │ memory       │           │ arena + seen │
//! └──────────────┘             └──────────────┘           └──────────────┘
//! ```

pub mod include_set;
pub mod predictor;
pub mod trace;

pub use include_set::IncludeSet;
pub use predictor::{is_data_race, verify_sc, RaceSearch, SearchOutcome};
pub use trace::{Cursor, Memory, NodeId, Query, Trace};

//! Causality Module
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐
//! │ ClosureBuilder   │ ───▶ │ Closure          │
//! ├──────────────────┤      ├──────────────────┤
//! │ - direct edges   │      │ - event clocks   │  happens_before(e1, e2)
//! │ - thread count   │      │ - reduction      │  direct_predecessors(e)
//! └──────────────────┘      └──────────────────┘
//! ```

pub mod closure;
pub mod vector_clock;

pub use closure::{Closure, ClosureBuilder};
pub use vector_clock::VectorClock;

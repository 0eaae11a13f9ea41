//! Adapters Layer - Drivers
//!
//! Connects the single-query domain search to a whole run: fans candidate
//! pairs out over worker threads and hands confirmed races to the witness
//! writer.

pub mod pool;

pub use pool::{PairStats, PredictionReport, RacePool, RaceReport};

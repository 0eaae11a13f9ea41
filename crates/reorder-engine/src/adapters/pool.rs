//! Candidate-Pair Worker Pool
//!
//! Pair searches share nothing mutable except the result list, so the pool
//! is a plain claim-counter fan-out over scoped threads:
//!
//! ```text
//!            ┌──────────────┐
//!            │ next: Atomic │  fetch_add(1)
//!            └──────┬───────┘
//!      ┌────────────┼────────────┐
//!   worker 0     worker 1 ... worker n-1      each: is_data_race(pair)
//!      │            │            │
//!      ▼            ▼            ▼
//!   Mutex<Vec<RaceReport>>   DashMap<index, PairStats>
//! ```
//!
//! Searches run on dense thread ids. Reports and witness files are renamed
//! back to the ids recorded in the trace when a table is supplied through
//! [`RacePool::with_thread_ids`].

use crate::config::PredictorConfig;
use crate::domain::context::{CandidatePair, TraceContext};
use crate::domain::event::{EventId, ThreadId};
use crate::domain::search::is_data_race;
use crate::error::TraceResult;
use crate::infrastructure::witness::Witness;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One confirmed race
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceReport {
    /// Access appearing first in the input trace, on its recorded thread id
    pub first: EventId,
    /// Access appearing second in the input trace
    pub second: EventId,
    /// Global sequence number of `first`
    pub first_seq: u32,
    /// Global sequence number of `second`
    pub second_seq: u32,
    /// Search nodes popped before the witness was found
    pub nodes_explored: u64,
}

/// Per-pair diagnostics, kept for every candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairStats {
    /// Search outcome
    pub race: bool,
    /// Search nodes popped
    pub nodes_explored: u64,
    /// Wall time of the search
    pub elapsed_us: u64,
}

/// Outcome of a whole prediction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PredictionReport {
    /// Candidate pairs tested
    pub candidates: usize,
    /// Confirmed races, sorted by sequence numbers
    pub races: Vec<RaceReport>,
    /// Wall time of the run
    pub elapsed_ms: u64,
}

impl PredictionReport {
    /// Number of confirmed races
    pub fn num_races(&self) -> usize {
        self.races.len()
    }
}

/// Parallel driver over the candidate pairs of one trace
pub struct RacePool {
    ctx: Arc<TraceContext>,
    config: PredictorConfig,
    /// Dense → recorded thread id; empty when ids are already dense
    raw_ids: Vec<u32>,
    stats: DashMap<usize, PairStats>,
}

impl RacePool {
    /// Create a pool; fails on an invalid configuration
    pub fn new(ctx: Arc<TraceContext>, config: PredictorConfig) -> TraceResult<Self> {
        config.validate()?;
        Ok(Self {
            ctx,
            config,
            raw_ids: Vec::new(),
            stats: DashMap::new(),
        })
    }

    /// Report threads under the ids recorded in the trace
    ///
    /// `raw_ids[dense]` is the recorded id of dense thread `dense`, as
    /// produced by [`parse_trace`](crate::infrastructure::parse_trace).
    pub fn with_thread_ids(mut self, raw_ids: Vec<u32>) -> Self {
        self.raw_ids = raw_ids;
        self
    }

    /// Shared trace context
    pub fn context(&self) -> &TraceContext {
        &self.ctx
    }

    /// Diagnostics of the pair at `index` in the last run
    pub fn pair_stats(&self, index: usize) -> Option<PairStats> {
        self.stats.get(&index).map(|s| *s)
    }

    /// Total search nodes popped in the last run
    pub fn total_nodes(&self) -> u64 {
        self.stats.iter().map(|s| s.nodes_explored).sum()
    }

    /// Test every candidate pair of the trace
    pub fn run(&self) -> PredictionReport {
        self.run_pairs(&self.ctx.candidate_pairs())
    }

    /// Test the given pairs
    pub fn run_pairs(&self, pairs: &[CandidatePair]) -> PredictionReport {
        let started = Instant::now();
        self.stats.clear();

        let workers = self.config.worker_count(pairs.len());
        info!(candidates = pairs.len(), workers, "race prediction started");

        let next = AtomicUsize::new(0);
        let races = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(pairs, &next, &races));
            }
        });

        let mut races = races.into_inner();
        races.sort_by_key(|r: &RaceReport| (r.first_seq, r.second_seq));

        let report = PredictionReport {
            candidates: pairs.len(),
            races,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            candidates = report.candidates,
            races = report.num_races(),
            nodes = self.total_nodes(),
            elapsed_ms = report.elapsed_ms,
            "race prediction finished"
        );
        report
    }

    fn recorded(&self, id: EventId) -> EventId {
        match self.raw_ids.get(id.thread.as_index()) {
            Some(&raw) => EventId::new(ThreadId(raw), id.index),
            None => id,
        }
    }

    fn worker(&self, pairs: &[CandidatePair], next: &AtomicUsize, races: &Mutex<Vec<RaceReport>>) {
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(&pair) = pairs.get(index) else {
                break;
            };

            let started = Instant::now();
            let outcome = is_data_race(&self.ctx, pair.first, pair.second, self.config.witness);
            let stats = PairStats {
                race: outcome.race,
                nodes_explored: outcome.nodes_explored,
                elapsed_us: started.elapsed().as_micros() as u64,
            };
            self.stats.insert(index, stats);

            let first_seq = self.ctx.event(pair.first).seq();
            let second_seq = self.ctx.event(pair.second).seq();
            let (first, second) = (self.recorded(pair.first), self.recorded(pair.second));
            if self.config.verbose {
                info!(%first, %second, first_seq, second_seq, ?stats, "pair checked");
            } else {
                debug!(%first, %second, ?stats, "pair checked");
            }

            if !outcome.race {
                continue;
            }

            if let Some(events) = outcome.witness {
                let dir = &self.config.output_dir;
                let witness = Witness::new(events).with_thread_ids(&self.raw_ids);
                if let Err(e) = witness.write_to(dir, first_seq, second_seq) {
                    warn!(dir = %dir.display(), first_seq, second_seq, error = %e, "failed to write witness");
                }
            }

            races.lock().push(RaceReport {
                first,
                second,
                first_seq,
                second_seq,
                nodes_explored: outcome.nodes_explored,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Event, EventKind, ThreadId, Value, VarId};

    fn ev(kind: EventKind, t: u32, var: VarId, value: Value, seq: u32) -> Event {
        Event::new(kind, ThreadId(t), var, value, seq)
    }

    fn racy_context() -> Arc<TraceContext> {
        // Two unguarded writers, one guarded pair
        Arc::new(TraceContext::build(vec![
            vec![
                ev(EventKind::Write, 0, 0, 1, 0),
                ev(EventKind::Acquire, 0, 9, 0, 1),
                ev(EventKind::Write, 0, 1, 1, 2),
                ev(EventKind::Release, 0, 9, 0, 3),
            ],
            vec![
                ev(EventKind::Write, 1, 0, 2, 4),
                ev(EventKind::Acquire, 1, 9, 0, 5),
                ev(EventKind::Write, 1, 1, 2, 6),
                ev(EventKind::Release, 1, 9, 0, 7),
            ],
        ]))
    }

    #[test]
    fn test_pool_finds_unguarded_race() {
        let config = PredictorConfig {
            threads: Some(2),
            ..Default::default()
        };
        let pool = RacePool::new(racy_context(), config).unwrap();
        let report = pool.run();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.num_races(), 1);
        assert_eq!((report.races[0].first_seq, report.races[0].second_seq), (0, 4));
        assert!(pool.pair_stats(0).is_some_and(|s| s.race));
    }

    #[test]
    fn test_pool_rejects_zero_threads() {
        let config = PredictorConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(RacePool::new(racy_context(), config).is_err());
    }

    #[test]
    fn test_empty_pair_list() {
        let pool = RacePool::new(racy_context(), PredictorConfig::default()).unwrap();
        let report = pool.run_pairs(&[]);
        assert_eq!(report.candidates, 0);
        assert!(report.races.is_empty());
        assert_eq!(pool.total_nodes(), 0);
    }

    #[test]
    fn test_witness_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = PredictorConfig {
            witness: true,
            output_dir: dir.path().join("w"),
            threads: Some(1),
            ..Default::default()
        };
        let pool = RacePool::new(racy_context(), config).unwrap();
        let report = pool.run();

        assert_eq!(report.num_races(), 1);
        assert!(dir.path().join("w").join("0_4.txt").exists());
    }

    #[test]
    fn test_reports_use_recorded_thread_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = PredictorConfig {
            witness: true,
            output_dir: dir.path().to_path_buf(),
            threads: Some(1),
            ..Default::default()
        };
        let pool = RacePool::new(racy_context(), config)
            .unwrap()
            .with_thread_ids(vec![3, 8]);
        let report = pool.run();

        let race = &report.races[0];
        assert_eq!(race.first, EventId::new(ThreadId(3), 0));
        assert_eq!(race.second, EventId::new(ThreadId(8), 0));
        assert_eq!(std::fs::read_to_string(dir.path().join("0_4.txt")).unwrap(), "");
    }

    #[test]
    fn test_report_serializes() {
        let pool = RacePool::new(racy_context(), PredictorConfig::default()).unwrap();
        let json = serde_json::to_value(pool.run()).unwrap();
        assert_eq!(json["candidates"], 1);
        assert_eq!(json["races"][0]["first_seq"], 0);
    }
}

//! Windowed Sequential-Consistency Verification
//!
//! The trace is consumed in fixed-size windows so that memory stays bounded
//! on long executions. Windows come from a [`WindowSource`]: the binary
//! reader for files, [`EventWindows`] for traces already in memory.
//!
//! With [`WindowConfig::estimate`] set, every window's search cost is
//! estimated before it is verified and the sum is reported.

pub mod verifier;

pub use verifier::{LockHold, WindowVerifier, ESTIMATE_ATTEMPTS, FLATTEN_DEPTH};

use crate::config::WindowConfig;
use crate::domain::event::Event;
use crate::error::TraceResult;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of a windowed verification run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowReport {
    /// Every window admitted an interleaving
    pub consistent: bool,
    /// Windows processed, including the failing one
    pub windows: usize,
    /// Sum of the per-window cost estimates, when requested
    pub estimated_cost: Option<f64>,
}

/// Supplier of consecutive trace windows
pub trait WindowSource {
    /// Next chunk of at most `size` events in input order; empty at the end
    /// of the trace
    fn next_window(&mut self, size: usize) -> TraceResult<Vec<Event>>;
}

/// Windows over an in-memory event list
#[derive(Debug, Clone)]
pub struct EventWindows<'a> {
    events: &'a [Event],
}

impl<'a> EventWindows<'a> {
    /// Serve `events` in input order
    pub fn new(events: &'a [Event]) -> Self {
        Self { events }
    }
}

impl WindowSource for EventWindows<'_> {
    fn next_window(&mut self, size: usize) -> TraceResult<Vec<Event>> {
        let (window, rest) = self.events.split_at(size.min(self.events.len()));
        self.events = rest;
        Ok(window.to_vec())
    }
}

/// Verify the whole trace window by window
///
/// Returns `Ok(false)` as soon as one window admits no interleaving from any
/// carried state, `Ok(true)` once the source is exhausted.
pub fn windowing<S: WindowSource>(source: &mut S, config: &WindowConfig) -> TraceResult<bool> {
    verify_windows(source, config).map(|report| report.consistent)
}

/// [`windowing`] with the window count and the optional cost estimate
pub fn verify_windows<S: WindowSource>(
    source: &mut S,
    config: &WindowConfig,
) -> TraceResult<WindowReport> {
    config.validate()?;

    let started = Instant::now();
    let mut verifier = WindowVerifier::new();
    let mut rng = config.estimate.then(|| match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    });
    let mut estimated_cost = rng.as_ref().map(|_| 0.0);

    loop {
        let window_start = Instant::now();
        let events = source.next_window(config.window_size)?;
        if events.is_empty() {
            break;
        }

        let window = verifier.windows();
        if let (Some(rng), Some(total)) = (rng.as_mut(), estimated_cost.as_mut()) {
            let cost = verifier.estimate_cost(&events, rng);
            *total += cost;
            debug!(window, cost, "window cost estimated");
        }

        let consistent = verifier.step(&events);
        let elapsed_ms = window_start.elapsed().as_secs_f64() * 1000.0;
        let states = verifier.states().len();

        if config.verbose {
            info!(window, events = events.len(), states, elapsed_ms, consistent, "window verified");
        } else {
            debug!(window, events = events.len(), states, elapsed_ms, consistent, "window verified");
        }

        if !consistent {
            info!(window, "no sequential interleaving explains this window");
            return Ok(WindowReport {
                consistent: false,
                windows: verifier.windows(),
                estimated_cost,
            });
        }
    }

    info!(
        windows = verifier.windows(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        ?estimated_cost,
        "trace is sequentially consistent"
    );
    Ok(WindowReport {
        consistent: true,
        windows: verifier.windows(),
        estimated_cost,
    })
}

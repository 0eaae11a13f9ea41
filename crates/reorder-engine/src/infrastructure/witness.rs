//! Witness Files
//!
//! A confirmed race can be written out as the concrete reordering that
//! exposes it, one event per line:
//!
//! ```text
//! Write 0 3 1 @5
//! Read 1 3 1 @9
//! ```
//!
//! Files are named `<seq1>_<seq2>.txt` after the global sequence numbers of
//! the racing pair. Thread ids, including Fork/Join targets, are the ones
//! recorded in the input trace once [`Witness::with_thread_ids`] is applied.

use crate::domain::event::{Event, EventKind, ThreadId};
use crate::error::TraceResult;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Reconstructed event sequence for one race
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    events: Vec<Event>,
}

impl Witness {
    /// Wrap a reconstructed sequence
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Rename dense thread ids to the raw ids recorded in the trace
    ///
    /// `raw_ids[dense]` is the recorded id of dense thread `dense`. Ids
    /// missing from the table are kept as they are.
    pub fn with_thread_ids(mut self, raw_ids: &[u32]) -> Self {
        let raw = |dense: u32| raw_ids.get(dense as usize).copied().unwrap_or(dense);
        for event in &mut self.events {
            let mut renamed = event.with_thread(ThreadId(raw(event.thread().0)));
            if matches!(event.kind(), EventKind::Fork | EventKind::Join) {
                renamed = renamed.with_var(raw(event.var()));
            }
            *event = renamed;
        }
        self
    }

    /// Witnessed events in execution order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// File name used for the pair `(first, second)`
    pub fn file_name(first: u32, second: u32) -> String {
        format!("{first}_{second}.txt")
    }

    /// Render the sequence, one event per line
    pub fn write<W: Write>(&self, mut out: W) -> TraceResult<()> {
        for event in &self.events {
            writeln!(out, "{event}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write `<dir>/<first>_<second>.txt`, creating `dir` if needed
    pub fn write_to(&self, dir: impl AsRef<Path>, first: u32, second: u32) -> TraceResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(Self::file_name(first, second));
        self.write(BufWriter::new(File::create(&path)?))?;
        Ok(path)
    }
}

impl From<Vec<Event>> for Witness {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

//! Binary Trace Codec
//!
//! A trace file is a flat sequence of little-endian `u64` records, one per
//! event (layout in [`crate::domain::event`]). Record order is the global
//! sequence order, so the sequence number of an event is its record index.
//!
//! # Thread Remapping
//!
//! Raw thread ids are arbitrary 8-bit values. [`parse_reader`] remaps them to
//! dense ids `0..n` in order of first appearance, counting appearances as the
//! target of a Fork or Join, so per-thread data can live in plain vectors.

use crate::domain::event::{Event, EventKind, ThreadId, MAX_THREADS};
use crate::domain::window::WindowSource;
use crate::error::{TraceError, TraceResult};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Size of one encoded record
pub const RECORD_BYTES: usize = 8;

/// Streaming record reader
#[derive(Debug)]
pub struct TraceReader<R> {
    inner: R,
    seq: u32,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file
    pub fn open(path: impl AsRef<Path>) -> TraceResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> TraceReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self { inner, seq: 0 }
    }

    /// Decode the next record
    ///
    /// Returns `Ok(None)` at a clean end of input and
    /// [`TraceError::Truncated`] when the input stops inside a record.
    pub fn next_event(&mut self) -> TraceResult<Option<Event>> {
        let mut buf = [0u8; RECORD_BYTES];
        let mut filled = 0;
        while filled < RECORD_BYTES {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Ok(None),
            RECORD_BYTES => {
                let event = Event::decode(u64::from_le_bytes(buf), self.seq)?;
                self.seq += 1;
                Ok(Some(event))
            }
            bytes => Err(TraceError::Truncated {
                index: self.seq,
                bytes,
            }),
        }
    }

    /// Read up to `size` events
    ///
    /// Sequence numbers continue across calls.
    pub fn read_window(&mut self, size: usize) -> TraceResult<Vec<Event>> {
        let mut window = Vec::with_capacity(size.min(1 << 16));
        while window.len() < size {
            match self.next_event()? {
                Some(event) => window.push(event),
                None => break,
            }
        }
        Ok(window)
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = TraceResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl<R: Read> WindowSource for TraceReader<R> {
    fn next_window(&mut self, size: usize) -> TraceResult<Vec<Event>> {
        self.read_window(size)
    }
}

/// Record writer
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    inner: W,
    written: usize,
}

impl TraceWriter<BufWriter<File>> {
    /// Create (or truncate) a trace file
    pub fn create(path: impl AsRef<Path>) -> TraceResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TraceWriter<W> {
    /// Wrap a byte sink
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Append one record
    pub fn write_event(&mut self, event: &Event) -> TraceResult<()> {
        self.inner.write_all(&event.encode().to_le_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> TraceResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Whole trace split per thread, with dense thread ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrace {
    /// `events[t]` is thread `t`'s program order
    pub events: Vec<Vec<Event>>,
    /// `raw_ids[t]` is the thread id recorded in the file for dense id `t`
    pub raw_ids: Vec<u32>,
}

impl ParsedTrace {
    /// Total number of events
    pub fn len(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }

    /// Returns true if the trace has no events
    pub fn is_empty(&self) -> bool {
        self.events.iter().all(Vec::is_empty)
    }
}

/// Raw → dense thread id table, local to one parse
#[derive(Debug, Default)]
struct ThreadTable {
    dense: HashMap<u32, ThreadId>,
    raw: Vec<u32>,
}

impl ThreadTable {
    fn intern(&mut self, raw: u32) -> TraceResult<ThreadId> {
        if let Some(&id) = self.dense.get(&raw) {
            return Ok(id);
        }
        if self.raw.len() >= MAX_THREADS {
            return Err(TraceError::TooManyThreads { max: MAX_THREADS });
        }

        let id = ThreadId(self.raw.len() as u32);
        self.dense.insert(raw, id);
        self.raw.push(raw);
        Ok(id)
    }
}

/// Read a whole binary trace from `reader`
pub fn parse_reader<R: Read>(reader: R) -> TraceResult<ParsedTrace> {
    let mut table = ThreadTable::default();
    let mut events: Vec<Vec<Event>> = Vec::new();

    for event in TraceReader::new(reader) {
        let event = event?;
        let thread = table.intern(event.thread().0)?;
        let mut event = event.with_thread(thread);

        if matches!(event.kind(), EventKind::Fork | EventKind::Join) {
            let target = table.intern(event.var())?;
            event = event.with_var(target.0);
        }

        if events.len() < table.raw.len() {
            events.resize_with(table.raw.len(), Vec::new);
        }
        events[thread.as_index()].push(event);
    }
    events.resize_with(table.raw.len(), Vec::new);

    debug!(
        threads = events.len(),
        events = events.iter().map(Vec::len).sum::<usize>(),
        "trace parsed"
    );
    Ok(ParsedTrace {
        events,
        raw_ids: table.raw,
    })
}

/// Read a whole binary trace file
pub fn parse_trace(path: impl AsRef<Path>) -> TraceResult<ParsedTrace> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TraceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reader(BufReader::new(file))
}

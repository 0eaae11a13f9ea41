//! Text → Binary Trace Conversion
//!
//! Input lines look like:
//!
//! ```text
//! Write 0 counter 1
//! Acq   1 mutex   0
//! Fork  0 1       0
//! ```
//!
//! `<kind> <thread> <name> <value>`, whitespace separated. Variable and lock
//! names get dense ids from two separate tables, in order of first use. Fork
//! and Join name the target thread numerically; Begin and End ignore the
//! name.

use super::binary::TraceWriter;
use crate::domain::event::{Event, EventKind, ThreadId, VarId};
use crate::error::{TraceError, TraceResult};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Converter state: the name tables of one conversion
#[derive(Debug, Default)]
pub struct TextConverter {
    vars: HashMap<String, VarId>,
    locks: HashMap<String, VarId>,
}

fn parse_kind(mnemonic: &str) -> Option<EventKind> {
    Some(match mnemonic {
        "Read" => EventKind::Read,
        "Write" => EventKind::Write,
        "Acq" => EventKind::Acquire,
        "Rel" => EventKind::Release,
        "Begin" => EventKind::Begin,
        "End" => EventKind::End,
        "Fork" => EventKind::Fork,
        "Join" => EventKind::Join,
        _ => return None,
    })
}

fn intern(table: &mut HashMap<String, VarId>, name: &str) -> VarId {
    let next = table.len() as VarId;
    *table.entry(name.to_owned()).or_insert(next)
}

impl TextConverter {
    /// Fresh converter with empty name tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct variable names seen
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Number of distinct lock names seen
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Parse one line (1-based `line` for error messages)
    ///
    /// Blank lines yield `Ok(None)`.
    pub fn parse_line(&mut self, text: &str, line: usize, seq: u32) -> TraceResult<Option<Event>> {
        let mut fields = text.split_whitespace();
        let Some(mnemonic) = fields.next() else {
            return Ok(None);
        };

        let malformed = || TraceError::MalformedLine {
            line,
            content: text.to_owned(),
        };
        let (Some(thread), Some(name), Some(value)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        let kind = parse_kind(mnemonic).ok_or_else(|| TraceError::UnknownMnemonic {
            line,
            mnemonic: mnemonic.to_owned(),
        })?;
        let thread: u8 = thread.parse().map_err(|_| malformed())?;
        let value: u32 = value.parse().map_err(|_| malformed())?;

        let var = match kind {
            EventKind::Read | EventKind::Write => intern(&mut self.vars, name),
            EventKind::Acquire | EventKind::Release => intern(&mut self.locks, name),
            EventKind::Fork | EventKind::Join => {
                let target: u8 = name.parse().map_err(|_| malformed())?;
                VarId::from(target)
            }
            EventKind::Begin | EventKind::End => 0,
        };

        Ok(Some(Event::new(kind, ThreadId(u32::from(thread)), var, value, seq)))
    }

    /// Convert every line of `input`, returning the number of records written
    pub fn convert<R: BufRead, W: Write>(
        &mut self,
        input: R,
        writer: &mut TraceWriter<W>,
    ) -> TraceResult<usize> {
        let mut seq = 0u32;
        for (i, text) in input.lines().enumerate() {
            let text = text?;
            if let Some(event) = self.parse_line(&text, i + 1, seq)? {
                writer.write_event(&event)?;
                seq += 1;
            }
        }
        Ok(seq as usize)
    }
}

/// Convert `input` into `<output_dir>/<input file name>`
pub fn convert_file(input: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> TraceResult<PathBuf> {
    let input = input.as_ref();
    let file = File::open(input).map_err(|source| TraceError::Open {
        path: input.to_path_buf(),
        source,
    })?;

    let name = input.file_name().ok_or_else(|| {
        TraceError::InvalidConfig(format!("input path {} has no file name", input.display()))
    })?;
    let output = output_dir.as_ref().join(name);

    let mut writer = TraceWriter::create(&output)?;
    let mut converter = TextConverter::new();
    let records = converter.convert(BufReader::new(file), &mut writer)?;
    writer.finish()?;

    info!(
        input = %input.display(),
        output = %output.display(),
        records,
        vars = converter.var_count(),
        locks = converter.lock_count(),
        "trace converted"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::binary::parse_reader;

    #[test]
    fn test_separate_name_tables() {
        let mut converter = TextConverter::new();
        let x = converter.parse_line("Write 0 x 1", 1, 0).unwrap().unwrap();
        let m = converter.parse_line("Acq 0 m 0", 2, 1).unwrap().unwrap();
        let y = converter.parse_line("Read 1 y 0", 3, 2).unwrap().unwrap();
        let x2 = converter.parse_line("Read 1 x 1", 4, 3).unwrap().unwrap();

        assert_eq!((x.var(), m.var(), y.var(), x2.var()), (0, 0, 1, 0));
        assert_eq!(m.kind(), EventKind::Acquire);
        assert_eq!(converter.var_count(), 2);
        assert_eq!(converter.lock_count(), 1);
    }

    #[test]
    fn test_fork_and_begin_names() {
        let mut converter = TextConverter::new();
        let fork = converter.parse_line("Fork 0 3 0", 1, 0).unwrap().unwrap();
        let begin = converter.parse_line("Begin 3 anything 0", 2, 1).unwrap().unwrap();

        assert_eq!(fork.target_thread(), ThreadId(3));
        assert_eq!(begin.var(), 0);
        assert_eq!(converter.var_count(), 0);
    }

    #[test]
    fn test_errors_name_the_line() {
        let mut converter = TextConverter::new();
        assert!(converter.parse_line("   ", 1, 0).unwrap().is_none());

        let err = converter.parse_line("Write 0 x", 2, 0).unwrap_err();
        assert!(matches!(err, TraceError::MalformedLine { line: 2, .. }));

        let err = converter.parse_line("Fork 0 main 0", 3, 0).unwrap_err();
        assert!(matches!(err, TraceError::MalformedLine { line: 3, .. }));

        let err = converter.parse_line("Lock 0 m 0", 4, 0).unwrap_err();
        assert!(matches!(err, TraceError::UnknownMnemonic { line: 4, .. }));
    }

    #[test]
    fn test_convert_round_trips_through_reader() {
        let text = "Write 0 x 1\n\nAcq 1 m 0\nRead 1 x 1\nRel 1 m 0\n";
        let mut writer = TraceWriter::new(Vec::new());
        let count = TextConverter::new().convert(text.as_bytes(), &mut writer).unwrap();
        assert_eq!(count, 4);

        let bytes = writer.finish().unwrap();
        let parsed = parse_reader(bytes.as_slice()).unwrap();
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[1][1].kind(), EventKind::Read);
        assert_eq!(parsed.events[1][1].seq(), 2);
    }

    #[test]
    fn test_convert_file_names_output_after_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.txt");
        std::fs::write(&input, "Write 0 x 1\nWrite 1 x 2\n").unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let output = convert_file(&input, &out_dir).unwrap();
        assert_eq!(output, out_dir.join("small.txt"));
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 16);
    }
}

//! Infrastructure Layer - File Formats
//!
//! Everything that touches bytes on disk lives here; the domain layer only
//! ever sees decoded [`Event`](crate::domain::Event)s.
//!
//! # Responsibilities
//! - Binary trace records (read, write, whole-trace parse)
//! - Text → binary conversion
//! - Witness files for confirmed races

pub mod binary;
pub mod text;
pub mod witness;

pub use binary::{parse_reader, parse_trace, ParsedTrace, TraceReader, TraceWriter, RECORD_BYTES};
pub use text::{convert_file, TextConverter};
pub use witness::Witness;

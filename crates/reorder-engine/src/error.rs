//! Engine Error Types
//!
//! Failures that abort a run: unreadable or malformed trace input, converter
//! input that cannot be encoded, and configuration values the engine cannot
//! honour. Contract violations inside a search (for example an acquire with no
//! matching release) are not errors; they simply stop a branch from
//! progressing.

use std::path::PathBuf;

/// Errors produced while reading, converting or analysing a trace
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Input Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Trace file could not be opened
    #[error("failed to open trace file {path}: {source}")]
    Open {
        /// Path as given
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// The input ended in the middle of a record
    #[error("error parsing input at event {index}: truncated record ({bytes} of 8 bytes)")]
    Truncated {
        /// Record index
        index: u32,
        /// Bytes actually read
        bytes: usize,
    },

    /// A record carries an event kind outside the known set
    #[error("error parsing input at event {index}, raw event: {raw:#018x} (unknown kind {kind})")]
    UnknownKind {
        /// Record index
        index: u32,
        /// Whole record
        raw: u64,
        /// Kind bits
        kind: u8,
    },

    /// More distinct threads than the 8-bit thread field can address
    #[error("trace uses more than {max} distinct threads")]
    TooManyThreads {
        /// Addressable thread count
        max: usize,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Converter Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// A text trace line does not have the `<kind> <thread> <name> <value>` shape
    #[error("error parsing line {line}: {content:?}")]
    MalformedLine {
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// A text trace line names an event kind the converter does not know
    #[error("unknown event kind {mnemonic:?} on line {line}")]
    UnknownMnemonic {
        /// 1-based line number
        line: usize,
        /// Unrecognized kind word
        mnemonic: String,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Configuration Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used across the engine
pub type TraceResult<T> = Result<T, TraceError>;

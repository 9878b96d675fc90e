//! Error type shared by every reader, writer, resumer and enricher.

use thiserror::Error;

/// Errors raised by this crate.
///
/// I/O and low-level CSV failures are propagated unchanged; everything else
/// describes a contract violated by the data or by the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed row: wrong width, undecodable bytes, broken quoting.
    #[error("parse error{}: {reason}", fmt_cursor(.cursor))]
    Parse {
        /// Zero-based data-row index of the offending row, when known.
        cursor: Option<usize>,
        reason: String,
    },

    #[error("column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("cannot resolve column names: the table has no header")]
    NoHeaders,

    /// An existing output could not be used to compute a resume point.
    #[error("cannot resume: {0}")]
    Resume(String),

    #[error("expected {expected} additional cells but got {got}")]
    WriteArity { expected: usize, got: usize },

    #[error("the output has no fieldnames to write as a header")]
    EmptyHeader,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

fn fmt_cursor(cursor: &Option<usize>) -> String {
    match cursor {
        Some(i) => format!(" at row {i}"),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn parse(cursor: Option<usize>, reason: impl Into<String>) -> Self {
        Error::Parse {
            cursor,
            reason: reason.into(),
        }
    }

    pub(crate) fn column(column: impl ToString) -> Self {
        Error::ColumnNotFound {
            column: column.to_string(),
        }
    }

    pub(crate) fn resume(reason: impl Into<String>) -> Self {
        Error::Resume(reason.into())
    }

    /// Map a `csv` failure onto [`Error::Parse`] when it describes the data
    /// rather than the underlying stream.
    pub(crate) fn from_csv(err: csv::Error, cursor: Option<usize>) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            csv::ErrorKind::Utf8 { err, .. } => Error::parse(cursor, format!("invalid UTF-8: {err}")),
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => Error::parse(cursor, format!("expected {expected_len} cells but got {len}")),
            other => Error::parse(cursor, format!("{other:?}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

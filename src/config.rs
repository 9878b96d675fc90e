//! Dialect and session configuration.
//!
//! Every config struct is a plain value with public fields and a `Default`,
//! so callers can either build one with struct-update syntax or deserialize
//! it from JSON:
//!
//! ```
//! use rowflow::config::{Dialect, ReaderConfig};
//!
//! let config = ReaderConfig {
//!     dialect: Dialect::tsv(),
//!     prebuffer_bytes: Some(64 * 1024),
//!     ..Default::default()
//! };
//! assert_eq!(config.dialect.delimiter, b'\t');
//! ```
//!
//! A dialect is never inferred from the data: the same [`Dialect`] value
//! drives both parsing and serialization.

use serde::{Deserialize, Serialize};

/// Quoting policy applied when writing cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// Quote only cells containing the delimiter, the quote or a line break.
    #[default]
    Necessary,
    Always,
    /// Quote every cell that does not parse as a number.
    NonNumeric,
    Never,
}

impl From<QuoteStyle> for csv::QuoteStyle {
    fn from(style: QuoteStyle) -> Self {
        match style {
            QuoteStyle::Necessary => csv::QuoteStyle::Necessary,
            QuoteStyle::Always => csv::QuoteStyle::Always,
            QuoteStyle::NonNumeric => csv::QuoteStyle::NonNumeric,
            QuoteStyle::Never => csv::QuoteStyle::Never,
        }
    }
}

/// Line terminator emitted by writers. Readers accept both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    #[default]
    Lf,
    CrLf,
}

/// Delimited-text dialect shared by readers and writers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    /// Escape byte used instead of doubled quotes when `double_quote` is off.
    pub escape: Option<u8>,
    pub double_quote: bool,
    pub quoting: QuoteStyle,
    pub terminator: Terminator,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: None,
            double_quote: true,
            quoting: QuoteStyle::Necessary,
            terminator: Terminator::Lf,
        }
    }
}

impl Dialect {
    /// Tab-separated values.
    #[must_use]
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    /// Parser for this dialect. Headers and row widths are handled by
    /// [`Reader`](crate::Reader) itself, so the builder is headerless and
    /// flexible.
    pub(crate) fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .escape(self.escape)
            .double_quote(self.double_quote);
        builder
    }

    pub(crate) fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .quote_style(self.quoting.into())
            .terminator(match self.terminator {
                Terminator::Lf => csv::Terminator::Any(b'\n'),
                Terminator::CrLf => csv::Terminator::CRLF,
            });
        if let Some(escape) = self.escape {
            builder.escape(escape);
        }
        builder
    }
}

/// Expand one row into several by splitting a multi-valued cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiplexer {
    /// Column to split: a header name, or a decimal position for headerless input.
    pub column: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Optional new name for the multiplexed column.
    #[serde(default)]
    pub new_column: Option<String>,
}

fn default_separator() -> String {
    "|".to_string()
}

impl Multiplexer {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            separator: default_separator(),
            new_column: None,
        }
    }

    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    #[must_use]
    pub fn rename(mut self, new_column: impl Into<String>) -> Self {
        self.new_column = Some(new_column.into());
        self
    }
}

/// Options for [`Reader`](crate::Reader).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub dialect: Dialect,
    /// When false, the first line is data and columns are addressed by position.
    pub has_headers: bool,
    /// Read ahead this many bytes of rows to estimate the total row count.
    pub prebuffer_bytes: Option<usize>,
    /// Total number of rows, when already known by the caller.
    pub total: Option<usize>,
    pub multiplex: Option<Multiplexer>,
    pub strip_null_bytes: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            has_headers: true,
            prebuffer_bytes: None,
            total: None,
            multiplex: None,
            strip_null_bytes: false,
        }
    }
}

impl ReaderConfig {
    #[must_use]
    pub fn headerless() -> Self {
        Self {
            has_headers: false,
            ..Self::default()
        }
    }
}

/// Options for [`Writer`](crate::Writer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub dialect: Dialect,
    /// Emit the header before the first row. Ignored when appending to a
    /// non-empty file.
    pub write_header: bool,
    /// Append to an existing file instead of truncating it.
    pub append: bool,
    pub strip_null_bytes: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            write_header: true,
            append: false,
            strip_null_bytes: false,
        }
    }
}

//! Enrichment sessions: read an input table, write an output table made of
//! some input columns followed by new ones.
//!
//! ```no_run
//! use rowflow::{Enricher, EnricherConfig, RowCountResumer};
//!
//! # fn main() -> rowflow::Result<()> {
//! let config = EnricherConfig::default().select(["name"]).add(["length"]);
//! let mut enricher =
//!     Enricher::with_resumer("people.csv", RowCountResumer::new("out.csv"), config)?;
//! while let Some(row) = enricher.next() {
//!     let row = row?;
//!     let length = row[0].len().to_string();
//!     enricher.writerow(&row, &[length])?;
//! }
//! enricher.finish()
//! # }
//! ```
//!
//! Three flavours share the same [`Projection`]:
//!
//! - [`Enricher`]: one output row per input row, in input order.
//! - [`ThreadSafeEnricher`]: rows tagged with their input cursor, written
//!   from any thread in any order.
//! - [`BatchEnricher`]: any number of output rows per input row, produced
//!   page by page.

pub mod batch;
pub mod threadsafe;

pub use batch::BatchEnricher;
pub use threadsafe::{IndexedSink, ThreadSafeEnricher};

use crate::Row;
use crate::config::{ReaderConfig, WriterConfig};
use crate::error::{Error, Result};
use crate::headers::ColumnRef;
use crate::io::Source;
use crate::reader::Reader;
use crate::resumers::{OrderedResumer, OutputContext, ResumePhase, ResumeState};
use crate::writer::Writer;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Options shared by every enricher.
#[derive(Clone, Debug)]
pub struct EnricherConfig {
    pub reader: ReaderConfig,
    pub writer: WriterConfig,
    /// Input columns kept in the output, in this order. `None` keeps all.
    pub select: Option<Vec<ColumnRef>>,
    /// Names of the columns appended after the selected ones.
    pub add: Vec<String>,
    /// Leading column of [`ThreadSafeEnricher`] output.
    pub index_column: String,
    /// Trailing column of [`BatchEnricher`] output.
    pub cursor_column: String,
    /// Cursor cell marking the last row of a finished input row.
    pub end_marker: String,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            writer: WriterConfig::default(),
            select: None,
            add: Vec::new(),
            index_column: "index".to_string(),
            cursor_column: "cursor".to_string(),
            end_marker: "end".to_string(),
        }
    }
}

impl EnricherConfig {
    #[must_use]
    pub fn select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnRef>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn add<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn reader(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    #[must_use]
    pub fn index_column(mut self, name: impl Into<String>) -> Self {
        self.index_column = name.into();
        self
    }

    #[must_use]
    pub fn cursor_column(mut self, name: impl Into<String>) -> Self {
        self.cursor_column = name.into();
        self
    }

    #[must_use]
    pub fn end_marker(mut self, marker: impl Into<String>) -> Self {
        self.end_marker = marker.into();
        self
    }
}

/// How an input row and its new cells become an output row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    selected: Option<Vec<usize>>,
    add_len: usize,
    fieldnames: Option<Vec<String>>,
}

impl Projection {
    /// Resolve `select` against the reader's header.
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`] for an unknown selected column.
    pub fn new(reader: &Reader, select: Option<&[ColumnRef]>, add: &[String]) -> Result<Self> {
        let selected = select
            .map(|columns| columns.iter().map(|c| reader.resolve(c)).collect::<Result<Vec<_>>>())
            .transpose()?;

        let fieldnames = reader.headers().map(|headers| {
            let kept: Vec<String> = match &selected {
                Some(positions) => positions
                    .iter()
                    .filter_map(|&p| headers.name(p).map(str::to_string))
                    .collect(),
                None => headers.fieldnames().to_vec(),
            };
            kept.into_iter().chain(add.iter().cloned()).collect()
        });

        Ok(Self {
            selected,
            add_len: add.len(),
            fieldnames,
        })
    }

    /// Output header, `None` for headerless input.
    #[must_use]
    pub fn fieldnames(&self) -> Option<&[String]> {
        self.fieldnames.as_deref()
    }

    #[must_use]
    pub fn add_len(&self) -> usize {
        self.add_len
    }

    /// # Errors
    /// [`Error::WriteArity`] when `add` does not match the added columns.
    pub fn format_row<S: AsRef<str>>(&self, row: &[String], add: &[S]) -> Result<Row> {
        let mut out = Vec::new();
        self.extend_row(&mut out, row, add)?;
        Ok(out)
    }

    pub(crate) fn extend_row<S: AsRef<str>>(&self, out: &mut Row, row: &[String], add: &[S]) -> Result<()> {
        if add.len() != self.add_len {
            return Err(Error::WriteArity {
                expected: self.add_len,
                got: add.len(),
            });
        }
        match &self.selected {
            Some(positions) => {
                out.reserve(positions.len() + add.len());
                for &p in positions {
                    let cell = row.get(p).ok_or_else(|| Error::column(ColumnRef::Position(p)))?;
                    out.push(cell.clone());
                }
            }
            None => {
                out.reserve(row.len() + add.len());
                out.extend_from_slice(row);
            }
        }
        out.extend(add.iter().map(|cell| cell.as_ref().to_string()));
        Ok(())
    }
}

/// Open the writer of an enrichment, either over a fresh path or through a
/// resumer's output file.
pub(crate) fn open_writer(
    output: &Path,
    fieldnames: Option<&[String]>,
    config: &WriterConfig,
) -> Result<Writer> {
    match fieldnames {
        Some(names) => Writer::create(output, names.iter().cloned(), config.clone()),
        None => Writer::create_headerless(output, config.clone()),
    }
}

pub(crate) fn resumed_writer(
    file: std::fs::File,
    fieldnames: Option<&[String]>,
    config: &WriterConfig,
    has_data: bool,
) -> Result<Writer> {
    let sink: Box<dyn Write + Send> = Box::new(BufWriter::new(file));
    Writer::from_parts(sink, fieldnames.map(<[String]>::to_vec), config, has_data)
}

/// Ordered enrichment: exactly one output row per input row, in input order.
///
/// Iterating yields the input rows still to process. Because the enricher
/// owns both ends, drive it with `while let Some(row) = enricher.next()` so
/// that [`writerow`](Self::writerow) can be called inside the loop.
#[derive(Debug)]
pub struct Enricher {
    reader: Reader,
    writer: Writer,
    projection: Projection,
    state: ResumeState,
    skipped: usize,
}

impl Enricher {
    /// Start a fresh enrichment, truncating `output`.
    ///
    /// # Errors
    /// I/O failures, an unreadable input header, unknown selected columns.
    pub fn new(input: impl Into<Source>, output: impl AsRef<Path>, config: EnricherConfig) -> Result<Self> {
        let reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let writer = open_writer(output.as_ref(), projection.fieldnames(), &config.writer)?;
        Ok(Self {
            reader,
            writer,
            projection,
            state: ResumeState::Fresh,
            skipped: 0,
        })
    }

    /// Enrich into an arbitrary sink, assumed empty.
    ///
    /// # Errors
    /// See [`Enricher::new`].
    pub fn from_writer<W>(input: impl Into<Source>, sink: W, config: EnricherConfig) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let writer = Writer::from_parts(
            Box::new(sink),
            projection.fieldnames().map(<[String]>::to_vec),
            &config.writer,
            false,
        )?;
        Ok(Self {
            reader,
            writer,
            projection,
            state: ResumeState::Fresh,
            skipped: 0,
        })
    }

    /// Resume an enrichment whose output is owned by `resumer`.
    ///
    /// When the output already holds rows, the input rows they account for
    /// are consumed before this returns, and the output is reopened for
    /// appending without a second header.
    ///
    /// # Errors
    /// [`Error::Resume`] when the existing output cannot be interpreted,
    /// plus everything [`Enricher::new`] may return.
    pub fn with_resumer<R: OrderedResumer>(
        input: impl Into<Source>,
        mut resumer: R,
        config: EnricherConfig,
    ) -> Result<Self> {
        let has_headers = config.reader.has_headers;
        let mut reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;

        let can_resume = resumer.can_resume();
        let mut skipped = 0;
        if can_resume {
            let mut ctx = OutputContext::new(&config.writer.dialect);
            ctx.has_headers = has_headers;
            ctx.fieldnames = projection.fieldnames();
            resumer.inspect_output(&ctx)?;
            skipped = resumer.skip_input(&mut reader)?;
            info!(skipped, path = %resumer.target().path().display(), "resuming enrichment");
        }

        let file = resumer.target_mut().open_output()?;
        let writer = resumed_writer(file, projection.fieldnames(), &config.writer, can_resume)?;
        Ok(Self {
            reader,
            writer,
            projection,
            state: resumer.state(),
            skipped,
        })
    }

    /// Write the output row for `row`: its selected cells followed by `add`.
    ///
    /// # Errors
    /// [`Error::WriteArity`] when `add` does not match the added columns,
    /// I/O failures of the output.
    pub fn writerow<S: AsRef<str>>(&mut self, row: &[String], add: &[S]) -> Result<()> {
        let out = self.projection.format_row(row, add)?;
        self.writer.writerow(&out)
    }

    #[must_use]
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    /// Direct access to the input, for `cells`, `enumerate` and friends.
    /// Cursors keep counting the rows skipped on resume.
    pub fn reader_mut(&mut self) -> &mut Reader {
        &mut self.reader
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    #[must_use]
    pub fn output_fieldnames(&self) -> Option<&[String]> {
        self.projection.fieldnames()
    }

    #[must_use]
    pub fn resume_state(&self) -> &ResumeState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> ResumePhase {
        self.state.phase(self.reader.total())
    }

    /// Input rows skipped because the output already covered them.
    #[must_use]
    pub fn already_done_count(&self) -> usize {
        self.skipped
    }

    /// # Errors
    /// I/O failures of the output.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// Flush and close the output.
    ///
    /// # Errors
    /// I/O failures of the final flush.
    pub fn finish(self) -> Result<()> {
        self.writer.finish()
    }
}

impl Iterator for Enricher {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next()
    }
}

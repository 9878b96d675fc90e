//! Resume strategies.
//!
//! A resumer owns the path of an output that a previous, interrupted run
//! may have started. Before the new run writes anything, the resumer reads
//! what is already there and turns it into a [`ResumeState`]; the enricher
//! then skips the matching input and the output file is reopened in append
//! mode, so the header is not repeated.
//!
//! | Resumer | Reads | Works with |
//! |---|---|---|
//! | [`BasicResumer`] | nothing | [`Writer`](crate::Writer) |
//! | [`LastCellResumer`] | last output row | [`Writer`](crate::Writer) |
//! | [`RowCountResumer`] | every output row, counted | [`Enricher`](crate::Enricher) |
//! | [`LastCellComparisonResumer`] | last output row, then the input until it matches | [`Enricher`](crate::Enricher) |
//! | [`IndexedResumer`] | index column of every output row | [`ThreadSafeEnricher`](crate::ThreadSafeEnricher) |
//! | [`BatchResumer`] | trailing rows of the last input row | [`BatchEnricher`](crate::BatchEnricher) |
//!
//! An output that exists but cannot be interpreted (bad header, missing
//! column, unparseable index) is an [`Error::Resume`]: starting over would
//! silently duplicate work.

use crate::Row;
use crate::config::{Dialect, ReaderConfig};
use crate::error::{Error, Result};
use crate::headers::ColumnRef;
use crate::range_set::ContiguousRangeSet;
use crate::reader::Reader;
use crate::reverse_reader::{Batch, ReverseReader};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Progress notifications sent to a resumer's listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeEvent<'a> {
    /// A row of the existing output was read while computing the state.
    OutputRowRead(&'a Row),
    /// An input row was skipped because the output already covers it.
    InputRowSkipped(&'a Row),
}

pub type Listener = Arc<dyn Fn(ResumeEvent<'_>) + Send + Sync>;

/// What a resumer learned from an existing output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeState {
    /// No usable prior output.
    Fresh,
    /// Number of leading input rows already processed.
    RowCount(usize),
    /// Cursors of the input rows already processed, in any order.
    Indexed(ContiguousRangeSet),
    /// Designated cell of the last output row.
    LastCell(Option<String>),
    /// Trail of the last input row of a paginated output.
    Batch(Batch),
}

/// Lifecycle of a resumed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePhase {
    Fresh,
    Resuming,
    /// The output already covers the whole input. Only detectable when the
    /// input length is known.
    Exhausted,
}

impl ResumeState {
    #[must_use]
    pub fn phase(&self, total: Option<usize>) -> ResumePhase {
        let done = match self {
            ResumeState::Fresh | ResumeState::LastCell(None) => return ResumePhase::Fresh,
            ResumeState::RowCount(0) => return ResumePhase::Fresh,
            ResumeState::Indexed(set) if set.is_empty() => return ResumePhase::Fresh,
            ResumeState::RowCount(n) => *n,
            ResumeState::Indexed(set) => set.leading_count(),
            ResumeState::LastCell(Some(_)) | ResumeState::Batch(_) => {
                return ResumePhase::Resuming;
            }
        };
        match total {
            Some(total) if done >= total => ResumePhase::Exhausted,
            _ => ResumePhase::Resuming,
        }
    }
}

/// Layout of the output an enricher is about to resume.
#[derive(Clone, Copy, Debug)]
pub struct OutputContext<'a> {
    pub dialect: &'a Dialect,
    /// Whether the output starts with a header row. Mirrors the input.
    pub has_headers: bool,
    /// Expected header of the output, checked when known.
    pub fieldnames: Option<&'a [String]>,
    pub index_column: Option<&'a str>,
    pub cursor_column: Option<&'a str>,
    pub end_marker: Option<&'a str>,
}

impl<'a> OutputContext<'a> {
    #[must_use]
    pub fn new(dialect: &'a Dialect) -> Self {
        Self {
            dialect,
            has_headers: true,
            fieldnames: None,
            index_column: None,
            cursor_column: None,
            end_marker: None,
        }
    }
}

/// The output path shared by every resumer, and the file handle opened on it.
pub struct ResumeTarget {
    path: PathBuf,
    listener: Option<Listener>,
    opened: bool,
}

impl ResumeTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listener: None,
            opened: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a non-empty output already exists.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.path.metadata().is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    pub fn set_listener(&mut self, listener: Listener) {
        self.listener = Some(listener);
    }

    pub(crate) fn listener(&self) -> Option<Listener> {
        self.listener.clone()
    }

    pub(crate) fn emit(&self, event: ResumeEvent<'_>) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }

    /// Open the output: appending when it can be resumed, truncating otherwise.
    ///
    /// # Errors
    /// [`Error::Resume`] when already opened, I/O failures otherwise.
    pub fn open_output(&mut self) -> Result<File> {
        if self.opened {
            return Err(Error::resume("output file is already opened"));
        }
        let append = self.can_resume();
        let file = if append {
            OpenOptions::new().append(true).open(&self.path)
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
        }
        .map_err(|e| crate::io::source::annotate(e, &self.path))?;
        self.opened = true;
        debug!(path = %self.path.display(), append, "opened resumable output");
        Ok(file)
    }

    /// Forward reader over the existing output.
    fn read_output(&self, ctx: &OutputContext<'_>) -> Result<Reader> {
        let config = ReaderConfig {
            dialect: ctx.dialect.clone(),
            has_headers: ctx.has_headers,
            ..Default::default()
        };
        let reader = Reader::new(self.path.as_path(), config).map_err(malformed)?;
        if let (Some(expected), Some(found)) = (ctx.fieldnames, reader.fieldnames())
            && expected != found
        {
            return Err(Error::resume(format!(
                "output header {found:?} does not match expected {expected:?}"
            )));
        }
        Ok(reader)
    }
}

impl fmt::Debug for ResumeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeTarget")
            .field("path", &self.path)
            .field("can_resume", &self.can_resume())
            .finish_non_exhaustive()
    }
}

/// Turn data errors met in an existing output into [`Error::Resume`].
fn malformed(err: Error) -> Error {
    match err {
        Error::Io(_) | Error::Resume(_) => err,
        other => Error::resume(format!("malformed output: {other}")),
    }
}

/// Shared shape of every resume strategy.
pub trait Resumer {
    fn target(&self) -> &ResumeTarget;

    fn target_mut(&mut self) -> &mut ResumeTarget;

    /// Read the existing output and compute the state. Only called when
    /// [`ResumeTarget::can_resume`] holds.
    ///
    /// # Errors
    /// [`Error::Resume`] when the output cannot be interpreted.
    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()>;

    fn state(&self) -> ResumeState;

    /// Number of input rows known to be done.
    fn already_done_count(&self) -> usize;

    fn can_resume(&self) -> bool {
        self.target().can_resume()
    }

    fn set_listener(&mut self, listener: Listener) {
        self.target_mut().set_listener(listener);
    }
}

/// Resumers a plain [`Writer`](crate::Writer) accepts.
pub trait WriterResumer: Resumer {}

/// Resumers an ordered [`Enricher`](crate::Enricher) accepts: one output
/// row per input row, written in input order.
pub trait OrderedResumer: Resumer {
    /// Consume the input rows the output already covers. Returns how many
    /// were skipped.
    ///
    /// # Errors
    /// Parse errors of the input, or [`Error::Resume`] when the input does
    /// not agree with the output.
    fn skip_input(&mut self, reader: &mut Reader) -> Result<usize>;
}

macro_rules! resumer_target {
    () => {
        fn target(&self) -> &ResumeTarget {
            &self.target
        }

        fn target_mut(&mut self) -> &mut ResumeTarget {
            &mut self.target
        }
    };
}

/// Appends to an existing output without reading it.
#[derive(Debug)]
pub struct BasicResumer {
    target: ResumeTarget,
}

impl BasicResumer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: ResumeTarget::new(path),
        }
    }
}

impl Resumer for BasicResumer {
    resumer_target!();

    fn inspect_output(&mut self, _ctx: &OutputContext<'_>) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> ResumeState {
        ResumeState::Fresh
    }

    fn already_done_count(&self) -> usize {
        0
    }
}

impl WriterResumer for BasicResumer {}

/// Counts the rows of the output: that many input rows are done.
#[derive(Debug)]
pub struct RowCountResumer {
    target: ResumeTarget,
    row_count: usize,
}

impl RowCountResumer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: ResumeTarget::new(path),
            row_count: 0,
        }
    }
}

impl Resumer for RowCountResumer {
    resumer_target!();

    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()> {
        let mut reader = self.target.read_output(ctx)?;
        let mut count = 0;
        while let Some(row) = reader.next() {
            let row = row.map_err(malformed)?;
            self.target.emit(ResumeEvent::OutputRowRead(&row));
            count += 1;
        }
        self.row_count = count;
        info!(rows = count, path = %self.target.path.display(), "counted rows of existing output");
        Ok(())
    }

    fn state(&self) -> ResumeState {
        ResumeState::RowCount(self.row_count)
    }

    fn already_done_count(&self) -> usize {
        self.row_count
    }
}

impl OrderedResumer for RowCountResumer {
    fn skip_input(&mut self, reader: &mut Reader) -> Result<usize> {
        let target = &self.target;
        let skipped = reader.skip_rows(self.row_count, |row| {
            target.emit(ResumeEvent::InputRowSkipped(row));
        })?;
        if skipped < self.row_count {
            return Err(Error::resume(format!(
                "output holds {} rows but the input only {skipped}",
                self.row_count
            )));
        }
        Ok(skipped)
    }
}

/// Reads the index column of an out-of-order output into a
/// [`ContiguousRangeSet`] of finished input cursors.
#[derive(Debug)]
pub struct IndexedResumer {
    target: ResumeTarget,
    done: ContiguousRangeSet,
}

impl IndexedResumer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            target: ResumeTarget::new(path),
            done: ContiguousRangeSet::new(),
        }
    }

    pub(crate) fn take_done(&mut self) -> ContiguousRangeSet {
        std::mem::take(&mut self.done)
    }
}

impl Resumer for IndexedResumer {
    resumer_target!();

    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()> {
        let index_column = ctx
            .index_column
            .ok_or_else(|| Error::resume("no index column configured"))?;
        let mut reader = self.target.read_output(ctx)?;
        // Headerless outputs carry the index in their first cell.
        let pos = if ctx.has_headers {
            reader
                .headers()
                .and_then(|h| h.get(index_column))
                .ok_or_else(|| Error::resume(format!("output has no {index_column:?} column")))?
        } else {
            0
        };

        let mut done = ContiguousRangeSet::new();
        while let Some(row) = reader.next() {
            let row = row.map_err(malformed)?;
            self.target.emit(ResumeEvent::OutputRowRead(&row));
            let index: usize = row[pos].parse().map_err(|_| {
                Error::resume(format!("corrupted index column: {:?} is not a row index", row[pos]))
            })?;
            done.insert(index);
        }
        info!(
            done = done.len(),
            holes = done.interval_count().saturating_sub(1),
            leading = done.leading_count(),
            "indexed existing output"
        );
        self.done = done;
        Ok(())
    }

    fn state(&self) -> ResumeState {
        ResumeState::Indexed(self.done.clone())
    }

    fn already_done_count(&self) -> usize {
        self.done.len()
    }
}

/// Reads the designated cell of the last output row, for append-only
/// continuation.
#[derive(Debug)]
pub struct LastCellResumer {
    target: ResumeTarget,
    value_column: ColumnRef,
    last_cell: Option<String>,
}

impl LastCellResumer {
    /// `value_column` is a name, or a position for headerless outputs.
    pub fn new(path: impl Into<PathBuf>, value_column: impl Into<ColumnRef>) -> Self {
        Self {
            target: ResumeTarget::new(path),
            value_column: value_column.into(),
            last_cell: None,
        }
    }

    #[must_use]
    pub fn last_cell(&self) -> Option<&str> {
        self.last_cell.as_deref()
    }
}

impl Resumer for LastCellResumer {
    resumer_target!();

    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()> {
        self.last_cell = ReverseReader::last_cell_with(
            &self.target.path,
            self.value_column.clone(),
            ctx.dialect,
            ctx.has_headers,
        )
        .map_err(|err| match err {
            Error::ColumnNotFound { column } => {
                Error::resume(format!("output has no {column:?} column"))
            }
            other => malformed(other),
        })?;
        info!(last_cell = ?self.last_cell, "read last cell of existing output");
        Ok(())
    }

    fn state(&self) -> ResumeState {
        ResumeState::LastCell(self.last_cell.clone())
    }

    fn already_done_count(&self) -> usize {
        0
    }
}

impl WriterResumer for LastCellResumer {}

/// Reads the designated cell of the last output row, then skips input rows
/// up to and including the one holding that value.
///
/// Values of the designated column must be unique across the input.
#[derive(Debug)]
pub struct LastCellComparisonResumer {
    inner: LastCellResumer,
    skipped: usize,
}

impl LastCellComparisonResumer {
    pub fn new(path: impl Into<PathBuf>, value_column: impl Into<ColumnRef>) -> Self {
        Self {
            inner: LastCellResumer::new(path, value_column),
            skipped: 0,
        }
    }
}

impl Resumer for LastCellComparisonResumer {
    fn target(&self) -> &ResumeTarget {
        &self.inner.target
    }

    fn target_mut(&mut self) -> &mut ResumeTarget {
        &mut self.inner.target
    }

    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()> {
        self.inner.inspect_output(ctx)
    }

    fn state(&self) -> ResumeState {
        self.inner.state()
    }

    fn already_done_count(&self) -> usize {
        self.skipped
    }
}

impl OrderedResumer for LastCellComparisonResumer {
    fn skip_input(&mut self, reader: &mut Reader) -> Result<usize> {
        let Some(last) = self.inner.last_cell.clone() else {
            return Ok(0);
        };
        let pos = reader.resolve(&self.inner.value_column)?;
        let mut skipped = 0;
        while let Some(row) = reader.next() {
            let row = row?;
            self.inner.target.emit(ResumeEvent::InputRowSkipped(&row));
            skipped += 1;
            if row[pos] == last {
                self.skipped = skipped;
                return Ok(skipped);
            }
        }
        Err(Error::resume(format!(
            "last output value {last:?} not found in the input"
        )))
    }
}

/// Where a paginated input row should pick up again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResume {
    /// Cursor to continue pagination from; `None` restarts the row.
    pub cursor: Option<String>,
}

/// Follows the cursor/end-marker trail of a paginated output.
///
/// `value_column` identifies input rows and must be unique across the
/// input and kept in the output.
#[derive(Debug)]
pub struct BatchResumer {
    target: ResumeTarget,
    value_column: String,
    last_batch: Option<Batch>,
    read_count: usize,
}

impl BatchResumer {
    pub fn new(path: impl Into<PathBuf>, value_column: impl Into<String>) -> Self {
        Self {
            target: ResumeTarget::new(path),
            value_column: value_column.into(),
            last_batch: None,
            read_count: 0,
        }
    }

    #[must_use]
    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    /// Skip fully processed input rows. When the last input row was cut
    /// short, it is left unconsumed and its resume point is returned.
    ///
    /// # Errors
    /// Input parse errors, or [`Error::Resume`] when the input runs out
    /// before the recorded value shows up.
    pub(crate) fn skip_input(&mut self, reader: &mut Reader) -> Result<Option<BatchResume>> {
        let Some(batch) = self.last_batch.take() else {
            return Ok(None);
        };
        let pos = reader.resolve(&self.value_column.as_str().into())?;

        loop {
            let matches = match reader.peek()? {
                Some(row) => row[pos] == batch.value,
                None => {
                    return Err(Error::resume(format!(
                        "input ran out before reaching {:?}",
                        batch.value
                    )));
                }
            };

            if !matches || batch.finished {
                if let Some(row) = reader.next().transpose()? {
                    self.target.emit(ResumeEvent::InputRowSkipped(&row));
                }
                self.read_count += 1;
                if matches {
                    return Ok(None);
                }
                continue;
            }
            info!(value = %batch.value, cursor = ?batch.cursor, "resuming paginated row");
            return Ok(Some(BatchResume {
                cursor: batch.cursor,
            }));
        }
    }
}

impl Resumer for BatchResumer {
    resumer_target!();

    fn inspect_output(&mut self, ctx: &OutputContext<'_>) -> Result<()> {
        let cursor_column = ctx
            .cursor_column
            .ok_or_else(|| Error::resume("no cursor column configured"))?;
        let end_marker = ctx
            .end_marker
            .ok_or_else(|| Error::resume("no end marker configured"))?;
        self.last_batch = ReverseReader::last_batch(
            &self.target.path,
            &self.value_column,
            cursor_column,
            end_marker,
            ctx.dialect,
        )
        .map_err(|err| match err {
            Error::ColumnNotFound { column } => {
                Error::resume(format!("output has no {column:?} column"))
            }
            other => malformed(other),
        })?;
        debug!(batch = ?self.last_batch, "read last batch of existing output");
        Ok(())
    }

    fn state(&self) -> ResumeState {
        self.last_batch
            .clone()
            .map_or(ResumeState::Fresh, ResumeState::Batch)
    }

    fn already_done_count(&self) -> usize {
        self.read_count
    }
}

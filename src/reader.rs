//! Streaming table reader.
//!
//! A [`Reader`] yields rows as plain `Vec<String>` and keeps the header on
//! the side as a [`HeaderIndex`], so no per-row map is ever built. Named
//! access is available on demand through [`Reader::wrap`].
//!
//! ```no_run
//! use rowflow::{Reader, ReaderConfig};
//!
//! # fn main() -> rowflow::Result<()> {
//! let mut reader = Reader::new("people.csv", ReaderConfig::default())?;
//! for name in reader.cells("name")? {
//!     println!("{}", name?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every data row is checked against the header width; a mismatch ends the
//! stream with [`Error::Parse`] carrying the offending row's index.

use crate::Row;
use crate::config::{Multiplexer, ReaderConfig};
use crate::error::{Error, Result};
use crate::headers::{ColumnRef, HeaderIndex, RowView};
use crate::io::source::{Opened, Source};
use std::collections::VecDeque;
use std::io::Read;
use tracing::debug;

/// Approximate serialized size of a row: its cells, delimiters and terminator.
#[must_use]
pub fn row_bytes(row: &[String]) -> usize {
    row.iter().map(String::len).sum::<usize>() + row.len().max(1)
}

enum RowStream {
    Csv {
        inner: csv::Reader<Box<dyn Read>>,
        record: csv::StringRecord,
    },
    Rows(Box<dyn Iterator<Item = Row>>),
}

impl RowStream {
    /// `cursor` labels parse errors; `None` for the header row.
    fn next_row(&mut self, cursor: Option<usize>) -> Option<Result<Row>> {
        match self {
            RowStream::Csv { inner, record } => match inner.read_record(record) {
                Ok(true) => Some(Ok(record.iter().map(str::to_string).collect())),
                Ok(false) => None,
                Err(err) => Some(Err(Error::from_csv(err, cursor))),
            },
            RowStream::Rows(rows) => rows.next().map(Ok),
        }
    }
}

struct MultiplexState {
    pos: usize,
    separator: String,
    pending: VecDeque<Row>,
}

impl MultiplexState {
    /// Queue the rows produced by `row`: itself when the target cell holds a
    /// single value, one copy per part otherwise, none for an empty cell.
    fn expand(&mut self, row: Row) {
        let cell = &row[self.pos];
        if cell.is_empty() {
            return;
        }
        if !cell.contains(self.separator.as_str()) {
            self.pending.push_back(row);
            return;
        }
        let parts: Vec<String> = cell.split(self.separator.as_str()).map(str::to_string).collect();
        for part in parts {
            let mut copy = row.clone();
            copy[self.pos] = part;
            self.pending.push_back(copy);
        }
    }
}

/// Reads rows from a [`Source`].
pub struct Reader {
    stream: RowStream,
    headers: Option<HeaderIndex>,
    row_len: usize,
    empty: bool,
    multiplex: Option<MultiplexState>,
    buffered: VecDeque<Row>,
    deferred_error: Option<Error>,
    peeked: Option<Option<Row>>,
    raw_index: usize,
    consumed: usize,
    total: Option<usize>,
    was_completely_buffered: bool,
    done: bool,
}

impl Reader {
    /// Open `source` and parse its header (unless configured headerless).
    ///
    /// # Errors
    /// I/O failures, an undecodable header, a multiplexed column that does not
    /// exist, or a parse error met while prebuffering.
    pub fn new(source: impl Into<Source>, config: ReaderConfig) -> Result<Self> {
        let stream = match source.into().open(config.strip_null_bytes)? {
            Opened::Bytes(bytes) => RowStream::Csv {
                inner: config.dialect.reader_builder().from_reader(bytes),
                record: csv::StringRecord::new(),
            },
            Opened::Rows(rows) => RowStream::Rows(rows),
        };

        let mut reader = Reader {
            stream,
            headers: None,
            row_len: 0,
            empty: false,
            multiplex: None,
            buffered: VecDeque::new(),
            deferred_error: None,
            peeked: None,
            raw_index: 0,
            consumed: 0,
            total: config.total,
            was_completely_buffered: false,
            done: false,
        };
        reader.read_header(config.has_headers)?;

        if let Some(multiplexer) = &config.multiplex {
            reader.setup_multiplex(multiplexer)?;
        }
        if let Some(budget) = config.prebuffer_bytes
            && reader.total.is_none()
        {
            reader.prebuffer(budget);
        }
        Ok(reader)
    }

    /// Open a path with the default configuration.
    ///
    /// # Errors
    /// See [`Reader::new`].
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(path.as_ref(), ReaderConfig::default())
    }

    fn read_header(&mut self, has_headers: bool) -> Result<()> {
        let Some(first) = self.stream.next_row((!has_headers).then_some(0)) else {
            self.empty = true;
            return Ok(());
        };
        let mut first = first?;
        if let Some(cell) = first.first_mut()
            && let Some(stripped) = cell.strip_prefix('\u{feff}')
        {
            *cell = stripped.to_string();
        }

        if has_headers {
            self.row_len = first.len();
            debug!(columns = first.len(), "parsed header");
            self.headers = Some(HeaderIndex::new(first));
            match self.read_raw() {
                Some(Ok(row)) => self.buffered.push_back(row),
                Some(Err(err)) => self.deferred_error = Some(err),
                None => self.empty = true,
            }
        } else {
            self.row_len = first.len();
            self.raw_index = 1;
            self.buffered.push_back(first);
        }
        Ok(())
    }

    fn setup_multiplex(&mut self, multiplexer: &Multiplexer) -> Result<()> {
        let pos = match &mut self.headers {
            Some(headers) => {
                let pos = headers
                    .get(&multiplexer.column)
                    .ok_or_else(|| Error::column(&multiplexer.column))?;
                if let Some(new_column) = &multiplexer.new_column {
                    headers.rename(&multiplexer.column, new_column)?;
                }
                pos
            }
            None => {
                if multiplexer.new_column.is_some() {
                    return Err(Error::NoHeaders);
                }
                let pos: usize = multiplexer
                    .column
                    .parse()
                    .map_err(|_| Error::NoHeaders)?;
                if !self.empty && pos >= self.row_len {
                    return Err(Error::column(&multiplexer.column));
                }
                pos
            }
        };

        let mut state = MultiplexState {
            pos,
            separator: multiplexer.separator.clone(),
            pending: VecDeque::new(),
        };
        for row in self.buffered.drain(..) {
            state.expand(row);
        }
        self.buffered = std::mem::take(&mut state.pending);
        self.multiplex = Some(state);
        Ok(())
    }

    fn prebuffer(&mut self, budget: usize) {
        // Rows past a bad row must never be served before its error.
        if self.deferred_error.is_some() {
            return;
        }
        let mut bytes: usize = self.buffered.iter().map(|r| row_bytes(r)).sum();
        while bytes < budget {
            match self.pull() {
                Some(Ok(row)) => {
                    bytes += row_bytes(&row);
                    self.buffered.push_back(row);
                }
                Some(Err(err)) => {
                    self.deferred_error = Some(err);
                    return;
                }
                None => {
                    self.was_completely_buffered = true;
                    self.total = Some(self.buffered.len());
                    break;
                }
            }
        }
        debug!(
            rows = self.buffered.len(),
            bytes,
            complete = self.was_completely_buffered,
            "prebuffered rows"
        );
    }

    /// Next raw data row, width-checked, before multiplexing.
    fn read_raw(&mut self) -> Option<Result<Row>> {
        let index = self.raw_index;
        let row = match self.stream.next_row(Some(index))? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        self.raw_index += 1;
        if row.len() != self.row_len {
            return Some(Err(Error::parse(
                Some(index),
                format!("expected {} cells but got {}", self.row_len, row.len()),
            )));
        }
        Some(Ok(row))
    }

    /// Next row from the stream, after multiplexing, ignoring buffers.
    fn pull(&mut self) -> Option<Result<Row>> {
        if self.multiplex.is_none() {
            return self.read_raw();
        }
        loop {
            if let Some(state) = &mut self.multiplex
                && let Some(row) = state.pending.pop_front()
            {
                return Some(Ok(row));
            }
            let row = match self.read_raw()? {
                Ok(row) => row,
                Err(err) => return Some(Err(err)),
            };
            if let Some(state) = &mut self.multiplex {
                state.expand(row);
            }
        }
    }

    fn fetch(&mut self) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        if let Some(row) = self.buffered.pop_front() {
            return Some(Ok(row));
        }
        if let Some(err) = self.deferred_error.take() {
            self.done = true;
            return Some(Err(err));
        }
        if self.empty {
            self.done = true;
            return None;
        }
        match self.pull() {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                if self.total.is_none() {
                    self.total = Some(self.consumed);
                }
                None
            }
        }
    }

    /// Look at the next row without consuming it.
    ///
    /// # Errors
    /// The parse error the next call to `next` would have returned.
    pub fn peek(&mut self) -> Result<Option<&Row>> {
        if self.peeked.is_none() {
            let next = self.fetch().transpose()?;
            self.peeked = Some(next);
        }
        Ok(self.peeked.as_ref().and_then(Option::as_ref))
    }

    /// Consume up to `n` rows, handing each to `on_skip`. Returns how many
    /// rows were actually skipped.
    ///
    /// # Errors
    /// The first parse error met.
    pub fn skip_rows(&mut self, n: usize, mut on_skip: impl FnMut(&Row)) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            match self.next() {
                Some(row) => on_skip(&row?),
                None => break,
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Header of the table, `None` when headerless or empty.
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderIndex> {
        self.headers.as_ref()
    }

    #[must_use]
    pub fn fieldnames(&self) -> Option<&[String]> {
        self.headers.as_ref().map(HeaderIndex::fieldnames)
    }

    /// Number of cells in every row.
    #[must_use]
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// Whether the source held no data row at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Total row count, when given, fully prebuffered or reached.
    #[must_use]
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    #[must_use]
    pub fn was_completely_buffered(&self) -> bool {
        self.was_completely_buffered
    }

    /// Cursor of the last row returned, `None` before the first one.
    ///
    /// Rows consumed by [`skip_rows`](Self::skip_rows) count, so the cursor
    /// stays aligned with the input after a resume.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.consumed.checked_sub(1)
    }

    /// Number of rows consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Resolve a column against the header, or by position when headerless.
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`], or [`Error::NoHeaders`] for a name on a headerless table.
    pub fn resolve(&self, column: &ColumnRef) -> Result<usize> {
        match &self.headers {
            Some(headers) => headers.resolve(column),
            None if self.empty && !matches!(column, ColumnRef::Position(_)) => Err(Error::NoHeaders),
            None => column.resolve_headerless(self.row_len),
        }
    }

    /// Named access to a row read from this table.
    ///
    /// # Errors
    /// [`Error::NoHeaders`] on a headerless table.
    pub fn wrap<'a>(&'a self, row: &'a [String]) -> Result<RowView<'a>> {
        self.headers
            .as_ref()
            .map(|h| h.wrap(row))
            .ok_or(Error::NoHeaders)
    }

    /// `(cursor, row)` pairs; cursors account for rows skipped earlier.
    pub fn enumerate(&mut self) -> impl Iterator<Item = Result<(usize, Row)>> + '_ {
        std::iter::from_fn(move || {
            let row = self.next()?;
            Some(row.map(|row| (self.consumed - 1, row)))
        })
    }

    /// Values of one column.
    ///
    /// # Errors
    /// When the column cannot be resolved.
    pub fn cells(
        &mut self,
        column: impl Into<ColumnRef>,
    ) -> Result<impl Iterator<Item = Result<String>> + '_> {
        let pos = self.resolve(&column.into())?;
        Ok(self.by_ref().map(move |row| row.map(|mut row| std::mem::take(&mut row[pos]))))
    }

    /// `(row, value)` pairs for one column.
    ///
    /// # Errors
    /// When the column cannot be resolved.
    pub fn cells_with_rows(
        &mut self,
        column: impl Into<ColumnRef>,
    ) -> Result<impl Iterator<Item = Result<(Row, String)>> + '_> {
        let pos = self.resolve(&column.into())?;
        Ok(self.by_ref().map(move |row| {
            row.map(|row| {
                let value = row[pos].clone();
                (row, value)
            })
        }))
    }

    /// `(cursor, value)` pairs for one column.
    ///
    /// # Errors
    /// When the column cannot be resolved.
    pub fn enumerate_cells(
        &mut self,
        column: impl Into<ColumnRef>,
    ) -> Result<impl Iterator<Item = Result<(usize, String)>> + '_> {
        let pos = self.resolve(&column.into())?;
        Ok(std::iter::from_fn(move || {
            let row = self.next()?;
            Some(row.map(|mut row| (self.consumed - 1, std::mem::take(&mut row[pos]))))
        }))
    }

    /// Values of several columns, in selection order.
    ///
    /// # Errors
    /// When any column cannot be resolved.
    pub fn records(
        &mut self,
        columns: &[ColumnRef],
    ) -> Result<impl Iterator<Item = Result<Vec<String>>> + '_> {
        let positions = columns
            .iter()
            .map(|c| self.resolve(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.by_ref().map(move |row| {
            row.map(|row| positions.iter().map(|&p| row[p].clone()).collect())
        }))
    }

    /// Count the data rows of a source. Returns `None` as soon as more than
    /// `max_rows` rows have been seen.
    ///
    /// # Errors
    /// I/O and parse errors.
    pub fn count_rows(
        source: impl Into<Source>,
        config: ReaderConfig,
        max_rows: Option<usize>,
    ) -> Result<Option<usize>> {
        let mut reader = Reader::new(source, config)?;
        let mut n = 0;
        while let Some(row) = reader.next() {
            row?;
            n += 1;
            if max_rows.is_some_and(|max| n > max) {
                return Ok(None);
            }
        }
        Ok(Some(n))
    }
}

impl Iterator for Reader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.peeked.take() {
            Some(peeked) => peeked.map(Ok),
            None => self.fetch(),
        };
        if let Some(Ok(_)) = &item {
            self.consumed += 1;
        }
        item
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("fieldnames", &self.fieldnames())
            .field("consumed", &self.consumed)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

//! Reading a table from its last row to its first.
//!
//! [`ReverseReader`] parses the header forward once, then reads fixed-size
//! chunks backward from the end of the file and cuts records on line breaks
//! that sit outside quoted cells. Memory stays bounded by one chunk plus
//! the longest row inspected, whatever the size of the file, which is what
//! makes "what was the last row written?" cheap when resuming.
//!
//! Quote parity decides whether a line break ends a record, so records are
//! recovered exactly for doubled-quote dialects. With an escape byte, a
//! quote preceded by that byte is not counted.

use crate::Row;
use crate::config::{Dialect, ReaderConfig};
use crate::error::{Error, Result};
use crate::headers::{ColumnRef, HeaderIndex};
use crate::io::compression::is_compressed_path;
use crate::io::source::annotate;
use crate::reader::Reader;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Byte records of a seekable stream, last first.
struct BackwardRecords<R> {
    inner: R,
    /// First byte of the data region.
    start: u64,
    /// First byte of `buf` in the stream.
    pos: u64,
    /// Loaded bytes not handed out yet; always ends on a record boundary.
    buf: Vec<u8>,
    chunk: usize,
    quote: u8,
    escape: Option<u8>,
}

impl<R: Read + Seek> BackwardRecords<R> {
    fn new(mut inner: R, start: u64, chunk: usize, dialect: &Dialect) -> io::Result<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            start,
            pos: end.max(start),
            buf: Vec::new(),
            chunk: chunk.max(1),
            quote: dialect.quote,
            escape: dialect.escape,
        })
    }

    /// Prepend the previous chunk. Returns false at the start of the data region.
    fn load(&mut self) -> io::Result<bool> {
        if self.pos <= self.start {
            return Ok(false);
        }
        let len = (self.pos - self.start).min(self.chunk as u64);
        self.pos -= len;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        let mut chunk = vec![0u8; len as usize];
        self.inner.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&self.buf);
        self.buf = chunk;
        Ok(true)
    }

    fn is_quote(&self, i: usize) -> bool {
        self.buf[i] == self.quote && (i == 0 || self.escape != Some(self.buf[i - 1]))
    }

    fn next_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                self.buf.pop();
            }
            if self.buf.is_empty() {
                if self.load()? {
                    continue;
                }
                return Ok(None);
            }

            let mut quotes = 0usize;
            let mut cut = None;
            for i in (0..self.buf.len()).rev() {
                if self.buf[i] == b'\n' && quotes % 2 == 0 {
                    cut = Some(i + 1);
                    break;
                }
                if self.is_quote(i) {
                    quotes += 1;
                }
            }

            match cut {
                Some(at) => return Ok(Some(self.buf.split_off(at))),
                None => {
                    if !self.load()? {
                        return Ok(Some(std::mem::take(&mut self.buf)));
                    }
                }
            }
        }
    }
}

/// Rows of a file, last first.
pub struct ReverseReader {
    records: BackwardRecords<File>,
    headers: Option<HeaderIndex>,
    row_len: Option<usize>,
    dialect: Dialect,
    empty: bool,
}

impl ReverseReader {
    /// Open `path` for backward reading.
    ///
    /// # Errors
    /// I/O failures, a compressed file (not seekable), or an unreadable header.
    pub fn open(path: impl AsRef<Path>, dialect: &Dialect, has_headers: bool) -> Result<Self> {
        Self::with_chunk_size(path, dialect, has_headers, CHUNK_SIZE)
    }

    /// Like [`open`](Self::open) with an explicit read-window size.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn with_chunk_size(
        path: impl AsRef<Path>,
        dialect: &Dialect,
        has_headers: bool,
        chunk: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        if is_compressed_path(path) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot read compressed file {} backwards", path.display()),
            )));
        }
        let mut file = File::open(path).map_err(|e| annotate(e, path))?;

        let (headers, start) = if has_headers {
            let mut forward = dialect.reader_builder().from_reader(&mut file);
            let mut record = csv::StringRecord::new();
            if forward.read_record(&mut record).map_err(|e| Error::from_csv(e, None))? {
                let start = forward.position().byte();
                let mut names: Vec<String> = record.iter().map(str::to_string).collect();
                if let Some(first) = names.first_mut()
                    && let Some(stripped) = first.strip_prefix('\u{feff}')
                {
                    *first = stripped.to_string();
                }
                (Some(HeaderIndex::new(names)), start)
            } else {
                (None, 0)
            }
        } else {
            (None, 0)
        };

        let len = file.metadata()?.len();
        let records = BackwardRecords::new(file, start, chunk, dialect)?;
        Ok(Self {
            row_len: headers.as_ref().map(HeaderIndex::len),
            headers,
            records,
            dialect: dialect.clone(),
            empty: len <= start,
        })
    }

    #[must_use]
    pub fn headers(&self) -> Option<&HeaderIndex> {
        self.headers.as_ref()
    }

    /// Whether the file holds no byte past its header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    fn parse(&mut self, bytes: &[u8]) -> Result<Row> {
        let mut parser = self.dialect.reader_builder().from_reader(bytes);
        let mut record = csv::StringRecord::new();
        if !parser.read_record(&mut record).map_err(|e| Error::from_csv(e, None))? {
            return Err(Error::parse(None, "empty record"));
        }
        let row: Row = record.iter().map(str::to_string).collect();
        let expected = *self.row_len.get_or_insert(row.len());
        if row.len() != expected {
            return Err(Error::parse(
                None,
                format!("expected {expected} cells but got {}", row.len()),
            ));
        }
        Ok(row)
    }

    fn resolve(&self, column: &ColumnRef) -> Result<usize> {
        match (&self.headers, column) {
            (Some(headers), _) => headers.resolve(column),
            (None, ColumnRef::Position(pos)) => Ok(*pos),
            (None, _) => Err(Error::NoHeaders),
        }
    }

    /// Values of one column, last row first.
    ///
    /// # Errors
    /// When the column cannot be resolved.
    pub fn cells(
        &mut self,
        column: impl Into<ColumnRef>,
    ) -> Result<impl Iterator<Item = Result<String>> + '_> {
        let column = column.into();
        let pos = self.resolve(&column)?;
        Ok(self.by_ref().map(move |row| {
            row.and_then(|mut row| {
                row.get_mut(pos)
                    .map(std::mem::take)
                    .ok_or_else(|| Error::column(&column))
            })
        }))
    }

    /// The `column` cell of the last row of the headed table at `path`, or
    /// `None` when the table has no data row.
    ///
    /// Only the last row is read. Compressed files are streamed forward,
    /// keeping a single row in memory.
    ///
    /// # Errors
    /// I/O failures, a malformed last row, or an unknown column.
    pub fn last_cell(path: impl AsRef<Path>, column: impl Into<ColumnRef>) -> Result<Option<String>> {
        Self::last_cell_with(path, column, &Dialect::default(), true)
    }

    /// [`last_cell`](Self::last_cell) with an explicit dialect and header setting.
    ///
    /// # Errors
    /// See [`last_cell`](Self::last_cell).
    pub fn last_cell_with(
        path: impl AsRef<Path>,
        column: impl Into<ColumnRef>,
        dialect: &Dialect,
        has_headers: bool,
    ) -> Result<Option<String>> {
        let path = path.as_ref();
        let column = column.into();

        if is_compressed_path(path) {
            let config = ReaderConfig {
                dialect: dialect.clone(),
                has_headers,
                ..Default::default()
            };
            let mut reader = Reader::new(path, config)?;
            if reader.is_empty() && reader.headers().is_none() {
                return Ok(None);
            }
            let pos = reader.resolve(&column)?;
            let mut last = None;
            for row in reader.by_ref() {
                last = Some(row?);
            }
            return Ok(last.map(|mut row| std::mem::take(&mut row[pos])));
        }

        let mut reader = Self::open(path, dialect, has_headers)?;
        if has_headers && reader.headers.is_none() {
            return Ok(None);
        }
        let pos = reader.resolve(&column)?;
        match reader.next().transpose()? {
            Some(mut row) => row
                .get_mut(pos)
                .map(|cell| Some(std::mem::take(cell)))
                .ok_or_else(|| Error::column(&column)),
            None => Ok(None),
        }
    }

    /// Rows written for the last input row of a paginated output.
    ///
    /// Walks backward over rows sharing the last row's `value_column`
    /// until it meets the end marker, a recorded pagination cursor, or a
    /// different value. Rows met before that point form a page that was
    /// cut short and are returned in [`Batch::rows`], last first.
    ///
    /// # Errors
    /// I/O and parse failures, missing columns.
    pub fn last_batch(
        path: impl AsRef<Path>,
        value_column: &str,
        cursor_column: &str,
        end_marker: &str,
        dialect: &Dialect,
    ) -> Result<Option<Batch>> {
        let mut reader = Self::open(path, dialect, true)?;
        let Some(headers) = reader.headers() else {
            return Ok(None);
        };
        let value_pos = headers
            .get(value_column)
            .ok_or_else(|| Error::column(value_column))?;
        let cursor_pos = headers
            .get(cursor_column)
            .ok_or_else(|| Error::column(cursor_column))?;

        let mut batch: Option<Batch> = None;
        while let Some(row) = reader.next() {
            let row = row?;
            let current = batch.get_or_insert_with(|| Batch::new(row[value_pos].clone()));

            if row[value_pos] != current.value {
                break;
            }
            let cursor = &row[cursor_pos];
            if cursor == end_marker {
                current.finished = true;
                break;
            }
            if !cursor.is_empty() {
                current.cursor = Some(cursor.clone());
                break;
            }
            current.rows.push(row);
        }
        Ok(batch)
    }
}

impl Iterator for ReverseReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next_record() {
            Ok(Some(bytes)) => Some(self.parse(&bytes)),
            Ok(None) => None,
            Err(err) => Some(Err(Error::Io(err))),
        }
    }
}

/// Trail left in an output by the last input row of a paginated enrichment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    /// Identifying value of the input row.
    pub value: String,
    /// The end marker was found: the input row is fully processed.
    pub finished: bool,
    /// Last pagination cursor recorded for the input row.
    pub cursor: Option<String>,
    /// Rows of a page that was interrupted before its cursor was recorded.
    pub rows: Vec<Row>,
}

impl Batch {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(data: &str, chunk: usize) -> Vec<String> {
        let mut backward =
            BackwardRecords::new(Cursor::new(data.as_bytes().to_vec()), 0, chunk, &Dialect::default())
                .unwrap();
        let mut out = Vec::new();
        while let Some(bytes) = backward.next_record().unwrap() {
            out.push(String::from_utf8(bytes).unwrap());
        }
        out
    }

    #[test]
    fn splits_on_line_breaks() {
        assert_eq!(records("a,1\nb,2\nc,3\n", 4), vec!["c,3", "b,2", "a,1"]);
    }

    #[test]
    fn keeps_quoted_line_breaks() {
        let data = "a,\"x\ny\"\nb,\"p\n\"\"q\"\"\nr\"\r\n";
        for chunk in [1, 3, 7, 1024] {
            assert_eq!(
                records(data, chunk),
                vec!["b,\"p\n\"\"q\"\"\nr\"", "a,\"x\ny\""],
                "chunk size {chunk}"
            );
        }
    }

    #[test]
    fn skips_blank_lines_and_missing_final_break() {
        assert_eq!(records("a\n\n\nb", 2), vec!["b", "a"]);
    }
}

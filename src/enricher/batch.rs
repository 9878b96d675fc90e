//! Paginated enrichment: each input row may produce many output rows,
//! fetched one page at a time.
//!
//! Output rows carry a trailing cursor column. Within the rows of one page
//! only the last one holds the cursor of the next page, and an input row
//! that is complete ends with a sentinel row whose cursor cell is the end
//! marker:
//!
//! ```text
//! name,item,cursor
//! john,a,
//! john,b,p2       <- page 1 done, next page is p2
//! john,c,
//! john,,end       <- john done
//! mary,x,
//! ```
//!
//! Reading that trail backward tells whether the last input row was never
//! started, stopped after a given page, or finished. A page cut short by a
//! crash has no cursor yet and is fetched again.

use super::{EnricherConfig, Projection, open_writer, resumed_writer};
use crate::Row;
use crate::error::{Error, Result};
use crate::headers::ColumnRef;
use crate::io::Source;
use crate::reader::Reader;
use crate::resumers::{BatchResume, BatchResumer, OutputContext, ResumePhase, ResumeState, Resumer};
use crate::writer::Writer;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug)]
pub struct BatchEnricher {
    reader: Reader,
    writer: Writer,
    projection: Projection,
    end_marker: String,
    state: ResumeState,
    resume: Option<BatchResume>,
    already_done: usize,
}

impl BatchEnricher {
    /// Start a fresh enrichment, truncating `output`.
    ///
    /// `value_column` identifies input rows: it must hold unique values and
    /// be kept in the output, so a later run can resume.
    ///
    /// # Errors
    /// I/O failures, unknown columns, a `value_column` left out of the output.
    pub fn new(
        input: impl Into<Source>,
        output: impl AsRef<Path>,
        value_column: &str,
        config: EnricherConfig,
    ) -> Result<Self> {
        let reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let fieldnames = batch_fieldnames(&reader, &projection, value_column, &config.cursor_column)?;
        let writer = open_writer(output.as_ref(), Some(fieldnames.as_slice()), &config.writer)?;
        Ok(Self {
            reader,
            writer,
            projection,
            end_marker: config.end_marker,
            state: ResumeState::Fresh,
            resume: None,
            already_done: 0,
        })
    }

    /// Resume from the cursor trail of `resumer`'s output.
    ///
    /// # Errors
    /// [`Error::Resume`] when the output lacks the value or cursor column,
    /// or when the input never reaches the last recorded value.
    pub fn with_resumer(
        input: impl Into<Source>,
        mut resumer: BatchResumer,
        config: EnricherConfig,
    ) -> Result<Self> {
        let mut reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let fieldnames = batch_fieldnames(
            &reader,
            &projection,
            resumer.value_column(),
            &config.cursor_column,
        )?;

        let can_resume = resumer.can_resume();
        let mut resume = None;
        let mut state = ResumeState::Fresh;
        if can_resume {
            let mut ctx = OutputContext::new(&config.writer.dialect);
            ctx.fieldnames = Some(fieldnames.as_slice());
            ctx.cursor_column = Some(config.cursor_column.as_str());
            ctx.end_marker = Some(config.end_marker.as_str());
            resumer.inspect_output(&ctx)?;
            state = resumer.state();
            resume = resumer.skip_input(&mut reader)?;
            info!(
                skipped = resumer.already_done_count(),
                cursor = ?resume.as_ref().and_then(|r| r.cursor.as_deref()),
                "resuming paginated enrichment"
            );
        }

        let file = resumer.target_mut().open_output()?;
        let writer = resumed_writer(file, Some(fieldnames.as_slice()), &config.writer, can_resume)?;
        Ok(Self {
            reader,
            writer,
            projection,
            end_marker: config.end_marker,
            state,
            resume,
            already_done: resumer.already_done_count(),
        })
    }

    /// Write one page of results for `row`.
    ///
    /// Every item of `results` becomes an output row. The last one carries
    /// `next_cursor`; when there is none, the input row is complete and an
    /// end-marker row follows. An empty page with a cursor still writes a
    /// row so the cursor is recorded.
    ///
    /// # Errors
    /// [`Error::WriteArity`] when a result does not match the added
    /// columns, [`Error::Resume`] when `next_cursor` is the end marker, I/O
    /// failures of the output.
    pub fn writebatch<R, S>(&mut self, row: &[String], results: &[R], next_cursor: Option<&str>) -> Result<()>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        if next_cursor.is_some_and(|cursor| cursor == self.end_marker) {
            return Err(Error::resume(format!(
                "pagination cursor collides with the end marker {:?}",
                self.end_marker
            )));
        }

        let blank = vec![String::new(); self.projection.add_len()];
        if results.is_empty()
            && let Some(cursor) = next_cursor
        {
            self.write_one(row, &blank, cursor)?;
        }
        for (i, result) in results.iter().enumerate() {
            let cursor = match next_cursor {
                Some(cursor) if i + 1 == results.len() => cursor,
                _ => "",
            };
            self.write_one(row, result.as_ref(), cursor)?;
        }
        if next_cursor.is_none() {
            let end = self.end_marker.clone();
            self.write_one(row, &blank, &end)?;
        }
        debug!(rows = results.len(), next = ?next_cursor, "wrote page");
        Ok(())
    }

    fn write_one<S: AsRef<str>>(&mut self, row: &[String], add: &[S], cursor: &str) -> Result<()> {
        let mut out = Vec::new();
        self.projection.extend_row(&mut out, row, add)?;
        out.push(cursor.to_string());
        self.writer.writerow(&out)
    }

    #[must_use]
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    #[must_use]
    pub fn output_fieldnames(&self) -> Option<&[String]> {
        self.writer.headers().map(|h| h.fieldnames())
    }

    #[must_use]
    pub fn resume_state(&self) -> &ResumeState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> ResumePhase {
        self.state.phase(self.reader.total())
    }

    /// Input rows skipped because they were complete in the output.
    #[must_use]
    pub fn already_done_count(&self) -> usize {
        self.already_done
    }

    /// # Errors
    /// I/O failures of the output.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// # Errors
    /// I/O failures of the final flush.
    pub fn finish(self) -> Result<()> {
        self.writer.finish()
    }
}

/// Output header of a batch enrichment, after checking the value column
/// exists on both sides.
fn batch_fieldnames(
    reader: &Reader,
    projection: &Projection,
    value_column: &str,
    cursor_column: &str,
) -> Result<Vec<String>> {
    reader.resolve(&ColumnRef::from(value_column))?;
    let names = projection.fieldnames().ok_or(Error::NoHeaders)?;
    if !names.iter().any(|name| name == value_column) {
        return Err(Error::column(value_column));
    }
    let mut fieldnames = names.to_vec();
    fieldnames.push(cursor_column.to_string());
    Ok(fieldnames)
}

impl Iterator for BatchEnricher {
    /// An input row and the cursor to continue its pagination from. Only
    /// the first row after a resume can carry a cursor.
    type Item = Result<(Row, Option<String>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.reader.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        let cursor = self.resume.take().and_then(|resume| resume.cursor);
        Some(Ok((row, cursor)))
    }
}

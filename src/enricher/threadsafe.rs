//! Out-of-order enrichment.
//!
//! Every output row starts with the input cursor it was computed from, so
//! workers may finish rows in any order. Resuming replays that column into
//! a [`ContiguousRangeSet`] and skips every cursor it holds, wherever the
//! holes are.
//!
//! Reading stays single-consumer: one thread iterates the enricher and
//! hands `(cursor, row)` pairs to workers, which write through cloned
//! [`IndexedSink`]s.

use super::{EnricherConfig, Projection, open_writer, resumed_writer};
use crate::Row;
use crate::error::Result;
use crate::io::Source;
use crate::range_set::ContiguousRangeSet;
use crate::reader::Reader;
use crate::resumers::{
    IndexedResumer, Listener, OutputContext, ResumeEvent, ResumePhase, ResumeState, Resumer,
};
use crate::writer::Writer;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Cloneable, thread-safe handle writing indexed rows.
///
/// Each call writes one whole row under the lock, so rows written from
/// different threads never interleave.
#[derive(Clone)]
pub struct IndexedSink {
    writer: Arc<Mutex<Writer>>,
    projection: Arc<Projection>,
}

impl IndexedSink {
    /// Write the output row of input row `index`.
    ///
    /// # Errors
    /// [`Error::WriteArity`](crate::Error::WriteArity) when `add` does not
    /// match the added columns, I/O failures of the output.
    pub fn writerow<S: AsRef<str>>(&self, index: usize, row: &[String], add: &[S]) -> Result<()> {
        let mut out = vec![index.to_string()];
        self.projection.extend_row(&mut out, row, add)?;
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writerow(&out)
    }

    /// # Errors
    /// I/O failures of the output.
    pub fn flush(&self) -> Result<()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

impl std::fmt::Debug for IndexedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedSink")
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

pub struct ThreadSafeEnricher {
    reader: Reader,
    sink: IndexedSink,
    fieldnames: Option<Vec<String>>,
    done: ContiguousRangeSet,
    already_done: usize,
    resumed: bool,
    listener: Option<Listener>,
}

impl ThreadSafeEnricher {
    /// Start a fresh enrichment, truncating `output`.
    ///
    /// # Errors
    /// I/O failures, an unreadable input header, unknown selected columns.
    pub fn new(input: impl Into<Source>, output: impl AsRef<Path>, config: EnricherConfig) -> Result<Self> {
        let reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let fieldnames = indexed_fieldnames(&projection, &config.index_column);
        let writer = open_writer(output.as_ref(), fieldnames.as_deref(), &config.writer)?;
        Ok(Self::assemble(reader, writer, projection, fieldnames, ContiguousRangeSet::new(), false, None))
    }

    /// Resume from the index column of `resumer`'s output.
    ///
    /// # Errors
    /// [`Error::Resume`](crate::Error::Resume) when the output has no index
    /// column or holds a value that is not a row index.
    pub fn with_resumer(
        input: impl Into<Source>,
        mut resumer: IndexedResumer,
        config: EnricherConfig,
    ) -> Result<Self> {
        let has_headers = config.reader.has_headers;
        let reader = Reader::new(input, config.reader)?;
        let projection = Projection::new(&reader, config.select.as_deref(), &config.add)?;
        let fieldnames = indexed_fieldnames(&projection, &config.index_column);

        let can_resume = resumer.can_resume();
        if can_resume {
            let mut ctx = OutputContext::new(&config.writer.dialect);
            ctx.has_headers = has_headers;
            ctx.fieldnames = fieldnames.as_deref();
            ctx.index_column = Some(config.index_column.as_str());
            resumer.inspect_output(&ctx)?;
        }
        let done = resumer.take_done();
        if can_resume {
            info!(
                done = done.len(),
                leading = done.leading_count(),
                path = %resumer.target().path().display(),
                "resuming indexed enrichment"
            );
        }

        let file = resumer.target_mut().open_output()?;
        let writer = resumed_writer(file, fieldnames.as_deref(), &config.writer, can_resume)?;
        let listener = resumer.target().listener();
        Ok(Self::assemble(reader, writer, projection, fieldnames, done, can_resume, listener))
    }

    fn assemble(
        reader: Reader,
        writer: Writer,
        projection: Projection,
        fieldnames: Option<Vec<String>>,
        done: ContiguousRangeSet,
        resumed: bool,
        listener: Option<Listener>,
    ) -> Self {
        Self {
            reader,
            sink: IndexedSink {
                writer: Arc::new(Mutex::new(writer)),
                projection: Arc::new(projection),
            },
            fieldnames,
            already_done: done.len(),
            done,
            resumed,
            listener,
        }
    }

    /// A handle workers can write through concurrently.
    #[must_use]
    pub fn sink(&self) -> IndexedSink {
        self.sink.clone()
    }

    /// Write a row and record its cursor as done.
    ///
    /// # Errors
    /// See [`IndexedSink::writerow`].
    pub fn writerow<S: AsRef<str>>(&mut self, index: usize, row: &[String], add: &[S]) -> Result<()> {
        self.sink.writerow(index, row, add)?;
        self.done.insert(index);
        Ok(())
    }

    /// Record `index` as done, for rows written through a cloned sink.
    pub fn mark_done(&mut self, index: usize) -> bool {
        self.done.insert(index)
    }

    #[must_use]
    pub fn is_done(&self, index: usize) -> bool {
        self.done.contains(index)
    }

    /// Cursors known to be done: found in the output plus those recorded since.
    #[must_use]
    pub fn done(&self) -> &ContiguousRangeSet {
        &self.done
    }

    #[must_use]
    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    /// Rows found in the output when the run started.
    #[must_use]
    pub fn already_done_count(&self) -> usize {
        self.already_done
    }

    #[must_use]
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    #[must_use]
    pub fn output_fieldnames(&self) -> Option<&[String]> {
        self.fieldnames.as_deref()
    }

    #[must_use]
    pub fn phase(&self) -> ResumePhase {
        if !self.resumed {
            return ResumePhase::Fresh;
        }
        ResumeState::Indexed(self.done.clone()).phase(self.reader.total())
    }

    /// # Errors
    /// I/O failures of the output.
    pub fn flush(&self) -> Result<()> {
        self.sink.flush()
    }

    /// Flush the output. Clones of the sink still alive keep it open.
    ///
    /// # Errors
    /// I/O failures of the final flush.
    pub fn finish(self) -> Result<()> {
        self.sink.flush()
    }
}

fn indexed_fieldnames(projection: &Projection, index_column: &str) -> Option<Vec<String>> {
    projection.fieldnames().map(|names| {
        std::iter::once(index_column.to_string())
            .chain(names.iter().cloned())
            .collect()
    })
}

impl Iterator for ThreadSafeEnricher {
    type Item = Result<(usize, Row)>;

    /// Next `(cursor, row)` pair whose cursor is not done yet.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.reader.next()? {
                Ok(row) => row,
                Err(err) => return Some(Err(err)),
            };
            let cursor = self.reader.consumed() - 1;
            if self.done.contains(cursor) {
                if let Some(listener) = &self.listener {
                    listener(ResumeEvent::InputRowSkipped(&row));
                }
                continue;
            }
            return Some(Ok((cursor, row)));
        }
    }
}

impl std::fmt::Debug for ThreadSafeEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSafeEnricher")
            .field("fieldnames", &self.fieldnames)
            .field("done", &self.done.len())
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

//! Table writer.
//!
//! The header goes out once, when the writer is created, unless the sink
//! already holds data (appending, resuming) or the caller turned it off.
//! Row widths are not checked here: keeping them aligned with the header is
//! the caller's job.

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::headers::HeaderIndex;
use crate::io::compression::{auto_detect_writer, is_compressed_path};
use crate::io::source::annotate;
use crate::resumers::{OutputContext, WriterResumer};
use std::fs::{OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::Path;

pub struct Writer {
    inner: csv::Writer<Box<dyn Write + Send>>,
    headers: Option<HeaderIndex>,
    should_write_header: bool,
    strip_null_bytes: bool,
}

impl Writer {
    /// Create (or, with `config.append`, extend) the file at `path`.
    ///
    /// Parent directories are created as needed. A compressed extension
    /// compresses the output; appending to a compressed file is refused.
    ///
    /// # Errors
    /// I/O failures, or an append request on a compressed path.
    pub fn create<I, S>(path: impl AsRef<Path>, fieldnames: I, config: WriterConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::create_inner(path.as_ref(), Some(collect_names(fieldnames)), &config)
    }

    /// Like [`create`](Self::create), for a table without header.
    ///
    /// # Errors
    /// See [`create`](Self::create).
    pub fn create_headerless(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        Self::create_inner(path.as_ref(), None, &config)
    }

    fn create_inner(path: &Path, fieldnames: Option<Vec<String>>, config: &WriterConfig) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).map_err(|e| annotate(e, parent))?;
        }
        if config.append && is_compressed_path(path) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot append to compressed file {}", path.display()),
            )));
        }

        let has_data = config.append && path.metadata().is_ok_and(|m| m.len() > 0);
        let file = if config.append {
            OpenOptions::new().create(true).append(true).open(path)
        } else {
            OpenOptions::new().create(true).write(true).truncate(true).open(path)
        }
        .map_err(|e| annotate(e, path))?;

        let sink = auto_detect_writer(file, path)?;
        Self::from_parts(sink, fieldnames, config, has_data)
    }

    /// Write to an arbitrary sink, assumed empty.
    ///
    /// # Errors
    /// When the header cannot be written.
    pub fn from_writer<W, I, S>(sink: W, fieldnames: I, config: WriterConfig) -> Result<Self>
    where
        W: Write + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_parts(Box::new(sink), Some(collect_names(fieldnames)), &config, false)
    }

    /// # Errors
    /// I/O failures of the sink.
    pub fn from_writer_headerless<W>(sink: W, config: WriterConfig) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        Self::from_parts(Box::new(sink), None, &config, false)
    }

    /// Write through a resumer's output file, skipping the header when the
    /// file already holds data.
    ///
    /// # Errors
    /// When the resumer cannot inspect or open its output.
    pub fn with_resumer<R, I, S>(resumer: &mut R, fieldnames: I, config: WriterConfig) -> Result<Self>
    where
        R: WriterResumer,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let can_resume = resumer.target().can_resume();
        if can_resume {
            resumer.inspect_output(&OutputContext::new(&config.dialect))?;
        }
        let file = resumer.target_mut().open_output()?;
        Self::from_parts(
            Box::new(io::BufWriter::new(file)),
            Some(collect_names(fieldnames)),
            &config,
            can_resume,
        )
    }

    pub(crate) fn from_parts(
        sink: Box<dyn Write + Send>,
        fieldnames: Option<Vec<String>>,
        config: &WriterConfig,
        has_data: bool,
    ) -> Result<Self> {
        let headers = fieldnames.map(HeaderIndex::new);
        let mut writer = Writer {
            inner: config.dialect.writer_builder().from_writer(sink),
            should_write_header: !has_data && headers.is_some(),
            headers,
            strip_null_bytes: config.strip_null_bytes,
        };
        if writer.should_write_header && config.write_header {
            writer.writeheader()?;
        }
        Ok(writer)
    }

    /// Write the header row now.
    ///
    /// # Errors
    /// [`Error::EmptyHeader`] when the writer has no fieldnames.
    pub fn writeheader(&mut self) -> Result<()> {
        let names = self
            .headers
            .as_ref()
            .map(|h| h.fieldnames().to_vec())
            .ok_or(Error::EmptyHeader)?;
        self.should_write_header = false;
        self.writerow(&names)
    }

    /// Append one row.
    ///
    /// # Errors
    /// I/O failures of the sink.
    pub fn writerow<S: AsRef<str>>(&mut self, row: &[S]) -> Result<()> {
        if self.strip_null_bytes {
            self.inner
                .write_record(row.iter().map(|cell| cell.as_ref().replace('\0', "")))?;
        } else {
            self.inner
                .write_record(row.iter().map(|cell| cell.as_ref().as_bytes()))?;
        }
        Ok(())
    }

    /// # Errors
    /// I/O failures of the sink.
    pub fn writerows<R, S>(&mut self, rows: impl IntoIterator<Item = R>) -> Result<()>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        for row in rows {
            self.writerow(row.as_ref())?;
        }
        Ok(())
    }

    /// # Errors
    /// I/O failures of the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and release the sink.
    ///
    /// # Errors
    /// I/O failures of the final flush.
    pub fn finish(mut self) -> Result<()> {
        self.flush()
    }

    #[must_use]
    pub fn headers(&self) -> Option<&HeaderIndex> {
        self.headers.as_ref()
    }

    /// Whether the header is still owed to the sink.
    #[must_use]
    pub fn should_write_header(&self) -> bool {
        self.should_write_header
    }
}

fn collect_names<I, S>(fieldnames: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fieldnames.into_iter().map(Into::into).collect()
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("headers", &self.headers)
            .field("should_write_header", &self.should_write_header)
            .finish_non_exhaustive()
    }
}

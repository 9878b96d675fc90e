//! Where rows come from.

use crate::Row;
use crate::io::compression::auto_detect_reader;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Input of a [`Reader`](crate::Reader).
///
/// Paths and streams are decompressed transparently when they look
/// compressed. In-memory rows are taken as already parsed.
pub enum Source {
    Path(PathBuf),
    /// An already-open byte stream: a file, a socket, a response body.
    Stream(Box<dyn Read>),
    Rows(Box<dyn Iterator<Item = Row>>),
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    pub fn stream(reader: impl Read + 'static) -> Self {
        Source::Stream(Box::new(reader))
    }

    pub fn rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: 'static,
    {
        Source::Rows(Box::new(rows.into_iter()))
    }

    pub(crate) fn open(self, strip_null_bytes: bool) -> io::Result<Opened> {
        let bytes: Box<dyn Read> = match self {
            Source::Path(path) => {
                let file = File::open(&path).map_err(|e| annotate(e, &path))?;
                auto_detect_reader(file, Some(&path))?
            }
            Source::Stream(reader) => auto_detect_reader(reader, None)?,
            Source::Rows(rows) => {
                return Ok(if strip_null_bytes {
                    Opened::Rows(Box::new(rows.map(|row| {
                        row.into_iter().map(|cell| cell.replace('\0', "")).collect()
                    })))
                } else {
                    Opened::Rows(rows)
                });
            }
        };
        Ok(Opened::Bytes(if strip_null_bytes {
            Box::new(NullByteFilter::new(bytes))
        } else {
            bytes
        }))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Stream(_) => f.write_str("Stream"),
            Source::Rows(_) => f.write_str("Rows"),
        }
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::path(path)
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::path(path)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&PathBuf> for Source {
    fn from(path: &PathBuf) -> Self {
        Source::Path(path.clone())
    }
}

impl From<Vec<Row>> for Source {
    fn from(rows: Vec<Row>) -> Self {
        Source::rows(rows)
    }
}

pub(crate) enum Opened {
    Bytes(Box<dyn Read>),
    Rows(Box<dyn Iterator<Item = Row>>),
}

pub(crate) fn annotate(err: io::Error, path: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {err}", path.display()))
}

/// Drops every NUL byte from the wrapped stream.
pub(crate) struct NullByteFilter<R> {
    inner: R,
}

impl<R: Read> NullByteFilter<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for NullByteFilter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                if buf[i] != 0 {
                    buf[kept] = buf[i];
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bytes_are_dropped() {
        let mut filtered = NullByteFilter::new(&b"a\0b,\0\0c\n"[..]);
        let mut out = String::new();
        filtered.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ab,c\n");
    }

    #[test]
    fn all_null_chunk_does_not_end_stream() {
        let data = [0u8, 0, 0, b'x'];
        let mut filtered = NullByteFilter::new(io::Read::chain(&data[..3], &data[3..]));
        let mut out = Vec::new();
        filtered.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"x");
    }
}

//! # Rowflow
//!
//! Streaming readers and writers for **delimited-text tables** (CSV, TSV and
//! friends), with enrichment sessions that can be **interrupted and resumed**
//! without redoing finished work.
//!
//! ## Key Features
//!
//! - **Plain rows** - rows are `Vec<String>`; named access goes through a shared
//!   [`HeaderIndex`] instead of a map per row
//! - **Duplicate column names** - every occurrence keeps its own position
//! - **Multiplexing** - split a multi-valued cell into one row per value
//! - **Backward reading** - read the last rows of a file of any size in bounded memory
//! - **Resumable enrichment** - six resume strategies, from row counting to
//!   out-of-order index replay
//! - **Concurrent writers** - [`ThreadSafeEnricher`] tags rows with their input
//!   cursor so workers can finish them in any order
//! - **Transparent compression** - gzip, zstd, bzip2 and xz (all optional via feature flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use rowflow::{Reader, ReaderConfig, Writer, WriterConfig};
//!
//! # fn main() -> rowflow::Result<()> {
//! let mut reader = Reader::new("people.csv", ReaderConfig::default())?;
//! let mut writer = Writer::create("names.csv", ["name"], WriterConfig::default())?;
//!
//! let name = reader.resolve(&"name".into())?;
//! while let Some(row) = reader.next() {
//!     writer.writerow(&[&row?[name]])?;
//! }
//! writer.finish()
//! # }
//! ```
//!
//! ## Resuming
//!
//! An enricher built with a resumer reads whatever a previous run already
//! wrote, skips the matching input rows, and appends to the output:
//!
//! ```no_run
//! use rowflow::{EnricherConfig, IndexedResumer, ThreadSafeEnricher};
//!
//! # fn main() -> rowflow::Result<()> {
//! let config = EnricherConfig::default().add(["score"]);
//! let mut enricher =
//!     ThreadSafeEnricher::with_resumer("input.csv", IndexedResumer::new("scores.csv"), config)?;
//! let sink = enricher.sink();
//!
//! while let Some(item) = enricher.next() {
//!     let (index, row) = item?;
//!     // hand (index, row) to a worker; any thread may then call:
//!     sink.writerow(index, &row, &["42"])?;
//! }
//! enricher.finish()
//! # }
//! ```
//!
//! | Resumer | Use with | Resume point |
//! |---|---|---|
//! | [`RowCountResumer`] | [`Enricher`] | number of output rows |
//! | [`LastCellComparisonResumer`] | [`Enricher`] | input row matching the last output value |
//! | [`IndexedResumer`] | [`ThreadSafeEnricher`] | every index found in the output |
//! | [`BatchResumer`] | [`BatchEnricher`] | last pagination cursor |
//! | [`LastCellResumer`], [`BasicResumer`] | [`Writer`] | plain append |
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - gzip via `flate2`
//! - `compression-zstd` - zstd
//! - `compression-bzip2` - bzip2
//! - `compression-xz` - xz / lzma
//!
//! All are enabled by default.
//!
//! ## Logging
//!
//! Diagnostics go through [`tracing`]. The crate never installs a subscriber.
//!
//! ## Module Overview
//!
//! - [`reader`] / [`writer`] - forward streaming
//! - [`reverse_reader`] - last-to-first streaming, `last_cell`, `last_batch`
//! - [`headers`] - column resolution and named row access
//! - [`range_set`] - interval-compressed set of finished cursors
//! - [`resumers`] - resume strategies
//! - [`enricher`] - ordered, thread-safe and paginated enrichment sessions
//! - [`kway_merge`] - merging sorted tables
//! - [`io`] - sources and compression codecs

pub mod config;
pub mod enricher;
pub mod error;
pub mod headers;
pub mod io;
pub mod kway_merge;
pub mod range_set;
pub mod reader;
pub mod resumers;
pub mod reverse_reader;
pub mod writer;

/// A row: its cells, in column order.
pub type Row = Vec<String>;

pub use config::{Dialect, Multiplexer, QuoteStyle, ReaderConfig, Terminator, WriterConfig};
pub use enricher::{BatchEnricher, Enricher, EnricherConfig, IndexedSink, Projection, ThreadSafeEnricher};
pub use error::{Error, Result};
pub use headers::{ColumnRef, HeaderIndex, RowView};
pub use io::Source;
pub use kway_merge::{KwayMerge, kway_merge, kway_merge_by_column};
pub use range_set::ContiguousRangeSet;
pub use reader::Reader;
pub use resumers::{
    BasicResumer, BatchResume, BatchResumer, IndexedResumer, LastCellComparisonResumer,
    LastCellResumer, Listener, OrderedResumer, OutputContext, ResumeEvent, ResumePhase,
    ResumeState, ResumeTarget, Resumer, RowCountResumer, WriterResumer,
};
pub use reverse_reader::{Batch, ReverseReader};
pub use writer::Writer;

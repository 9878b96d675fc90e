//! Merge several sorted tables into one sorted stream.
//!
//! Each reader must already be sorted by the merge key. A min-heap keeps
//! one pending row per reader, so memory is bounded by the number of
//! readers. Ties are broken by reader order, which keeps the merge stable.

use crate::Row;
use crate::error::Result;
use crate::headers::ColumnRef;
use crate::reader::Reader;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Head<K> {
    key: K,
    source: usize,
    row: Row,
}

impl<K: Ord> PartialEq for Head<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Head<K> {}

impl<K: Ord> PartialOrd for Head<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Head<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Iterator over `(row, source)` pairs in key order, where `source` is the
/// position of the originating reader.
pub struct KwayMerge<K, F> {
    readers: Vec<Reader>,
    heap: BinaryHeap<Reverse<Head<K>>>,
    key: F,
    primed: bool,
    failed: bool,
}

impl<K, F> KwayMerge<K, F>
where
    K: Ord,
    F: FnMut(usize, &Row) -> K,
{
    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(row) = self.readers[source].next().transpose()? {
            let key = (self.key)(source, &row);
            self.heap.push(Reverse(Head { key, source, row }));
        }
        Ok(())
    }

    fn prime(&mut self) -> Result<()> {
        self.primed = true;
        for source in 0..self.readers.len() {
            self.advance(source)?;
        }
        Ok(())
    }
}

/// Merge `readers` by the key `key(source, row)` computes.
pub fn kway_merge<K, F>(readers: Vec<Reader>, key: F) -> KwayMerge<K, F>
where
    K: Ord,
    F: FnMut(usize, &Row) -> K,
{
    KwayMerge {
        heap: BinaryHeap::with_capacity(readers.len()),
        readers,
        key,
        primed: false,
        failed: false,
    }
}

/// Merge `readers` by the string value of one column, resolved in each
/// reader's own header.
///
/// # Errors
/// [`Error::ColumnNotFound`](crate::Error::ColumnNotFound) when a reader
/// lacks the column.
pub fn kway_merge_by_column(
    readers: Vec<Reader>,
    column: impl Into<ColumnRef>,
) -> Result<KwayMerge<String, impl FnMut(usize, &Row) -> String>> {
    let column = column.into();
    let positions = readers
        .iter()
        .map(|reader| reader.resolve(&column))
        .collect::<Result<Vec<_>>>()?;
    Ok(kway_merge(readers, move |source, row: &Row| {
        row[positions[source]].clone()
    }))
}

impl<K, F> Iterator for KwayMerge<K, F>
where
    K: Ord,
    F: FnMut(usize, &Row) -> K,
{
    type Item = Result<(Row, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed
            && let Err(err) = self.prime()
        {
            self.failed = true;
            return Some(Err(err));
        }
        let Reverse(head) = self.heap.pop()?;
        if let Err(err) = self.advance(head.source) {
            self.failed = true;
            return Some(Err(err));
        }
        Some(Ok((head.row, head.source)))
    }
}

impl<K, F> std::fmt::Debug for KwayMerge<K, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KwayMerge")
            .field("readers", &self.readers.len())
            .field("pending", &self.heap.len())
            .finish_non_exhaustive()
    }
}

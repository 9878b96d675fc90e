//! Column name resolution.
//!
//! A [`HeaderIndex`] maps the names of a header row to their positions.
//! Duplicate names are legal: every occurrence keeps its own position and
//! can be addressed with an explicit occurrence index, while a bare name
//! resolves to its first occurrence.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// A reference to a column, by name, by n-th occurrence of a name, or by position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Name(String),
    /// The `usize`-th (zero-based) column carrying this name.
    Occurrence(String, usize),
    Position(usize),
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<&String> for ColumnRef {
    fn from(name: &String) -> Self {
        ColumnRef::Name(name.clone())
    }
}

impl From<usize> for ColumnRef {
    fn from(pos: usize) -> Self {
        ColumnRef::Position(pos)
    }
}

impl From<(&str, usize)> for ColumnRef {
    fn from((name, occurrence): (&str, usize)) -> Self {
        ColumnRef::Occurrence(name.to_string(), occurrence)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => write!(f, "{name}"),
            ColumnRef::Occurrence(name, k) => write!(f, "{name}[{k}]"),
            ColumnRef::Position(pos) => write!(f, "#{pos}"),
        }
    }
}

impl ColumnRef {
    /// Resolve against a headerless row of `row_len` cells: only positions are valid.
    pub fn resolve_headerless(&self, row_len: usize) -> Result<usize> {
        match self {
            ColumnRef::Position(pos) if *pos < row_len => Ok(*pos),
            ColumnRef::Position(_) => Err(Error::column(self)),
            _ => Err(Error::NoHeaders),
        }
    }
}

/// Ordered header names with O(1) lookups in both directions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderIndex {
    fieldnames: Vec<String>,
    positions: HashMap<String, Vec<usize>>,
}

impl HeaderIndex {
    pub fn new<I, S>(fieldnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fieldnames: Vec<String> = fieldnames.into_iter().map(Into::into).collect();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::with_capacity(fieldnames.len());
        for (i, name) in fieldnames.iter().enumerate() {
            positions.entry(name.clone()).or_default().push(i);
        }
        Self {
            fieldnames,
            positions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fieldnames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fieldnames.is_empty()
    }

    #[must_use]
    pub fn fieldnames(&self) -> &[String] {
        &self.fieldnames
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Position of the first column named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.nth(name, 0)
    }

    /// Position of the `occurrence`-th column named `name`.
    #[must_use]
    pub fn nth(&self, name: &str, occurrence: usize) -> Option<usize> {
        self.positions
            .get(name)
            .and_then(|list| list.get(occurrence))
            .copied()
    }

    /// Number of columns carrying `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.positions.get(name).map_or(0, Vec::len)
    }

    /// Name of the column at `pos`.
    #[must_use]
    pub fn name(&self, pos: usize) -> Option<&str> {
        self.fieldnames.get(pos).map(String::as_str)
    }

    /// Resolve any [`ColumnRef`] to a position.
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`] when the name has no such occurrence or the
    /// position is out of range.
    pub fn resolve(&self, column: &ColumnRef) -> Result<usize> {
        let found = match column {
            ColumnRef::Name(name) => self.get(name),
            ColumnRef::Occurrence(name, k) => self.nth(name, *k),
            ColumnRef::Position(pos) => (*pos < self.len()).then_some(*pos),
        };
        found.ok_or_else(|| Error::column(column))
    }

    /// Resolve a selection, preserving its order and any repetition.
    ///
    /// # Errors
    /// Fails on the first column that cannot be resolved.
    pub fn select<C: Into<ColumnRef> + Clone>(&self, columns: &[C]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|c| self.resolve(&c.clone().into()))
            .collect()
    }

    /// Rename the first column named `old` in place. Positions and length are unchanged.
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`] when `old` is absent.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let pos = self.get(old).ok_or_else(|| Error::column(old))?;

        if let Some(list) = self.positions.get_mut(old) {
            list.remove(0);
            if list.is_empty() {
                self.positions.remove(old);
            }
        }
        let list = self.positions.entry(new.to_string()).or_default();
        let at = list.partition_point(|&p| p < pos);
        list.insert(at, pos);

        self.fieldnames[pos] = new.to_string();
        Ok(())
    }

    /// `(name, position)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.fieldnames
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
    }

    /// Name to first-occurrence position.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, usize> {
        self.positions
            .iter()
            .map(|(name, list)| (name.clone(), list[0]))
            .collect()
    }

    /// Named access to `row`, without copying it.
    #[must_use]
    pub fn wrap<'a>(&'a self, row: &'a [String]) -> RowView<'a> {
        RowView { headers: self, row }
    }
}

/// A row paired with the header that names its cells.
#[derive(Clone, Copy, Debug)]
pub struct RowView<'a> {
    headers: &'a HeaderIndex,
    row: &'a [String],
}

impl<'a> RowView<'a> {
    /// Cell of the first column named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|pos| self.at(pos))
    }

    #[must_use]
    pub fn at(&self, pos: usize) -> Option<&'a str> {
        self.row.get(pos).map(String::as_str)
    }

    /// Cell addressed by any [`ColumnRef`].
    ///
    /// # Errors
    /// [`Error::ColumnNotFound`] when the column does not resolve or the row is too short.
    pub fn cell(&self, column: &ColumnRef) -> Result<&'a str> {
        let pos = self.headers.resolve(column)?;
        self.at(pos).ok_or_else(|| Error::column(column))
    }

    #[must_use]
    pub fn row(&self) -> &'a [String] {
        self.row
    }
}

// src/buffer.rs
use std::collections::BTreeMap;

use crate::rows::FlatRow;

/// Rows waiting to be merged into their year's partition.
///
/// Owned by the driver; the store only ever sees what `drain_partition` hands
/// out. Rows without a year are dropped on entry.
#[derive(Debug, Default)]
pub struct YearBuffer {
    by_year: BTreeMap<i32, Vec<FlatRow>>,
    total: usize,
}

impl YearBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to their partitions, keeping arrival order within each.
    /// Returns how many were kept.
    pub fn add_rows<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = FlatRow>,
    {
        let mut kept = 0;
        for row in rows {
            let Some(year) = row.year else { continue };
            self.by_year.entry(year).or_default().push(row);
            kept += 1;
        }
        self.total += kept;
        kept
    }

    /// Rows accepted since creation. Draining does not lower it.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Rows currently held across all partitions.
    pub fn pending(&self) -> usize {
        self.by_year.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.values().all(Vec::is_empty)
    }

    /// Years with at least one pending row, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.by_year
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(year, _)| *year)
            .collect()
    }

    pub fn peek(&self, year: i32) -> &[FlatRow] {
        self.by_year.get(&year).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Take everything pending for `year`. Empty or unknown years give `vec![]`.
    pub fn drain_partition(&mut self, year: i32) -> Vec<FlatRow> {
        self.by_year.remove(&year).unwrap_or_default()
    }
}

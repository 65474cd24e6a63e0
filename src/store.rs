// src/store.rs
//
// Per-year Parquet partitions: `<dir>/<prefix>_<year>.parquet`.
//
// Merge policy: existing rows first, new rows after, then keep the *last* row
// per identifier, then overwrite the whole file. Not safe for concurrent
// writers of the same partition.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::columnar;
use crate::config::{consts::FILE_EXT, options::ScrapeOptions};
use crate::error::StoreError;
use crate::rows::{FlatRow, ID_COLUMN};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushReport {
    pub year: i32,
    pub path: PathBuf,
    /// Rows handed in by the caller.
    pub appended: usize,
    /// Rows in the partition after the merge.
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanReport {
    pub year: i32,
    pub path: PathBuf,
    pub before: usize,
    pub after: usize,
}

impl CleanReport {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

#[derive(Clone, Debug)]
pub struct PartitionStore {
    dir: PathBuf,
    prefix: String,
}

impl PartitionStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self { dir: dir.into(), prefix: s!(prefix) }
    }

    pub fn from_options(opts: &ScrapeOptions) -> Self {
        Self::new(&opts.data_dir, &opts.file_prefix)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        self.dir.join(join!(&self.prefix, "_", &year.to_string(), ".", FILE_EXT))
    }

    /// `<prefix>_<year>.parquet` → `year`
    fn year_of(&self, path: &Path) -> Option<i32> {
        if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXT) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        stem.strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .parse()
            .ok()
    }

    /// Persisted partitions, ascending by year. A missing directory is empty.
    pub fn partitions(&self) -> Result<Vec<(i32, PathBuf)>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(year) = self.year_of(&path) {
                found.push((year, path));
            }
        }
        found.sort_by_key(|(year, _)| *year);
        Ok(found)
    }

    pub fn exists(&self, year: i32) -> bool {
        self.path_for(year).is_file()
    }

    /// Whole partition. A partition that was never written loads as empty.
    pub fn load(&self, year: i32) -> Result<Vec<FlatRow>, StoreError> {
        let path = self.path_for(year);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        columnar::read_file(&path)
    }

    /// Replace the partition with exactly `rows`.
    pub fn write(&self, year: i32, rows: &[FlatRow]) -> Result<PathBuf, StoreError> {
        ensure_directory(&self.dir)?;
        let path = self.path_for(year);
        columnar::write_file(&path, rows)?;
        Ok(path)
    }

    /// Merge `rows` into the partition for `year`. `Ok(None)` when there was
    /// nothing to write.
    pub fn flush(&self, year: i32, rows: Vec<FlatRow>) -> Result<Option<FlushReport>, StoreError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let appended = rows.len();

        let merged = if self.exists(year) {
            let mut combined = self.load(year)?;
            combined.extend(rows);
            dedup_keep_last(combined)
        } else {
            rows
        };

        let path = self.write(year, &merged)?;
        tracing::debug!(year, appended, total = merged.len(), path = %path.display(), "partition merged");
        Ok(Some(FlushReport { year, path, appended, total: merged.len() }))
    }

    /// Identifiers of one partition, read through a projection of the id column.
    pub fn identifiers(&self, year: i32) -> Result<Vec<Option<String>>, StoreError> {
        let path = self.path_for(year);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        columnar::read_text_column(&path, ID_COLUMN)
    }

    /// Highest numeric identifier across all partitions.
    pub fn max_identifier(&self) -> Result<Option<u64>, StoreError> {
        let mut max = None;
        for (year, _) in self.partitions()? {
            let best = self
                .identifiers(year)?
                .into_iter()
                .flatten()
                .filter_map(|code| code.trim().parse::<u64>().ok())
                .max();
            max = max.max(best);
        }
        Ok(max)
    }

    /// Where a resumed crawl should start: one past the highest identifier.
    pub fn resume_point(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.max_identifier()?.map(|id| id + 1))
    }

    /// Dedupe every partition in place. Partitions already unique are not rewritten.
    pub fn clean(&self) -> Result<Vec<CleanReport>, StoreError> {
        let mut reports = Vec::new();
        for (year, path) in self.partitions()? {
            let rows = columnar::read_file(&path)?;
            let before = rows.len();
            let unique = dedup_keep_last(rows);
            let after = unique.len();
            if after < before {
                columnar::write_file(&path, &unique)?;
            }
            reports.push(CleanReport { year, path, before, after });
        }
        Ok(reports)
    }
}

/// Keep the last row per identifier; survivors stay in their original order.
/// Rows without an identifier share one key.
pub fn dedup_keep_last(rows: Vec<FlatRow>) -> Vec<FlatRow> {
    let mut seen: HashSet<Option<String>> = HashSet::with_capacity(rows.len());
    let mut kept: Vec<FlatRow> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert(row.codigo_bdns.clone()))
        .collect();
    kept.reverse();
    kept
}

pub fn ensure_directory(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() && !dir.is_dir() {
        return Err(StoreError::Io(std::io::Error::other(format!(
            "path exists but is not a directory: {}",
            dir.display()
        ))));
    }
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

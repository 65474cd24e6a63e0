// src/scrape.rs
//
// Enumeration driver. Probes identifiers one at a time, upward from a start
// point, until `max_consecutive_failures` lookups in a row come back without a
// record or the caller raises the cancel flag. Buffered rows are flushed every
// `flush_every` buffered rows and once more on the way out.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::{
    buffer::YearBuffer,
    config::{consts::FALLBACK_START, options::{ScrapeOptions, StartPoint}},
    error::StoreError,
    progress::Progress,
    rows,
    specs::{Fetch, FetchOutcome},
    store::PartitionStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxConsecutiveFailures,
    UserCancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Running,
    Stopped(StopReason),
}

/// What one probe contributes to termination. 404s and transient errors both
/// count as a miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Hit,
    Miss,
}

impl From<&FetchOutcome> for Probe {
    fn from(outcome: &FetchOutcome) -> Self {
        if outcome.is_found() { Probe::Hit } else { Probe::Miss }
    }
}

/// Next identifier to probe plus the run of misses since the last hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    next_id: u64,
    consecutive_failures: u32,
    threshold: u32,
}

impl Cursor {
    pub fn new(start: u64, threshold: u32) -> Self {
        Self { next_id: start, consecutive_failures: 0, threshold: threshold.max(1) }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Account for one probe of `next_id` and move past it.
    pub fn record(&mut self, probe: Probe) -> DriverState {
        match probe {
            Probe::Hit => self.consecutive_failures = 0,
            Probe::Miss => self.consecutive_failures += 1,
        }
        self.next_id += 1;

        if self.consecutive_failures >= self.threshold {
            DriverState::Stopped(StopReason::MaxConsecutiveFailures)
        } else {
            DriverState::Running
        }
    }
}

/// Start identifier: explicit, else one past the highest persisted identifier,
/// else `FALLBACK_START`.
pub fn resolve_start(opts: &ScrapeOptions, store: &PartitionStore) -> Result<u64, StoreError> {
    match opts.start {
        StartPoint::At(id) => Ok(id),
        StartPoint::Resume => Ok(store.resume_point()?.unwrap_or(FALLBACK_START)),
    }
}

/// True when going from `before` to `after` buffered rows passes a multiple of `every`.
fn crossed_multiple(before: usize, after: usize, every: usize) -> bool {
    every > 0 && after / every > before / every
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub start_id: u64,
    /// First identifier that was not probed.
    pub next_id: u64,
    pub requests: u64,
    pub found: u64,
    pub rows_buffered: usize,
    pub rows_flushed: usize,
    pub flush_failures: usize,
    pub consecutive_failures: u32,
    pub stop_reason: StopReason,
    pub files_written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn last_processed(&self) -> Option<u64> {
        (self.next_id > self.start_id).then(|| self.next_id - 1)
    }
}

/// Single-threaded crawl. Owns the cursor and the buffer; the store only sees
/// drained partitions.
pub struct Driver<'s> {
    store: &'s PartitionStore,
    cursor: Cursor,
    buffer: YearBuffer,
    state: DriverState,
    flush_every: usize,
    max_delay: Option<Duration>,

    start_id: u64,
    requests: u64,
    found: u64,
    rows_flushed: usize,
    flush_failures: usize,
    files_written: Vec<PathBuf>,
}

impl<'s> Driver<'s> {
    pub fn new(store: &'s PartitionStore, opts: &ScrapeOptions, start: u64) -> Self {
        Self {
            store,
            cursor: Cursor::new(start, opts.max_consecutive_failures),
            buffer: YearBuffer::new(),
            state: DriverState::Running,
            flush_every: opts.flush_every,
            max_delay: opts.max_delay,
            start_id: start,
            requests: 0,
            found: 0,
            rows_flushed: 0,
            flush_failures: 0,
            files_written: Vec::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn buffer(&self) -> &YearBuffer {
        &self.buffer
    }

    /// Run until the failure threshold or `cancel`, then flush what is left.
    /// The flag is only checked between probes.
    pub fn run<F: Fetch + ?Sized>(
        mut self,
        fetcher: &mut F,
        cancel: &AtomicBool,
        progress: &mut dyn Progress,
    ) -> RunSummary {
        info!(start = self.start_id, dir = %self.store.dir().display(), "crawl started");
        progress.begin(self.start_id);

        while self.state == DriverState::Running {
            if cancel.load(Ordering::SeqCst) {
                self.state = DriverState::Stopped(StopReason::UserCancelled);
                break;
            }
            self.step(fetcher, progress);
        }

        progress.log("Saving remaining data...");
        self.flush_all(progress);

        let summary = self.summary();
        info!(
            reason = ?summary.stop_reason,
            requests = summary.requests,
            rows = summary.rows_buffered,
            next = summary.next_id,
            "crawl stopped"
        );
        progress.finish(&summary);
        summary
    }

    /// Probe the current identifier and advance. No-op once stopped.
    pub fn step<F: Fetch + ?Sized>(&mut self, fetcher: &mut F, progress: &mut dyn Progress) -> DriverState {
        if self.state != DriverState::Running {
            return self.state;
        }

        let id = self.cursor.next_id();
        let outcome = fetcher.fetch(id);
        self.requests += 1;
        let probe = Probe::from(&outcome);

        if let FetchOutcome::Found(record) = &outcome {
            self.found += 1;
            let before = self.buffer.total();
            let kept = self.buffer.add_rows(rows::flatten(record));
            debug!(id, rows = kept, "announcement buffered");
            progress.item_done(id, kept);
            if crossed_multiple(before, self.buffer.total(), self.flush_every) {
                self.flush_all(progress);
            }
        }

        self.state = self.cursor.record(probe);
        let consecutive = self.cursor.consecutive_failures();

        match &outcome {
            FetchOutcome::Found(_) => self.pause(),
            FetchOutcome::NotFound => {
                debug!(id, consecutive, "not found");
                progress.item_missing(id, consecutive);
            }
            FetchOutcome::TransientError(detail) => {
                warn!(id, consecutive, %detail, "lookup failed");
                progress.item_failed(id, detail, consecutive);
            }
        }

        self.state
    }

    /// Hand every non-empty partition to the store. A failed partition is
    /// logged and its rows are dropped.
    pub fn flush_all(&mut self, progress: &mut dyn Progress) {
        for year in self.buffer.years() {
            let rows = self.buffer.drain_partition(year);
            let count = rows.len();
            match self.store.flush(year, rows) {
                Ok(Some(report)) => {
                    info!(year, rows = report.appended, total = report.total, "partition saved");
                    self.rows_flushed += count;
                    if !self.files_written.contains(&report.path) {
                        self.files_written.push(report.path.clone());
                    }
                    progress.flushed(&report);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(year, rows = count, error = %e, "partition save failed, rows dropped");
                    self.flush_failures += 1;
                    progress.flush_failed(year, &e.to_string());
                }
            }
        }
    }

    fn pause(&self) {
        let Some(max) = self.max_delay.filter(|d| !d.is_zero()) else { return };
        let secs = rand::rng().random_range(0.0..max.as_secs_f64());
        thread::sleep(Duration::from_secs_f64(secs));
    }

    fn summary(&self) -> RunSummary {
        let stop_reason = match self.state {
            DriverState::Stopped(reason) => reason,
            DriverState::Running => StopReason::UserCancelled,
        };
        RunSummary {
            start_id: self.start_id,
            next_id: self.cursor.next_id(),
            requests: self.requests,
            found: self.found,
            rows_buffered: self.buffer.total(),
            rows_flushed: self.rows_flushed,
            flush_failures: self.flush_failures,
            consecutive_failures: self.cursor.consecutive_failures(),
            stop_reason,
            files_written: self.files_written.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(cursor: &mut Cursor, probes: &[Probe]) -> Vec<DriverState> {
        probes.iter().map(|p| cursor.record(*p)).collect()
    }

    #[test]
    fn stops_exactly_at_threshold() {
        let mut c = Cursor::new(10, 3);
        let states = feed(&mut c, &[Probe::Miss, Probe::Miss, Probe::Miss]);
        assert_eq!(states[..2], [DriverState::Running, DriverState::Running]);
        assert_eq!(states[2], DriverState::Stopped(StopReason::MaxConsecutiveFailures));
        assert_eq!(c.next_id(), 13);
    }

    #[test]
    fn hit_resets_the_run() {
        let mut c = Cursor::new(0, 3);
        let states = feed(
            &mut c,
            &[Probe::Miss, Probe::Miss, Probe::Hit, Probe::Miss, Probe::Miss],
        );
        assert!(states.iter().all(|s| *s == DriverState::Running));
        assert_eq!(c.consecutive_failures(), 2);
        assert_eq!(c.next_id(), 5);
    }

    #[test]
    fn crossing_detects_jumps_over_a_multiple() {
        assert!(crossed_multiple(99, 100, 100));
        assert!(crossed_multiple(98, 103, 100));
        assert!(!crossed_multiple(100, 101, 100));
        assert!(!crossed_multiple(0, 0, 100));
        assert!(crossed_multiple(190, 310, 100));
        assert!(!crossed_multiple(5, 10, 0));
    }
}

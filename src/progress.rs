// src/progress.rs
use crate::scrape::RunSummary;
use crate::store::FlushReport;

/// Progress reporting for a crawl. Frontends implement what they want to
/// surface; every hook defaults to a no-op.
pub trait Progress {
    /// Called once with the first identifier to probe.
    fn begin(&mut self, _start_id: u64) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// Identifier found; `rows` is how many rows went into the buffer.
    fn item_done(&mut self, _id: u64, _rows: usize) {}

    /// Identifier does not exist upstream (404).
    fn item_missing(&mut self, _id: u64, _consecutive: u32) {}

    /// Lookup failed for any other reason.
    fn item_failed(&mut self, _id: u64, _detail: &str, _consecutive: u32) {}

    fn flushed(&mut self, _report: &FlushReport) {}

    /// The rows handed to this flush are gone; the crawl carries on.
    fn flush_failed(&mut self, _year: i32, _error: &str) {}

    /// Called at the end, whatever the stop reason.
    fn finish(&mut self, _summary: &RunSummary) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

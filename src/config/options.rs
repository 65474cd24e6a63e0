// src/config/options.rs
use std::path::PathBuf;
use std::time::Duration;

use super::consts::*;

/// Where the enumeration begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartPoint {
    /// One past the highest identifier already persisted, or `FALLBACK_START`.
    Resume,
    At(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrapeOptions {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub file_prefix: String,
    pub start: StartPoint,
    pub max_consecutive_failures: u32,
    pub flush_every: usize,
    /// Upper bound of the random pause after each hit. `None` disables it.
    pub max_delay: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            api_url: s!(API_URL),
            data_dir: PathBuf::from(DATA_DIR),
            file_prefix: s!(FILE_PREFIX),
            start: StartPoint::Resume,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            flush_every: FLUSH_EVERY_ROWS,
            max_delay: None,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ScrapeOptions {
    /// Pause up to `max_secs` after each hit. Zero, negative, NaN or
    /// out-of-range values disable the pause.
    pub fn with_delay(mut self, max_secs: f64) -> Self {
        self.max_delay = Duration::try_from_secs_f64(max_secs)
            .ok()
            .filter(|d| !d.is_zero());
        self
    }
}

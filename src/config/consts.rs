// src/config/consts.rs

// Net config
pub const API_URL: &str = "https://www.pap.hacienda.gob.es/bdnstrans/api/convocatorias";
pub const PORTAL_VPD: &str = "GE";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT: &str = "application/json, text/plain, */*";
pub const ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.8";
pub const REFERER: &str = "https://www.pap.hacienda.gob.es/bdnstrans/GE/es/convocatorias/";

// Local partitions
pub const DATA_DIR: &str = "data";
pub const FILE_PREFIX: &str = "bdns";
pub const FILE_EXT: &str = "parquet";

// Enumeration
pub const FALLBACK_START: u64 = 600_000;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;
pub const FLUSH_EVERY_ROWS: usize = 100;

// Politeness (off unless asked for)
pub const MAX_DELAY_SECS: f64 = 4.0;

//! # Upstream “specs” module
//!
//! Knows how to read the BDNS lookup endpoint: what one announcement looks like
//! on the wire and how a single lookup is classified.
//!
//! ## What lives here
//! - **The record model** (`Convocatoria`) with tolerant field decoding. The
//!   endpoint is not strict about scalar types (codes arrive as strings or
//!   numbers, amounts occasionally as strings), so every scalar is decoded
//!   leniently and anything unusable becomes `None` instead of failing the
//!   whole record.
//! - **Outcome classification**: 200 + parseable body is `Found`, 404 is
//!   `NotFound`, everything else (other statuses, transport errors, bodies that
//!   are not a JSON object) is `TransientError`.
//! - **The `Fetch` seam** the driver talks to, plus the HTTP implementation.
//!
//! ## What does **not** live here
//! - Retry policy, counters, termination: that is the driver's (`scrape`).
//! - Flattening into rows (`rows`) and persistence (`store`).
//!
//! ## Typical call chain
//! ```text
//! scrape::Driver → Fetch::fetch(id) → core::net::http_get
//!                        ↘ classify(status, body) → FetchOutcome
//! ```
pub mod convocatoria;

pub use convocatoria::{classify, Convocatoria, Fetch, FetchOutcome, HttpFetcher, Item, Organo};

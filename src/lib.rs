// src/lib.rs

#[macro_use]
pub mod macros;

pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod specs;

pub mod buffer;
pub mod columnar;
pub mod data;
pub mod progress;
pub mod rows;
pub mod scrape;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

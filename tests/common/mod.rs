// tests/common/mod.rs
//
// Record builders and an in-memory `Fetch` driven by a script of outcomes.
#![allow(dead_code)]

use std::collections::VecDeque;

use bdns_scrape::config::options::ScrapeOptions;
use bdns_scrape::rows::{flatten, FlatRow};
use bdns_scrape::specs::{Convocatoria, Fetch, FetchOutcome, Item, Organo};

pub fn record(code: u64, received: &str) -> Convocatoria {
    Convocatoria {
        id: Some(code as i64 * 10),
        codigo_bdns: Some(code.to_string()),
        fecha_recepcion: Some(received.to_string()),
        descripcion: Some(format!("Convocatoria {code}")),
        organo: Some(Organo {
            nivel1: Some("ESTADO".into()),
            nivel2: Some("MINISTERIO".into()),
            nivel3: None,
        }),
        ..Default::default()
    }
}

pub fn rows_of(rec: &Convocatoria) -> Vec<FlatRow> {
    flatten(rec).collect()
}

/// A single row in `year` with the given identifier and description.
pub fn row(code: &str, year: i32, descripcion: &str) -> FlatRow {
    FlatRow {
        codigo_bdns: Some(code.into()),
        fecha_recepcion: Some(format!("{year}-06-01")),
        descripcion: Some(descripcion.into()),
        year: Some(year),
        ..Default::default()
    }
}

pub fn items(descs: &[&str]) -> Option<Vec<Item>> {
    Some(descs.iter().map(|d| Item::new(d)).collect())
}

pub fn opts(dir: &std::path::Path) -> ScrapeOptions {
    ScrapeOptions { data_dir: dir.to_path_buf(), flush_every: 100, ..ScrapeOptions::default() }
}

/// Replays `outcomes` in order, then answers `NotFound` forever.
pub struct Scripted {
    outcomes: VecDeque<FetchOutcome>,
    pub asked: Vec<u64>,
}

impl Scripted {
    pub fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self { outcomes: outcomes.into(), asked: Vec::new() }
    }
}

impl Fetch for Scripted {
    fn fetch(&mut self, id: u64) -> FetchOutcome {
        self.asked.push(id);
        self.outcomes.pop_front().unwrap_or(FetchOutcome::NotFound)
    }
}

pub fn found(rec: Convocatoria) -> FetchOutcome {
    FetchOutcome::Found(Box::new(rec))
}

// src/data.rs
//
// Read-only side of the partitions, for dashboards and reports.
//
// - Catalog: every partition concatenated (ascending year) and deduplicated by
//            identifier, keep-last. Never writes anything back.
// - FilteredView: row positions into a Catalog that passed a `Filters`.
// - Summary / YearSummary: aggregates over a view.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::rows::{FlatRow, COLUMNS};
use crate::store::{dedup_keep_last, PartitionStore};

const TOP_N: usize = 5;

/// Authoritative, deduplicated rows of all partitions.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    rows: Vec<FlatRow>,
}

impl Catalog {
    pub fn load(store: &PartitionStore) -> Result<Self, StoreError> {
        let mut rows = Vec::new();
        for (year, _) in store.partitions()? {
            rows.extend(store.load(year)?);
        }
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<FlatRow>) -> Self {
        Self { rows: dedup_keep_last(rows) }
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn all(&self) -> FilteredView<'_> {
        FilteredView { row_ix: (0..self.rows.len()).collect(), raw: &self.rows }
    }

    pub fn filter(&self, filters: &Filters) -> FilteredView<'_> {
        let row_ix = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filters.matches(row))
            .map(|(i, _)| i)
            .collect();
        FilteredView { row_ix, raw: &self.rows }
    }

    /// Sorted distinct non-null values of `column` (option lists).
    pub fn distinct(&self, column: TextColumn) -> Vec<String> {
        let mut values: Vec<String> = self
            .rows
            .iter()
            .filter_map(|r| column.get(r))
            .collect::<HashSet<_>>()
            .into_iter()
            .map(str::to_owned)
            .collect();
        values.sort();
        values
    }

    /// Years present in the catalog, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.rows.iter().filter_map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Categorical text columns that can be used for exact-match filtering and
/// breakdowns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextColumn {
    OrganoNivel1,
    OrganoNivel2,
    OrganoNivel3,
    Kind,
    Instrument,
    Beneficiary,
    Sector,
    Region,
}

impl TextColumn {
    pub fn get(self, row: &FlatRow) -> Option<&str> {
        match self {
            TextColumn::OrganoNivel1 => row.organo_nivel1.as_deref(),
            TextColumn::OrganoNivel2 => row.organo_nivel2.as_deref(),
            TextColumn::OrganoNivel3 => row.organo_nivel3.as_deref(),
            TextColumn::Kind => row.tipo_convocatoria.as_deref(),
            TextColumn::Instrument => row.instrumento_descripcion.as_deref(),
            TextColumn::Beneficiary => row.tipo_beneficiario_descripcion.as_deref(),
            TextColumn::Sector => row.sector_descripcion.as_deref(),
            TextColumn::Region => row.region_descripcion.as_deref(),
        }
    }
}

/* ---------------- Filters ---------------- */

/// Inclusive date bounds. An unset bound is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    fn contains(&self, cell: Option<&str>) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(date) = cell.and_then(parse_date) else { return false };
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Every field is a predicate; unset/empty predicates accept all rows.
/// A null cell never satisfies a set predicate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filters {
    pub years: Vec<i32>,
    pub codes: Vec<String>,
    /// Case-insensitive substring of `descripcion`.
    pub search: Option<String>,
    pub received: DateRange,
    /// `fechaInicioSolicitud >= apply_from`
    pub apply_from: Option<NaiveDate>,
    /// `fechaFinSolicitud <= apply_to`
    pub apply_to: Option<NaiveDate>,
    pub organo_nivel1: Vec<String>,
    pub organo_nivel2: Vec<String>,
    pub regions: Vec<String>,
    pub sectors: Vec<String>,
    pub beneficiaries: Vec<String>,
    pub kinds: Vec<String>,
    pub min_budget: Option<f64>,
    pub max_budget: Option<f64>,
    pub open: Option<bool>,
}

impl Filters {
    /// "865179, 865180" → ["865179", "865180"]
    pub fn parse_codes(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn matches(&self, row: &FlatRow) -> bool {
        if !self.years.is_empty() && !row.year.is_some_and(|y| self.years.contains(&y)) {
            return false;
        }
        if !one_of(&self.codes, row.codigo_bdns.as_deref()) {
            return false;
        }
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let hit = row
                .descripcion
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if !self.received.contains(row.fecha_recepcion.as_deref()) {
            return false;
        }
        let starts = DateRange { from: self.apply_from, to: None };
        if !starts.contains(row.fecha_inicio_solicitud.as_deref()) {
            return false;
        }
        let ends = DateRange { from: None, to: self.apply_to };
        if !ends.contains(row.fecha_fin_solicitud.as_deref()) {
            return false;
        }

        let sets = [
            (&self.organo_nivel1, TextColumn::OrganoNivel1),
            (&self.organo_nivel2, TextColumn::OrganoNivel2),
            (&self.regions, TextColumn::Region),
            (&self.sectors, TextColumn::Sector),
            (&self.beneficiaries, TextColumn::Beneficiary),
            (&self.kinds, TextColumn::Kind),
        ];
        if !sets.iter().all(|(wanted, col)| one_of(wanted, col.get(row))) {
            return false;
        }

        if self.min_budget.is_some() || self.max_budget.is_some() {
            let Some(budget) = row.presupuesto_total else { return false };
            if self.min_budget.is_some_and(|min| budget < min) {
                return false;
            }
            if self.max_budget.is_some_and(|max| budget > max) {
                return false;
            }
        }

        match self.open {
            Some(wanted) => row.abierto == Some(wanted),
            None => true,
        }
    }
}

fn one_of(wanted: &[String], cell: Option<&str>) -> bool {
    wanted.is_empty() || cell.is_some_and(|c| wanted.iter().any(|w| w == c))
}

/// `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/* ---------------- Views & aggregates ---------------- */

/// Zero-copy filtered view: positions of kept rows in the catalog.
#[derive(Clone, Debug)]
pub struct FilteredView<'a> {
    pub row_ix: Vec<usize>,
    raw: &'a [FlatRow],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub records: usize,
    pub unique_codes: usize,
    pub budget_sum: f64,
    /// Mean over rows that have a budget; `None` if none do.
    pub budget_mean: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct YearSummary {
    pub year: i32,
    pub summary: Summary,
    pub first_received: Option<NaiveDate>,
    pub last_received: Option<NaiveDate>,
    pub open: usize,
    pub closed: usize,
    pub top_regions: Vec<(String, usize)>,
    pub top_sectors: Vec<(String, usize)>,
}

impl<'a> FilteredView<'a> {
    pub fn len(&self) -> usize {
        self.row_ix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ix.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a FlatRow> + '_ {
        self.row_ix.iter().filter_map(|&ix| self.raw.get(ix))
    }

    pub fn summary(&self) -> Summary {
        summarize(self.rows())
    }

    /// Per-year breakdown, ascending; rows without a year are left out.
    pub fn by_year(&self) -> Vec<YearSummary> {
        let mut groups: BTreeMap<i32, Vec<&FlatRow>> = BTreeMap::new();
        for row in self.rows() {
            if let Some(year) = row.year {
                groups.entry(year).or_default().push(row);
            }
        }

        groups
            .into_iter()
            .map(|(year, rows)| {
                let dates: Vec<NaiveDate> = rows
                    .iter()
                    .filter_map(|r| r.fecha_recepcion.as_deref().and_then(parse_date))
                    .collect();
                YearSummary {
                    year,
                    summary: summarize(rows.iter().copied()),
                    first_received: dates.iter().min().copied(),
                    last_received: dates.iter().max().copied(),
                    open: rows.iter().filter(|r| r.abierto == Some(true)).count(),
                    closed: rows.iter().filter(|r| r.abierto == Some(false)).count(),
                    top_regions: top_counts(&rows, TextColumn::Region, TOP_N),
                    top_sectors: top_counts(&rows, TextColumn::Sector, TOP_N),
                }
            })
            .collect()
    }

    /// CSV with a header line, in persisted column order. Returns rows written.
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<usize, csv::Error> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        wtr.write_record(COLUMNS)?;
        let mut written = 0;
        for row in self.rows() {
            wtr.serialize(row)?;
            written += 1;
        }
        wtr.flush()?;
        Ok(written)
    }
}

fn summarize<'r>(rows: impl Iterator<Item = &'r FlatRow>) -> Summary {
    let mut records = 0;
    let mut codes = HashSet::new();
    let mut budget_sum = 0.0;
    let mut budgeted = 0usize;
    for row in rows {
        records += 1;
        if let Some(code) = row.codigo_bdns.as_deref() {
            codes.insert(code);
        }
        if let Some(b) = row.presupuesto_total {
            budget_sum += b;
            budgeted += 1;
        }
    }
    Summary {
        records,
        unique_codes: codes.len(),
        budget_sum,
        budget_mean: (budgeted > 0).then(|| budget_sum / budgeted as f64),
    }
}

/// Most frequent non-null values, count descending, ties by first appearance.
pub fn top_counts(rows: &[&FlatRow], column: TextColumn, n: usize) -> Vec<(String, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in rows.iter().filter_map(|r| column.get(r)) {
        let slot = counts.entry(value).or_insert(0);
        if *slot == 0 {
            order.push(value);
        }
        *slot += 1;
    }
    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|v| (v.to_owned(), counts[v]))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

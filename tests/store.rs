// tests/store.rs
mod common;

use std::fs::File;
use std::sync::Arc;

use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use bdns_scrape::columnar;
use bdns_scrape::store::{dedup_keep_last, PartitionStore};
use common::{items, record, row, rows_of};
use parquet::arrow::ArrowWriter;
use tempfile::tempdir;

#[test]
fn file_name_follows_prefix_and_year() {
    let store = PartitionStore::new("/tmp/out", "bdns");
    assert_eq!(store.path_for(2024), std::path::Path::new("/tmp/out/bdns_2024.parquet"));
}

#[test]
fn flushing_twice_matches_flushing_once() {
    let dir = tempdir().unwrap();
    let once = PartitionStore::new(dir.path().join("once"), "bdns");
    let twice = PartitionStore::new(dir.path().join("twice"), "bdns");
    let rows = vec![row("1", 2024, "a"), row("2", 2024, "b"), row("3", 2024, "c")];

    once.flush(2024, rows.clone()).unwrap();
    twice.flush(2024, rows.clone()).unwrap();
    let report = twice.flush(2024, rows.clone()).unwrap().unwrap();

    assert_eq!(report.appended, 3);
    assert_eq!(report.total, 3);
    assert_eq!(once.load(2024).unwrap(), twice.load(2024).unwrap());
    assert_eq!(twice.load(2024).unwrap(), rows);
}

#[test]
fn multi_row_announcement_collapses_on_first_merge() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    let mut rec = record(865179, "2024-03-15");
    rec.instrumentos = items(&["Subvención", "Préstamo"]);
    let rows = rows_of(&rec);
    assert_eq!(rows.len(), 2);

    // a first write stores the rows as given
    let first = store.flush(2024, rows.clone()).unwrap().unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(store.load(2024).unwrap(), rows);

    // merging keeps one row per identifier, the last one
    let second = store.flush(2024, rows.clone()).unwrap().unwrap();
    assert_eq!(second.total, 1);
    let stored = store.load(2024).unwrap();
    assert_eq!(stored, vec![rows[1].clone()]);

    let third = store.flush(2024, rows).unwrap().unwrap();
    assert_eq!(third.total, 1);
    assert_eq!(store.load(2024).unwrap(), stored);
}

#[test]
fn newer_row_replaces_stored_one() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    store.flush(2023, vec![row("X", 2023, "V1"), row("Y", 2023, "keep")]).unwrap();
    store.flush(2023, vec![row("X", 2023, "V2")]).unwrap();

    let stored = store.load(2023).unwrap();
    assert_eq!(stored.len(), 2);
    let x = stored.iter().find(|r| r.codigo_bdns.as_deref() == Some("X")).unwrap();
    assert_eq!(x.descripcion.as_deref(), Some("V2"));
    assert_eq!(stored[0].codigo_bdns.as_deref(), Some("Y"));
}

#[test]
fn empty_flush_writes_nothing() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path().join("data"), "bdns");
    assert!(store.flush(2024, Vec::new()).unwrap().is_none());
    assert!(!store.dir().exists());
}

#[test]
fn resume_is_one_past_highest_identifier() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    assert_eq!(store.resume_point().unwrap(), None);

    store.flush(2022, vec![row("100", 2022, "a"), row("200", 2022, "b")]).unwrap();
    store.flush(2023, vec![row("105", 2023, "c")]).unwrap();
    assert_eq!(store.max_identifier().unwrap(), Some(200));
    assert_eq!(store.resume_point().unwrap(), Some(201));
}

#[test]
fn partitions_ignore_unrelated_files() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    store.flush(2021, vec![row("1", 2021, "a")]).unwrap();
    store.flush(2019, vec![row("2", 2019, "b")]).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
    std::fs::write(dir.path().join("other_2020.parquet"), "x").unwrap();

    let years: Vec<i32> = store.partitions().unwrap().into_iter().map(|(y, _)| y).collect();
    assert_eq!(years, vec![2019, 2021]);
}

#[test]
fn clean_rewrites_only_partitions_with_duplicates() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    store.write(2020, &[row("1", 2020, "old"), row("2", 2020, "b"), row("1", 2020, "new")]).unwrap();
    store.write(2021, &[row("3", 2021, "c")]).unwrap();

    let reports = store.clean().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!((reports[0].year, reports[0].removed()), (2020, 1));
    assert_eq!((reports[1].year, reports[1].removed()), (2021, 0));

    let cleaned = store.load(2020).unwrap();
    let descs: Vec<_> = cleaned.iter().map(|r| r.descripcion.clone().unwrap()).collect();
    assert_eq!(descs, ["b", "new"]);
}

#[test]
fn dedup_keeps_last_and_preserves_order() {
    let rows = vec![row("a", 2020, "1"), row("b", 2020, "2"), row("a", 2020, "3"), row("c", 2020, "4")];
    let descs: Vec<_> = dedup_keep_last(rows).into_iter().map(|r| r.descripcion.unwrap()).collect();
    assert_eq!(descs, ["2", "3", "4"]);
}

#[test]
fn projected_read_returns_only_identifiers() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");
    store.flush(2024, vec![row("10", 2024, "a"), row("11", 2024, "b")]).unwrap();

    let batches = columnar::read_columns(&store.path_for(2024), &["codigoBDNS"]).unwrap();
    assert!(batches.iter().all(|b| b.num_columns() == 1));
    assert_eq!(
        store.identifiers(2024).unwrap(),
        vec![Some("10".to_string()), Some("11".to_string())]
    );
}

#[test]
fn foreign_files_with_numeric_codes_still_load() {
    let dir = tempdir().unwrap();
    let store = PartitionStore::new(dir.path(), "bdns");

    let codes: ArrayRef = Arc::new(Int64Array::from(vec![Some(700), Some(950), None]));
    let descs: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None, Some("c")]));
    let batch = RecordBatch::try_from_iter([("codigoBDNS", codes), ("descripcion", descs)]).unwrap();
    let file = File::create(store.path_for(2018)).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    assert_eq!(store.resume_point().unwrap(), Some(951));
    let rows = store.load(2018).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].codigo_bdns.as_deref(), Some("700"));
    assert_eq!(rows[1].descripcion, None);
    assert_eq!(rows[2].year, None);
}

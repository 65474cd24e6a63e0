// tests/buffer.rs
mod common;

use bdns_scrape::buffer::YearBuffer;
use bdns_scrape::rows::FlatRow;
use common::{record, row, rows_of};

#[test]
fn rows_land_in_their_year_in_arrival_order() {
    let mut buf = YearBuffer::new();
    buf.add_rows([row("1", 2023, "a"), row("2", 2024, "b"), row("3", 2023, "c")]);

    assert_eq!(buf.years(), vec![2023, 2024]);
    let codes: Vec<_> = buf.peek(2023).iter().map(|r| r.codigo_bdns.clone().unwrap()).collect();
    assert_eq!(codes, ["1", "3"]);
    assert_eq!(buf.pending(), 3);
}

#[test]
fn undated_rows_are_dropped() {
    let mut buf = YearBuffer::new();
    let undated = record(5, "15/03/2024");
    let kept = buf.add_rows(rows_of(&undated));
    assert_eq!(kept, 0);
    assert!(buf.is_empty());

    let kept = buf.add_rows([FlatRow::default(), row("6", 2020, "x")]);
    assert_eq!(kept, 1);
    assert_eq!(buf.total(), 1);
}

#[test]
fn draining_empties_one_year_and_keeps_total() {
    let mut buf = YearBuffer::new();
    buf.add_rows([row("1", 2023, "a"), row("2", 2024, "b")]);

    let drained = buf.drain_partition(2023);
    assert_eq!(drained.len(), 1);
    assert!(buf.peek(2023).is_empty());
    assert_eq!(buf.years(), vec![2024]);
    assert_eq!(buf.pending(), 1);
    assert_eq!(buf.total(), 2);

    assert!(buf.drain_partition(1999).is_empty());
}

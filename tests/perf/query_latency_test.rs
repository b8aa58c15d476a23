use std::time::Instant;

use crate::autocomplete::{AutoComplete, StoreSource};
use crate::model::{PlaceRecord, SearchStatus};
use crate::places_store;
use crate::prefs::PrefBranch;

fn p95_ms(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

#[test]
fn warm_search_p95_under_250ms() {
    let db = places_store::open_memory().unwrap();
    for i in 0..5_000_i64 {
        let record = PlaceRecord::new(
            &format!("http://docs.example.com/document_{i:05}.html"),
            &format!("Document {i:05}"),
        )
        .with_visits(1 + i % 7, 10_000 - i);
        places_store::upsert_place(&db, &record).unwrap();
    }
    places_store::upsert_place(
        &db,
        &PlaceRecord::new("http://reports.example.com/q4", "Q4 Report").with_visits(3, 50),
    )
    .unwrap();

    let mut autocomplete = AutoComplete::new(PrefBranch::new(), StoreSource::Connection(db));
    for _ in 0..5 {
        let _ = autocomplete.search_blocking("q4 rep", "");
    }

    let mut samples = Vec::with_capacity(30);
    for _ in 0..30 {
        let start = Instant::now();
        let result = autocomplete.search_blocking("q4 rep", "");
        samples.push(start.elapsed().as_secs_f64() * 1000.0);
        assert_eq!(result.status, SearchStatus::Success);
    }

    let p95 = p95_ms(&mut samples);
    assert!(p95 <= 250.0, "search p95 too high: {p95:.3}ms (budget 250.0ms)");
}

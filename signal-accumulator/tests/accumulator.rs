use std::collections::HashSet;
use std::sync::Once;

use rstest::rstest;
use serde_json::{json, Value};
use signal_accumulator::{AccumulatorError, Meta, SignalAccumulator};

static TRACING_INIT: Once = Once::new();
fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

fn meta(max_size: usize) -> Meta {
    Meta::new("readingId", "vehicleId", "timestamp", max_size).unwrap()
}

fn el(signal: &str, id: &str, timestamp: f64) -> Value {
    json!({"vehicleId": signal, "readingId": id, "timestamp": timestamp})
}

fn ids(accumulator: &SignalAccumulator, signal: &str) -> Vec<String> {
    accumulator
        .signal_ids(signal)
        .map(|ids| ids.to_vec())
        .unwrap_or_default()
}

fn split(ids: &str) -> Vec<String> {
    ids.split(',').map(String::from).collect()
}

#[test]
fn test_from_batch_drops_duplicates_and_malformed_records() {
    setup_tracing();
    let records = vec![
        el("...-632d-...", "a", 1.0),
        el("...-4e7b-...", "b", 1.0),
        el("...-632d-...", "c", 1.0),
        el("...-632d-...", "d", 1.0),
        el("...-632d-...", "e", 1.0),
        el("...-632d-...", "f", 1.0),
        el("...-4e7b-...", "g", 1.0),
        el("...-632d-...", "h", 1.0),
        el("...-632d-...", "i", 1.0),
        el("...-632d-...", "j", 1.0),
        el("...-632d-...", "j", 1.0), // duplicate
        el("...-632d-...", "k", 1.0),
        json!({"vehicleId": true, "readingId": "z", "timestamp": 1}),
        json!({"vehicleId": "...-632d-...", "readingId": {"foo": "bar"}, "timestamp": 1}),
        el("...-632d-...", "l", 1.0),
    ];

    let accumulator = SignalAccumulator::from_batch(meta(1_000), &records).unwrap();

    assert_eq!(accumulator.count(), 12);
    assert_eq!(ids(&accumulator, "...-632d-..."), split("a,c,d,e,f,h,i,j,k,l"));
    assert_eq!(ids(&accumulator, "...-4e7b-..."), split("b,g"));
    assert_eq!(accumulator.bounds(), Some((1.0, 1.0)));

    let expected: Vec<&Value> = records[..10]
        .iter()
        .chain([&records[11], &records[14]])
        .collect();
    assert_eq!(accumulator.records(), expected);
}

#[test]
fn test_sequential_merges_under_capacity() {
    setup_tracing();
    let first = SignalAccumulator::from_batch(
        meta(1_000),
        &[
            el("cabF", "f1", 1.0),
            el("cabF", "f2", 1.0),
            el("cabF", "f3", 1.0),
            el("cabB", "b1", 1.0),
        ],
    )
    .unwrap();
    let second = first
        .add(&[
            el("cabF", "f1", 1.0),
            el("cabF", "f4", 1.0),
            el("cabB", "b2", 1.0),
            el("new", "n1", 1.0),
        ])
        .unwrap();
    let all = second
        .add(&[el("cabB", "b3", 1.0), el("more", "m1", 1.0)])
        .unwrap();

    assert_eq!(ids(&all, "cabF"), split("f1,f2,f3,f4"));
    assert_eq!(ids(&all, "cabB"), split("b1,b2,b3"));
    assert_eq!(ids(&all, "new"), split("n1"));
    assert_eq!(ids(&all, "more"), split("m1"));
    assert_eq!(
        all.signals().collect::<Vec<_>>(),
        vec!["cabF", "cabB", "new", "more"]
    );
    assert_eq!(all.count(), 9);
}

#[test]
fn test_downsamples_when_size_exceeds_max() {
    setup_tracing();
    let initial = vec![
        el("cabF", "f0", 100.0),
        el("cabF", "f1", 100.0),
        el("cabF", "f2", 100.0),
        el("cabF", "f3", 100.0),
        el("cabF", "f4", 100.0),
        el("cabF", "f5", 110.0),
        el("cabF", "f6", 500.0),
        el("cabF", "f7", 500.0),
        el("cabF", "f8", 510.0),
        el("cabF", "f9", 600.0),
        el("cabB", "b0", 0.0),
        el("cabB", "b1", 100.0),
        el("cabB", "b2", 200.0),
        el("cabB", "b3", 300.0),
        el("cabB", "b4", 400.0),
        el("cabB", "b5", 500.0),
        el("cabB", "b6", 600.0),
        el("cabB", "b7", 700.0),
        el("cabB", "b8", 800.0),
        el("cabB", "b9", 900.0),
    ];
    let accumulator = SignalAccumulator::from_batch(meta(initial.len()), &initial).unwrap();
    assert_eq!(accumulator.count(), initial.len());

    let updated = accumulator
        .add(&[
            el("cabF", "f10", 600.0),
            el("cabF", "f11", 600.0),
            el("cabF", "f11", 600.0),
            el("cabF", "f12", 600.0),
            el("cabF", "f13", 600.0),
            el("cabF", "f14", 900.0),
            el("cabF", "f15", 1_600.0),
            el("cabB", "b10", 100.0),
            el("cabB", "b11", 100.0),
            el("cabB", "b12", 100.0),
            el("cabB", "b13", 1_000.0),
            el("cabB", "b14", 1_001.0),
            el("cabB", "b15", 2_000.0),
        ])
        .unwrap();

    assert!(updated.count() <= initial.len());
    assert_eq!(ids(&updated, "cabB"), split("b0,b2,b4,b6,b8,b13,b15"));
    assert_eq!(ids(&updated, "cabF"), split("f0,f6,f9,f14,f15"));
    assert_eq!(updated.count(), 12);
    assert_eq!(updated.bounds(), Some((0.0, 2_000.0)));

    let cab_f: Vec<&Value> = updated
        .records()
        .into_iter()
        .filter(|record| record["vehicleId"] == "cabF")
        .collect();
    assert_eq!(
        cab_f,
        vec![
            &el("cabF", "f0", 100.0),
            &el("cabF", "f6", 500.0),
            &el("cabF", "f9", 600.0),
            &el("cabF", "f14", 900.0),
            &el("cabF", "f15", 1_600.0),
        ]
    );

    // the previous accumulator is left as it was
    assert_eq!(accumulator.count(), initial.len());
    assert_eq!(ids(&accumulator, "cabF").len(), 10);
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let accumulator = SignalAccumulator::from_batch(
        meta(10),
        &[el("a", "a1", 1.0), el("b", "b1", 5.0)],
    )
    .unwrap();

    let unchanged = accumulator.add(&[]).unwrap();
    assert_eq!(unchanged, accumulator);

    let only_garbage = accumulator
        .add(&[json!({"vehicleId": "a"}), json!(42)])
        .unwrap();
    assert_eq!(only_garbage, accumulator);
    assert_eq!(only_garbage.bounds(), Some((1.0, 5.0)));
}

#[test]
fn test_empty_accumulator_from_empty_batch() {
    let accumulator = SignalAccumulator::<Value>::from_batch(meta(10), &[]).unwrap();

    assert!(accumulator.is_empty());
    assert_eq!(accumulator.bounds(), None);
    assert!(accumulator.materialize().is_empty());
}

#[test]
fn test_first_write_wins_on_duplicate_id() {
    let accumulator =
        SignalAccumulator::from_batch(meta(10), &[el("a", "x", 1.0)]).unwrap();

    let merged = accumulator
        .add(&[el("b", "x", 50.0), el("a", "y", 2.0)])
        .unwrap();

    let kept = merged.get("x").unwrap();
    assert_eq!(kept.signal, "a");
    assert_eq!(kept.timestamp, 1.0);
    assert_eq!(kept.record, el("a", "x", 1.0));
    assert_eq!(ids(&merged, "b"), Vec::<String>::new());
    assert_eq!(merged.count(), 2);
    assert_eq!(merged.bounds(), Some((1.0, 2.0)));
}

#[test]
fn test_duplicates_do_not_trigger_downsampling() {
    let records: Vec<Value> = (0..4).map(|i| el("a", &format!("a{i}"), f64::from(i))).collect();
    let full = SignalAccumulator::from_batch(meta(4), &records).unwrap();

    let merged = full.add(&records).unwrap();

    assert_eq!(merged, full);
}

#[test]
fn test_too_many_signals_for_capacity() {
    let accumulator = SignalAccumulator::from_batch(
        meta(2),
        &[el("a", "a1", 1.0), el("b", "b1", 2.0)],
    )
    .unwrap();

    let err = accumulator.add(&[el("a", "a2", 3.0)]).unwrap_err();

    assert_eq!(
        err,
        AccumulatorError::TooManySignals {
            signal_count: 2,
            max_size: 2
        }
    );
    assert_eq!(accumulator.count(), 2);
}

#[test]
fn test_degenerate_time_range_fails() {
    let records: Vec<Value> = (0..5).map(|i| el("a", &format!("a{i}"), 7.0)).collect();

    let err = SignalAccumulator::from_batch(meta(3), &records).unwrap_err();

    assert_eq!(
        err,
        AccumulatorError::DegenerateTimeRange { min: 7.0, max: 7.0 }
    );
}

/// Deterministic pseudo random batches spread over `signals` signals.
fn batch(seed: u64, len: usize, signals: u64, span: u64) -> Vec<Value> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let signal = format!("s{}", (state >> 33) % signals);
            let id = format!("r{}", (state >> 17) % 5_000);
            let timestamp = ((state >> 40) % span) as f64;
            el(&signal, &id, timestamp)
        })
        .collect()
}

#[rstest]
#[case::roomy(1_000, 3, 50)]
#[case::tight(20, 2, 40)]
#[case::many_signals(60, 7, 30)]
#[case::single_signal(10, 1, 25)]
fn test_merges_respect_capacity_and_fairness(
    #[case] max_size: usize,
    #[case] signals: u64,
    #[case] batch_len: usize,
) {
    setup_tracing();
    let mut accumulator: SignalAccumulator = SignalAccumulator::new(meta(max_size));

    for round in 0..12u64 {
        let records = batch(round, batch_len, signals, 1_000 * (round + 1));
        let before = accumulator.clone();

        let new_ids: HashSet<&str> = records
            .iter()
            .filter_map(|r| r["readingId"].as_str())
            .filter(|id| !before.contains(id))
            .collect();
        let downsampled = before.count() + new_ids.len() > max_size;

        accumulator = before.add(&records).unwrap();

        accumulator.check_invariants().unwrap();
        assert!(accumulator.count() <= max_size);
        assert_eq!(accumulator.materialize().len(), accumulator.count());

        let listed: usize = accumulator
            .signals()
            .map(|signal| ids(&accumulator, signal).len())
            .sum();
        assert_eq!(listed, accumulator.count());

        if downsampled {
            let signal_count = before
                .signals()
                .map(String::from)
                .chain(records.iter().filter_map(|r| r["vehicleId"].as_str().map(String::from)))
                .collect::<HashSet<_>>()
                .len();
            let quota = max_size / signal_count;
            for signal in accumulator.signals() {
                assert!(
                    ids(&accumulator, signal).len() <= quota,
                    "signal {signal} holds more than {quota} readings"
                );
            }
        } else {
            // plain merges only append
            for signal in before.signals() {
                let old = ids(&before, signal);
                assert_eq!(ids(&accumulator, signal)[..old.len()], old[..]);
            }
        }

        // bounds only ever widen
        if let (Some((old_min, old_max)), Some((min, max))) =
            (before.bounds(), accumulator.bounds())
        {
            assert!(min <= old_min && max >= old_max);
        }
    }
}

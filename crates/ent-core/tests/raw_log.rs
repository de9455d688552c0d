use ent_core::{EntError, RawLog, Sample, KELVIN_OFFSET};

fn sample(time: f64, capacity: f64, cycle: i64) -> Sample {
    Sample {
        elapsed_time_h: time,
        capacity_ah: capacity,
        cycle_count: cycle,
        cyc_count: cycle,
        ..Sample::default()
    }
}

#[test]
fn time_order_is_validated() {
    let ordered = vec![sample(0.0, 0.0, 1), sample(0.5, 0.1, 1), sample(0.5, 0.2, 2)];
    assert!(RawLog::from_ordered(ordered).is_ok());

    let unordered = vec![sample(0.0, 0.0, 1), sample(1.0, 0.1, 1), sample(0.9, 0.2, 1)];
    let err = RawLog::from_ordered(unordered).expect_err("decreasing time");
    assert!(matches!(err, EntError::Config(_)));
    assert_eq!(err.info().context.get("row").map(String::as_str), Some("2"));
}

#[test]
fn capacity_helpers_cover_span_and_max() {
    let log = RawLog::new(vec![
        sample(0.0, -0.4, 1),
        sample(1.0, 1.1, 1),
        sample(2.0, 0.3, 2),
    ]);
    assert_eq!(log.max_capacity(), Some(1.1));
    assert!((log.capacity_span().expect("span") - 1.5).abs() < 1e-12);
    assert_eq!(log.final_cycle_count(), Some(2));
    assert_eq!(RawLog::default().capacity_span(), None);
}

#[test]
fn slice_copies_rows() {
    let log = RawLog::new((0..5).map(|i| sample(i as f64, 0.0, 1)).collect());
    let part = log.slice(1..3);
    assert_eq!(part.len(), 2);
    assert_eq!(part.times(), vec![1.0, 2.0]);
}

#[test]
fn kelvin_conversion_and_relaxation_flag() {
    let mut s = sample(0.0, 0.0, 1);
    s.temperature_c = 25.0;
    assert!((s.temperature_k() - (25.0 + KELVIN_OFFSET)).abs() < 1e-12);
    assert!((s.temperature_k() - 298.15).abs() < 1e-12);
    assert!(s.is_relaxing());
    s.current_a = -0.5;
    assert!(!s.is_relaxing());
}

use ent_core::{RawLog, Sample};
use ent_fit::{filter_relaxation, segment_socs};
use proptest::prelude::*;

fn log_from_lengths(lengths: &[usize]) -> RawLog {
    let mut samples = Vec::new();
    let mut time = 0.0;
    for (soc, len) in lengths.iter().enumerate() {
        let cycle = soc as i64 + 1;
        for row in 0..*len {
            samples.push(Sample {
                elapsed_time_h: time,
                voltage_v: 3.0 + 0.01 * row as f64,
                cycle_count: cycle,
                cyc_count: if row == 0 && soc > 0 { cycle - 1 } else { cycle },
                ..Sample::default()
            });
            time += 0.5;
        }
    }
    RawLog::new(samples)
}

proptest! {
    #[test]
    fn windows_concatenate_back_to_the_log(lengths in prop::collection::vec(2usize..20, 1..8)) {
        let log = log_from_lengths(&lengths);
        if lengths.len() == 1 {
            // a single SOC has no transition to anchor on
            let err = segment_socs(&log).unwrap_err();
            prop_assert_eq!(err.info().code.as_str(), "segment.no_boundaries");
            return Ok(());
        }
        let windows = segment_socs(&log).unwrap();
        prop_assert_eq!(windows.len(), lengths.len());
        for (window, len) in windows.iter().zip(lengths.iter()) {
            prop_assert_eq!(window.len(), *len);
        }
        let rebuilt: Vec<Sample> = windows
            .iter()
            .flat_map(|w| w.rows.samples().iter().copied())
            .collect();
        prop_assert_eq!(rebuilt.as_slice(), log.samples());
    }

    #[test]
    fn relaxation_filter_is_idempotent(voltages in prop::collection::vec(2.5f64..4.2, 0..64)) {
        let log: RawLog = voltages
            .iter()
            .enumerate()
            .map(|(idx, v)| Sample {
                elapsed_time_h: idx as f64,
                voltage_v: *v,
                current_a: 0.0,
                ..Sample::default()
            })
            .collect();
        let (filtered, offsets) = filter_relaxation(&log);
        prop_assert_eq!(&filtered, &log);
        prop_assert_eq!(offsets, (0..log.len()).collect::<Vec<_>>());
        let (again, _) = filter_relaxation(&filtered);
        prop_assert_eq!(again, filtered);
    }
}

#[test]
fn missing_transitions_are_a_segmentation_error() {
    let mut log = log_from_lengths(&[3, 3, 3]).into_samples();
    if let Some(last) = log.last_mut() {
        last.cycle_count = 5;
    }
    let err = segment_socs(&RawLog::new(log)).expect_err("too few boundaries");
    assert_eq!(err.family(), "segmentation");
    assert_eq!(err.info().code, "segment.missing_boundaries");
    assert_eq!(err.info().context.get("expected").map(String::as_str), Some("4"));
}

#[test]
fn trailing_transition_row_stays_in_the_last_window() {
    let mut samples = log_from_lengths(&[3, 3, 4]).into_samples();
    if let Some(last) = samples.last_mut() {
        last.cyc_count = 2;
    }
    let log = RawLog::new(samples);
    let windows = segment_socs(&log).expect("extra boundary ignored");
    assert_eq!(windows.len(), 3);
    let lengths: Vec<usize> = windows.iter().map(|w| w.len()).collect();
    assert_eq!(lengths, vec![3, 3, 4]);
}

#[test]
fn empty_and_non_positive_logs_are_rejected() {
    assert!(segment_socs(&RawLog::default()).is_err());
    let log = RawLog::new(vec![Sample::default(); 4]);
    let err = segment_socs(&log).expect_err("zero cycles");
    assert_eq!(err.info().code, "segment.soc_count");
}

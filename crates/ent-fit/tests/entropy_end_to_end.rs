mod common;

use common::{log_drift, synthetic_log, synthetic_samples, SocShape};
use ent_core::{RawLog, FARADAY};
use ent_fit::{
    analyze_soc, raw_data_entropy, run_experiment, segment_socs, FitOpts, ModelKind, RunOpts,
};

const EXPECTED_ENTROPY: f64 = -FARADAY * (0.010 / 3.0 + 0.020 / 6.0) / 2.0;

#[test]
fn three_plateau_soc_yields_expected_entropy() {
    let log = synthetic_log(2, &SocShape::default());
    let windows = segment_socs(&log).expect("segment");
    let analysis = analyze_soc(&windows[0], 3, &FitOpts::default()).expect("analyse");

    let deltas = &analysis.levels.delta_temperature;
    assert_eq!(deltas.len(), 3);
    for (delta, expected) in deltas.iter().zip([0.0, 3.0, 6.0]) {
        assert!((delta - expected).abs() < 1e-9, "delta {delta}");
    }
    assert!((EXPECTED_ENTROPY + 321.6178).abs() < 1e-3);

    let record = &analysis.record;
    for kind in [ModelKind::LogLinear, ModelKind::LogQuadratic] {
        let entropy = record.model(kind).and_then(|m| m.entropy()).expect("entropy");
        assert!((entropy - EXPECTED_ENTROPY).abs() < 1e-6, "{kind:?}: {entropy}");
    }
    let best = record.best_fit_entropy().expect("best fit");
    assert!((best - EXPECTED_ENTROPY).abs() < 1e-3);
    assert!((record.capacity_ah - 0.1).abs() < 1e-12);
    assert!((record.reference_voltage_v - 3.7).abs() < 1e-12);
    assert!((record.reference_temperature_k - 301.15).abs() < 1e-9);

    let raw = record.raw_entropy.expect("raw entropy");
    assert!((raw - EXPECTED_ENTROPY).abs() < 1e-6);
}

#[test]
fn enthalpy_uses_each_models_own_entropy() {
    let log = synthetic_log(2, &SocShape::default());
    let windows = segment_socs(&log).expect("segment");
    let analysis = analyze_soc(&windows[1], 3, &FitOpts::default()).expect("analyse");
    let record = &analysis.record;
    for outcome in &record.models {
        let Some(estimate) = &outcome.estimate else {
            continue;
        };
        let expected = estimate.entropy * record.reference_temperature_k
            - FARADAY * record.reference_voltage_v;
        assert!((estimate.enthalpy - expected).abs() < 1e-9);
    }
}

#[test]
fn raw_entropy_is_faraday_times_slope() {
    let log = synthetic_log(2, &SocShape::default());
    let windows = segment_socs(&log).expect("segment");
    let analysis = analyze_soc(&windows[0], 3, &FitOpts::default()).expect("analyse");
    let raw = raw_data_entropy(&analysis.levels).expect("slope");
    // plateau voltages rise 0.010 V for every 3 K drop
    assert!((raw - FARADAY * (-0.010 / 3.0)).abs() < 1e-6);
}

#[test]
fn failed_models_are_excluded_from_selection() {
    let shape = SocShape {
        base_voltage: log_drift,
        ..SocShape::default()
    };
    let log = synthetic_log(2, &shape);
    let windows = segment_socs(&log).expect("segment");
    let opts = FitOpts {
        max_evaluations: 1,
        ..FitOpts::default()
    };
    let analysis = analyze_soc(&windows[0], 3, &opts).expect("analyse");
    let record = &analysis.record;

    let failed: Vec<u8> = record.failed_models().map(|m| m.kind.id()).collect();
    assert_eq!(failed, vec![2, 4]);
    assert!(analysis.fit(ModelKind::Exponential).is_none());
    assert!(matches!(
        record.best_fit,
        Some(ModelKind::LogLinear) | Some(ModelKind::LogQuadratic)
    ));
    for kind in [ModelKind::LogLinear, ModelKind::LogQuadratic] {
        let entropy = record.model(kind).and_then(|m| m.entropy()).expect("entropy");
        assert!((entropy - EXPECTED_ENTROPY).abs() < 1e-6);
    }
    assert!(record.raw_entropy.is_some());
}

#[test]
fn broken_soc_is_skipped_and_the_rest_complete() {
    let mut samples = synthetic_samples(3, &SocShape::default());
    for sample in samples.iter_mut().filter(|s| s.cycle_count == 2) {
        sample.plateau_marker = 1;
    }
    let run = run_experiment(&RawLog::new(samples), 3, &FitOpts::default(), &RunOpts::default())
        .expect("run");
    let analysed: Vec<usize> = run.analyses.iter().map(|a| a.record.soc_index).collect();
    assert_eq!(analysed, vec![0, 2]);
    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].soc_index, 1);
    assert_eq!(run.skipped[0].error.family(), "insufficient-data");
    assert_eq!(run.soc_count(), 3);
}

#[test]
fn parallel_run_matches_serial_order() {
    let log = synthetic_log(4, &SocShape::default());
    let serial = run_experiment(&log, 3, &FitOpts::default(), &RunOpts::default()).expect("serial");
    let parallel = run_experiment(
        &log,
        3,
        &FitOpts::default(),
        &RunOpts {
            concurrency: 4,
            ..RunOpts::default()
        },
    )
    .expect("parallel");
    assert_eq!(serial.records(), parallel.records());
    let order: Vec<usize> = parallel.records().iter().map(|r| r.soc_index).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn too_many_levels_is_insufficient_data() {
    let log = synthetic_log(2, &SocShape::default());
    let windows = segment_socs(&log).expect("segment");
    let err = analyze_soc(&windows[0], 4, &FitOpts::default()).expect_err("markers");
    assert_eq!(err.info().code, "plateau.markers");
}

#[test]
fn short_plateaus_cannot_be_averaged() {
    let shape = SocShape {
        rows_per_step: 5,
        ..SocShape::default()
    };
    let log = synthetic_log(2, &shape);
    let windows = segment_socs(&log).expect("segment");
    let err = analyze_soc(&windows[0], 3, &FitOpts::default()).expect_err("too short");
    assert_eq!(err.family(), "insufficient-data");
    assert_eq!(err.info().code, "plateau.too_short");
    assert_eq!(err.info().context.get("width").map(String::as_str), Some("6"));
}

#[test]
fn equal_plateau_temperatures_leave_entropy_undefined() {
    let shape = SocShape {
        temperatures_c: vec![25.0, 25.0, 25.0],
        ..SocShape::default()
    };
    let log = synthetic_log(2, &shape);
    let windows = segment_socs(&log).expect("segment");
    let err = analyze_soc(&windows[0], 3, &FitOpts::default()).expect_err("flat");
    assert_eq!(err.family(), "insufficient-data");
    assert_eq!(err.info().code, "plateau.flat_temperature");
    assert_eq!(err.info().context.get("level").map(String::as_str), Some("1"));
}

#[test]
fn single_soc_log_has_no_boundaries() {
    let log = synthetic_log(1, &SocShape::default());
    let err = run_experiment(&log, 3, &FitOpts::default(), &RunOpts::default())
        .expect_err("no transitions");
    assert_eq!(err.family(), "segmentation");
    assert_eq!(err.info().code, "segment.no_boundaries");
}

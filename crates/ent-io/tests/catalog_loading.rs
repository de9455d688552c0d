mod common;

use std::fs;

use common::entropy_catalog;
use ent_core::{TestType, FARADAY};
use ent_io::{load_catalog, Setup};
use tempfile::tempdir;

const EXPECTED_ENTROPY: f64 = -FARADAY * (0.010 / 3.0 + 0.020 / 6.0) / 2.0;

#[test]
fn catalog_resolves_paths_and_references() {
    let dir = tempdir().expect("tempdir");
    let path = entropy_catalog(dir.path(), 2);
    let catalog = load_catalog(&path).expect("catalog");

    assert_eq!(catalog.base_dir, dir.path());
    assert_eq!(catalog.run.concurrency, 2);
    assert!(catalog.run.export_soc_windows);
    assert_eq!(catalog.fitting.plateau_width, 6);

    let experiment = catalog.experiment("ENT01").expect("experiment");
    assert_eq!(experiment.spec.log_file, dir.path().join("logs/entropy.txt"));
    assert_eq!(experiment.spec.setup, Setup::Workstation);
    assert_eq!(experiment.spec.test_type, TestType::Charge);
    assert_eq!(experiment.channel.voltage_column, "OCV01[mV]");
    assert_eq!(experiment.title(), "ENT01 Charge_LGM50 (150min_28C)");
}

#[test]
fn experiment_analysis_recovers_entropy() {
    let dir = tempdir().expect("tempdir");
    let catalog = load_catalog(entropy_catalog(dir.path(), 2)).expect("catalog");
    let experiment = catalog.experiment("ENT01").expect("experiment");
    let outcome = experiment
        .analyze(&catalog.fitting, &catalog.run)
        .expect("analysis");

    assert_eq!(outcome.run.analyses.len(), 2);
    assert!(outcome.run.skipped.is_empty());
    assert_eq!(outcome.report.title, experiment.title());
    assert_eq!(outcome.report.max_capacity_ah, Some(0.5));

    for (idx, row) in outcome.report.rows.iter().enumerate() {
        assert_eq!(row.soc_index, idx);
        assert!((row.reference_voltage_v - 3.5).abs() < 1e-9);
        let raw = row.raw_entropy.expect("raw entropy");
        assert!((raw - FARADAY * (-0.010 / 3.0)).abs() < 1e-6);
        let log_linear = row.entropy[0].expect("model 1");
        assert!((log_linear - EXPECTED_ENTROPY).abs() < 1e-6, "{log_linear}");
        let best = row.best_fit_entropy.expect("best fit");
        assert!((best - EXPECTED_ENTROPY).abs() < 1e-3);
    }
    let soc: Vec<f64> = outcome
        .report
        .rows
        .iter()
        .filter_map(|row| row.state_of_charge)
        .collect();
    assert_eq!(soc.len(), 2);
    assert!((soc[0] - 0.5).abs() < 1e-12);
    assert!((soc[1] - 1.0).abs() < 1e-12);
}

#[test]
fn expected_profile_has_two_points_per_step() {
    let dir = tempdir().expect("tempdir");
    let catalog = load_catalog(entropy_catalog(dir.path(), 2)).expect("catalog");
    let experiment = catalog.experiment("ENT01").expect("experiment");
    let log = experiment.load_log().expect("log");

    let profile = experiment.expected_temperature_profile(&log);
    assert_eq!(profile.len(), 16);
    assert_eq!(profile[0].time_h, 0.0);
    assert_eq!(profile[1].time_h, 2.5);
    assert_eq!(profile[2].temperature_c, 25.0);
    assert_eq!(profile[15].time_h, 20.0);
    assert_eq!(profile[15].temperature_c, 28.0);
}

#[test]
fn dangling_references_and_duplicates_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = entropy_catalog(dir.path(), 2);
    let original = fs::read_to_string(&path).expect("read");

    let unknown_battery = original.replace("battery: LGM50", "battery: MISSING");
    fs::write(&path, unknown_battery).expect("write");
    let err = load_catalog(&path).expect_err("unknown battery");
    assert_eq!(err.family(), "config");
    assert_eq!(err.info().code, "catalog.unknown_battery");

    let unknown_channel = original.replace("channel: CH00", "channel: CH09");
    fs::write(&path, unknown_channel).expect("write");
    let err = load_catalog(&path).expect_err("unknown channel");
    assert_eq!(err.info().code, "catalog.unknown_channel");

    let duplicate = original.replace(
        "channels:\n",
        "channels:\n  - name: CH00\n    temperature_column: T\n    voltage_column: V\n",
    );
    fs::write(&path, duplicate).expect("write");
    let err = load_catalog(&path).expect_err("duplicate");
    assert_eq!(err.info().code, "catalog.duplicate");

    let one_level = original.replace("number_temperature_level: 3", "number_temperature_level: 1");
    fs::write(&path, one_level).expect("write");
    let err = load_catalog(&path).expect_err("level count");
    assert_eq!(err.info().code, "catalog.level_count");
}

#[test]
fn unknown_experiment_is_config_error() {
    let dir = tempdir().expect("tempdir");
    let catalog = load_catalog(entropy_catalog(dir.path(), 2)).expect("catalog");
    let err = catalog.experiment("ENT99").expect_err("unknown");
    assert_eq!(err.family(), "config");
    assert!(catalog.config_hash().expect("hash").len() > 16);
}

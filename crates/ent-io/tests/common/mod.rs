#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use ent_core::Sample;

pub const TEMPERATURES_C: [f64; 3] = [28.0, 25.0, 22.0];
pub const OFFSETS_V: [f64; 3] = [0.0, 0.010, 0.020];

/// Entropy log with `soc_count` SOCs, each resting 40 rows at every level and
/// returning to the reference level.
pub fn entropy_samples(soc_count: usize) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut time = 0.1;
    for soc in 0..soc_count {
        let cycle = soc as i64 + 1;
        for row in 0..4 {
            samples.push(Sample {
                elapsed_time_h: time,
                current_a: 1.5,
                voltage_v: 3.9,
                temperature_c: TEMPERATURES_C[0],
                capacity_ah: 0.25 * soc as f64 + 0.0625 * (row + 1) as f64,
                cycle_count: cycle,
                cyc_count: if row == 0 && soc > 0 { cycle - 1 } else { cycle },
                plateau_marker: 1,
            });
            time += 0.125;
        }
        let steps = TEMPERATURES_C
            .iter()
            .zip(OFFSETS_V.iter())
            .chain(std::iter::once((&TEMPERATURES_C[0], &OFFSETS_V[0])));
        for (temperature, offset) in steps {
            for row in 0..40 {
                samples.push(Sample {
                    elapsed_time_h: time,
                    current_a: 0.0,
                    voltage_v: 3.5 + offset,
                    temperature_c: *temperature,
                    capacity_ah: 0.25 * cycle as f64,
                    cycle_count: cycle,
                    cyc_count: cycle,
                    plateau_marker: if row == 0 { 0 } else { 1 },
                });
                time += 0.0625;
            }
        }
    }
    samples
}

/// Basytec export of `samples` with millivolt voltages when `millivolts` is set.
pub fn basytec_text(samples: &[Sample], voltage_column: &str, temperature_column: &str, millivolts: bool) -> String {
    let mut text = String::new();
    for line in 0..12 {
        let _ = writeln!(text, "~Preamble line {line}");
    }
    let _ = writeln!(
        text,
        "~Time[h],I[A],Ah[Ah],Count,Cyc-Count,State,{voltage_column},{temperature_column}"
    );
    let scale = if millivolts { 1000.0 } else { 1.0 };
    for s in samples {
        let _ = writeln!(
            text,
            "{},{},{},{},{},{},{},{}",
            s.elapsed_time_h,
            s.current_a,
            s.capacity_ah,
            s.cycle_count,
            s.cyc_count,
            s.plateau_marker,
            s.voltage_v * scale,
            s.temperature_c
        );
    }
    text
}

/// Novonix RPT export whose capacity sweeps `min..=max`.
pub fn novonix_rpt(path: &Path, min: f64, max: f64) {
    let mut text = String::from("[Summary]\nCell: test\n[Data]\n");
    text.push_str("Date and Time,Run Time (h),Current (A),Potential (V),Capacity (Ah),Temperature (°C)\n");
    for step in 0..=10 {
        let capacity = min + (max - min) * step as f64 / 10.0;
        let _ = writeln!(text, "2024-01-01,{},0.5,3.6,{},20.0", step as f64 * 0.2, capacity);
    }
    fs::write(path, text).expect("write novonix");
}

/// Biologic EIS export; `rows` are `(freq, Re, -Im)` in ohms.
pub fn eis_file(path: &Path, rows: &[(f64, f64, f64)]) {
    let mut text = String::from("EC-Lab ASCII FILE\nNb header lines : 4\n\n");
    text.push_str("freq/Hz\tRe(Z)/Ohm\t-Im(Z)/Ohm\t|Z|/Ohm\n");
    for (freq, re, im) in rows {
        let _ = writeln!(text, "{freq}\t{re}\t{im}\t0.0\t");
    }
    fs::write(path, text).expect("write eis");
}

/// Writes a catalog with one workstation entropy experiment on `CH00` and its
/// Basytec log under `logs/`; returns the catalog path.
pub fn entropy_catalog(dir: &Path, soc_count: usize) -> std::path::PathBuf {
    let logs = dir.join("logs");
    fs::create_dir_all(&logs).expect("logs dir");
    let text = basytec_text(&entropy_samples(soc_count), "OCV01[mV]", "MEM02[C]", true);
    fs::write(logs.join("entropy.txt"), text).expect("write log");

    let catalog = r#"
batteries:
  - name: LGM50
    nominal_capacity_mah: 5000
    mass_g: 68.5
channels:
  - name: CH00
    temperature_column: "MEM02[C]"
    voltage_column: "OCV01[mV]"
experiments:
  - name: ENT01
    test_type: charge
    setup: workstation
    battery: LGM50
    channel: CH00
    time_step_min: 150
    number_temperature_level: 3
    temp_ref_c: 28
    temperature_steps_c: [28, 25, 22, 28]
    log_file: logs/entropy.txt
run:
  concurrency: 2
  export_soc_windows: true
"#;
    let path = dir.join("catalog.yaml");
    fs::write(&path, catalog).expect("write catalog");
    path
}

#![allow(dead_code)]

use ent_core::{RawLog, Sample};

/// Shape of one synthetic SOC: a short charge followed by a rest at each
/// temperature level and a final return to the reference level.
pub struct SocShape {
    pub charge_rows: usize,
    pub rows_per_step: usize,
    pub temperatures_c: Vec<f64>,
    pub offsets_v: Vec<f64>,
    pub base_voltage: fn(f64) -> f64,
}

impl Default for SocShape {
    fn default() -> Self {
        Self {
            charge_rows: 5,
            rows_per_step: 40,
            temperatures_c: vec![28.0, 25.0, 22.0],
            offsets_v: vec![0.0, 0.010, 0.020],
            base_voltage: |_| 3.7,
        }
    }
}

pub fn log_drift(t: f64) -> f64 {
    3.7 + 0.002 * t.ln()
}

pub fn synthetic_samples(soc_count: usize, shape: &SocShape) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut time = 0.1;
    for soc in 0..soc_count {
        let cycle = soc as i64 + 1;
        let capacity = 0.1 * cycle as f64;
        for row in 0..shape.charge_rows {
            samples.push(Sample {
                elapsed_time_h: time,
                current_a: 1.0,
                voltage_v: 3.9,
                temperature_c: shape.temperatures_c[0],
                capacity_ah: capacity - 0.1 + 0.1 * (row + 1) as f64 / shape.charge_rows as f64,
                cycle_count: cycle,
                cyc_count: if row == 0 && soc > 0 { cycle - 1 } else { cycle },
                plateau_marker: 1,
            });
            time += 0.1;
        }
        let steps: Vec<(f64, f64)> = shape
            .temperatures_c
            .iter()
            .copied()
            .zip(shape.offsets_v.iter().copied())
            .chain(std::iter::once((shape.temperatures_c[0], shape.offsets_v[0])))
            .collect();
        for (temperature, offset) in steps {
            for row in 0..shape.rows_per_step {
                samples.push(Sample {
                    elapsed_time_h: time,
                    current_a: 0.0,
                    voltage_v: (shape.base_voltage)(time) + offset,
                    temperature_c: temperature,
                    capacity_ah: capacity,
                    cycle_count: cycle,
                    cyc_count: cycle,
                    plateau_marker: if row == 0 { 0 } else { 1 },
                });
                time += 0.05;
            }
        }
    }
    samples
}

pub fn synthetic_log(soc_count: usize, shape: &SocShape) -> RawLog {
    RawLog::new(synthetic_samples(soc_count, shape))
}

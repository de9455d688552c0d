use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ent_core::{RawLog, Sample};
use ent_fit::{analyze_soc, run_experiment, segment_socs, FitOpts, RunOpts};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TEMPERATURES_C: [f64; 4] = [25.0, 20.0, 15.0, 10.0];
const ROWS_PER_STEP: usize = 240;

fn noisy_log(soc_count: usize, seed: u64) -> RawLog {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::new();
    let mut time = 0.1;
    for soc in 0..soc_count {
        let cycle = soc as i64 + 1;
        for row in 0..10 {
            samples.push(Sample {
                elapsed_time_h: time,
                current_a: 0.5,
                voltage_v: 3.8,
                temperature_c: TEMPERATURES_C[0],
                capacity_ah: 0.05 * cycle as f64,
                cycle_count: cycle,
                cyc_count: if row == 0 && soc > 0 { cycle - 1 } else { cycle },
                plateau_marker: 1,
            });
            time += 0.05;
        }
        let relax_start = time;
        let levels = TEMPERATURES_C.iter().chain(std::iter::once(&TEMPERATURES_C[0]));
        for (step, temperature) in levels.enumerate() {
            let offset = if step == TEMPERATURES_C.len() { 0.0 } else { 0.0004 * step as f64 };
            for row in 0..ROWS_PER_STEP {
                let elapsed = time - relax_start + 0.01;
                samples.push(Sample {
                    elapsed_time_h: time,
                    current_a: 0.0,
                    voltage_v: 3.6 + 0.03 * (-elapsed).exp() + offset + rng.gen_range(-2e-5..2e-5),
                    temperature_c: temperature + rng.gen_range(-0.02..0.02),
                    capacity_ah: 0.05 * cycle as f64,
                    cycle_count: cycle,
                    cyc_count: cycle,
                    plateau_marker: if row == 0 { 0 } else { 1 },
                });
                time += 1.0 / 60.0;
            }
        }
    }
    RawLog::new(samples)
}

fn fit_benchmark(c: &mut Criterion) {
    let log = noisy_log(8, 7);
    let windows = segment_socs(&log).expect("segment");
    let opts = FitOpts::default();

    c.bench_function("fit/soc", |b| {
        b.iter(|| {
            let _ = analyze_soc(black_box(&windows[3]), TEMPERATURES_C.len(), black_box(&opts))
                .expect("analyse");
        });
    });

    let run_opts = RunOpts {
        concurrency: 4,
        ..RunOpts::default()
    };
    c.bench_function("fit/experiment_parallel", |b| {
        b.iter(|| {
            let run = run_experiment(black_box(&log), TEMPERATURES_C.len(), &opts, &run_opts)
                .expect("run");
            black_box(run.records());
        });
    });
}

criterion_group!(benches, fit_benchmark);
criterion_main!(benches);

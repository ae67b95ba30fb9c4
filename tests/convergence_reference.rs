use std::env;
use std::f64::consts::PI;
use std::path::PathBuf;

use libtest_mimic::{Arguments, Failed, Trial};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ringcal::report::load_cell_widths_csv;
use ringcal::synthetic::uniform_trigger_times;
use ringcal::{
    CalibrationConfig, CalibrationOutput, CalibrationReport, CalibratorBuilder, CellWidthVector,
    SolverKind, SyntheticConfig, SyntheticEventSource,
};

const DEFAULT_SEED: u64 = 42;
const DEFAULT_TOLERANCE: f64 = 0.05;
const SUITE_NAME: &str = "synthetic_ring_widths_recovered_within_tolerance";

#[derive(Debug, Clone)]
struct Scenario {
    name: &'static str,
    ring_size: usize,
    /// Sine periods of the width pattern around the ring.
    harmonic: usize,
    amplitude: f64,
    /// Reference period, in nominal cells.
    period_cells: f64,
    noise_sigma: f64,
    events: usize,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "ring30_single_harmonic",
            ring_size: 30,
            harmonic: 1,
            amplitude: 0.2,
            period_cells: 10.0,
            noise_sigma: 0.0,
            events: 2000,
        },
        Scenario {
            name: "ring60_second_harmonic_noisy",
            ring_size: 60,
            harmonic: 2,
            amplitude: 0.15,
            period_cells: 12.0,
            noise_sigma: 0.005,
            events: 3000,
        },
    ]
}

fn main() {
    let args = Arguments::from_args();

    let seed = env_u64("RINGCAL_IT_SEED", DEFAULT_SEED);
    let tolerance = env_f64("RINGCAL_IT_TOLERANCE", DEFAULT_TOLERANCE);
    let event_override = env::var("RINGCAL_IT_EVENTS")
        .ok()
        .map(|value| parse_or_panic::<usize>("RINGCAL_IT_EVENTS", &value));

    let mut tests = Vec::new();
    for mut scenario in scenarios() {
        if let Some(events) = event_override {
            scenario.events = events;
        }
        for (label, kind) in [
            ("iterative", SolverKind::Iterative),
            ("least_squares", SolverKind::LeastSquares),
        ] {
            let scenario = scenario.clone();
            let test_name = format!("{SUITE_NAME}::{}::{label}::seed{seed}", scenario.name);
            tests.push(Trial::test(test_name, move || {
                run_scenario(&scenario, kind, seed, tolerance).map_err(Failed::from)
            }));
        }
    }

    let scenario = scenarios().remove(0);
    tests.push(Trial::test(
        format!("{SUITE_NAME}::csv_report_seeds_next_run::seed{seed}"),
        move || run_report_round_trip(&scenario, seed, tolerance).map_err(Failed::from),
    ));

    libtest_mimic::run(&args, tests).exit();
}

fn true_widths(scenario: &Scenario) -> Vec<f64> {
    let n = scenario.ring_size as f64;
    (0..scenario.ring_size)
        .map(|i| {
            1.0 + scenario.amplitude * (2.0 * PI * (scenario.harmonic * i) as f64 / n).sin()
        })
        .collect()
}

fn config(scenario: &Scenario) -> CalibrationConfig {
    let mut config = CalibrationConfig {
        ring_size: scenario.ring_size,
        reference_frequency_hz: 1.0 / (scenario.period_cells * 1e-9),
        cell_width_unit_s: 1e-9,
        ..CalibrationConfig::default()
    };
    config.iterative.span_length_tolerance = 3;
    // Sample i closes cell stop + i + 1; report both solvers in physical cell order.
    config.iterative.output_rotation = 1;
    config.least_squares.output_rotation = 1;
    config.least_squares.min_weight_sum = scenario.period_cells * 0.6;
    config
}

fn source(scenario: &Scenario, seed: u64) -> Result<SyntheticEventSource, String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let times = uniform_trigger_times(scenario.events, 100e-9, &mut rng);
    let widths_s = true_widths(scenario).iter().map(|w| w * 1e-9).collect();
    SyntheticEventSource::new(
        widths_s,
        times,
        SyntheticConfig {
            frequency_hz: 1.0 / (scenario.period_cells * 1e-9),
            amplitude: 1.0,
            noise_sigma: scenario.noise_sigma,
            roi: scenario.ring_size,
            phase: None,
            seed,
        },
    )
    .map_err(|err| format!("{}: synthetic source: {err}", scenario.name))
}

fn calibrate(
    scenario: &Scenario,
    builder: CalibratorBuilder,
    seed: u64,
) -> Result<CalibrationOutput, String> {
    let mut events = source(scenario, seed)?;
    builder
        .build()
        .and_then(|calibrator| calibrator.run(&mut events))
        .map_err(|err| format!("{}: calibration failed: {err}", scenario.name))
}

fn compare_widths(
    scenario: &Scenario,
    observed: &CellWidthVector,
    tolerance: f64,
) -> Result<f64, String> {
    let truth = true_widths(scenario);
    if observed.len() != truth.len() {
        return Err(format!(
            "{}: width count mismatch (expected {}, got {})",
            scenario.name,
            truth.len(),
            observed.len()
        ));
    }
    let sum_sq: f64 = observed
        .as_slice()
        .iter()
        .zip(&truth)
        .map(|(o, t)| (o - t) * (o - t))
        .sum();
    let rms = (sum_sq / truth.len() as f64).sqrt();
    if rms > tolerance {
        return Err(format!(
            "{}: rms deviation {rms:.4} exceeds tolerance {tolerance}",
            scenario.name
        ));
    }
    Ok(rms)
}

fn run_scenario(
    scenario: &Scenario,
    kind: SolverKind,
    seed: u64,
    tolerance: f64,
) -> Result<(), String> {
    let builder = CalibratorBuilder::new(config(scenario)).with_solver_kind(kind);
    let output = calibrate(scenario, builder, seed)?;

    if output.stats.events_processed != scenario.events as u64 {
        return Err(format!(
            "{}: processed {} of {} events",
            scenario.name, output.stats.events_processed, scenario.events
        ));
    }
    let unsupported = output.diagnostics.unsupported_cells();
    if !unsupported.is_empty() {
        return Err(format!(
            "{}: cells without accepted measurements: {unsupported:?}",
            scenario.name
        ));
    }
    let accepted_ratio =
        output.stats.accepted_measurements as f64 / output.stats.spans_considered.max(1) as f64;
    if accepted_ratio < 0.9 {
        return Err(format!(
            "{}: only {:.1}% of spans accepted",
            scenario.name,
            100.0 * accepted_ratio
        ));
    }

    compare_widths(scenario, &output.widths, tolerance).map(|_| ())
}

fn run_report_round_trip(scenario: &Scenario, seed: u64, tolerance: f64) -> Result<(), String> {
    let first = calibrate(
        scenario,
        CalibratorBuilder::new(config(scenario)).with_solver_kind(SolverKind::LeastSquares),
        seed,
    )?;
    let truth = CellWidthVector::from_widths(true_widths(scenario))
        .map_err(|err| format!("{}: truth: {err}", scenario.name))?;
    let report = CalibrationReport::from_output(&first)
        .with_truth(&truth)
        .map_err(|err| format!("{}: report: {err}", scenario.name))?;

    let dir = scratch_dir(seed);
    let csv_path = dir.join("cell_widths.csv");
    report
        .write_csv(&csv_path)
        .map_err(|err| format!("{}: write csv: {err}", scenario.name))?;
    report
        .write_json(&dir.join("cell_widths.json"))
        .map_err(|err| format!("{}: write json: {err}", scenario.name))?;
    let reloaded = load_cell_widths_csv(&csv_path, "cell_width_mean")
        .map_err(|err| format!("{}: reload csv: {err}", scenario.name))?;
    if reloaded != first.widths {
        return Err(format!("{}: csv round trip changed the widths", scenario.name));
    }

    // The seed goes back in the solver's own cell order, one cell behind.
    let seed_widths = reloaded.rotated(scenario.ring_size - 1);
    let second = calibrate(
        scenario,
        CalibratorBuilder::new(config(scenario)).with_seed(seed_widths),
        seed.wrapping_add(1),
    )?;
    let _ = std::fs::remove_dir_all(&dir);
    compare_widths(scenario, &second.widths, tolerance).map(|_| ())
}

fn scratch_dir(seed: u64) -> PathBuf {
    env::temp_dir().join(format!("ringcal_it_{}_{seed}", std::process::id()))
}

fn parse_or_panic<T>(name: &str, value: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().unwrap_or_else(|err| {
        panic!("Invalid value for {}='{}': {}", name, value, err)
    })
}

fn env_f64(name: &str, default: f64) -> f64 {
    match env::var(name) {
        Ok(value) => parse_or_panic(name, &value),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(value) => parse_or_panic(name, &value),
        Err(_) => default,
    }
}

//! Toy Monte-Carlo acquisition: a sine reference sampled by a ring whose true
//! cell widths are known, for exercising the solvers without hardware.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::error::CalibrationError;
use crate::types::{AcquisitionEvent, CalibratedWaveform, CellWidthVector};

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub frequency_hz: f64,
    pub amplitude: f64,
    /// Standard deviation of the Gaussian electronics noise; 0 disables it.
    pub noise_sigma: f64,
    /// Samples read out per event.
    pub roi: usize,
    /// Sine phase in turns; drawn uniformly per event when unset.
    pub phase: Option<f64>,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 30e6,
            amplitude: 1500.0,
            noise_sigma: 0.0,
            roi: 1024,
            phase: None,
            seed: 0,
        }
    }
}

pub struct SyntheticEventSource {
    widths_s: Vec<f64>,
    /// `prefix[k]` is the start time of cell `k` within one ring period.
    prefix: Vec<f64>,
    period_s: f64,
    trigger_times: Vec<f64>,
    next_trigger: usize,
    config: SyntheticConfig,
    /// Electronics noise; absent when `noise_sigma` is 0.
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl SyntheticEventSource {
    /// `widths_s` are the true cell widths in seconds; one event is produced
    /// per trigger time.
    pub fn new(
        widths_s: Vec<f64>,
        trigger_times: Vec<f64>,
        config: SyntheticConfig,
    ) -> Result<Self, CalibrationError> {
        if widths_s.is_empty() {
            return Err(CalibrationError::invalid_input("synthetic ring has no cells"));
        }
        if let Some(w) = widths_s.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(CalibrationError::invalid_input(format!(
                "synthetic cell width {w} must be positive"
            )));
        }
        if config.roi == 0 || config.roi > widths_s.len() {
            return Err(CalibrationError::invalid_input(format!(
                "roi {} must be within 1..={}",
                config.roi,
                widths_s.len()
            )));
        }
        if !(config.frequency_hz.is_finite() && config.frequency_hz > 0.0) {
            return Err(CalibrationError::invalid_input(format!(
                "synthetic frequency {} must be positive",
                config.frequency_hz
            )));
        }
        if !(config.noise_sigma >= 0.0) {
            return Err(CalibrationError::invalid_input("noise sigma must be non-negative"));
        }
        let noise = if config.noise_sigma > 0.0 {
            let normal = Normal::new(0.0, config.noise_sigma).map_err(|e| {
                CalibrationError::invalid_input(format!(
                    "noise sigma {}: {e}",
                    config.noise_sigma
                ))
            })?;
            Some(normal)
        } else {
            None
        };

        let mut prefix = Vec::with_capacity(widths_s.len() + 1);
        let mut acc = 0.0;
        prefix.push(acc);
        for w in &widths_s {
            acc += w;
            prefix.push(acc);
        }
        Ok(Self {
            period_s: acc,
            prefix,
            widths_s,
            trigger_times,
            next_trigger: 0,
            noise,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.widths_s.len()
    }

    pub fn period_s(&self) -> f64 {
        self.period_s
    }

    pub fn remaining(&self) -> usize {
        self.trigger_times.len() - self.next_trigger
    }

    /// True widths normalised to mean 1, the scale every solver reports in.
    pub fn true_relative_widths(&self) -> CellWidthVector {
        let mean = self.period_s / self.widths_s.len() as f64;
        CellWidthVector::from_solution(self.widths_s.iter().map(|w| w / mean).collect())
    }

    /// First cell whose end lies at or after `offset` within the ring period.
    pub fn stop_cell_at(&self, offset: f64) -> usize {
        let n = self.widths_s.len();
        self.prefix[1..]
            .partition_point(|&end| end < offset)
            .min(n - 1)
    }

    /// Times at which the samples of an event triggered at `trigger_time` are
    /// taken. Sample `i` is taken at the end of cell `stop_cell + i`.
    pub fn sample_times(&self, trigger_time: f64) -> (usize, Vec<f64>) {
        let n = self.widths_s.len();
        let full_periods = (trigger_time / self.period_s).floor();
        let offset = trigger_time - full_periods * self.period_s;
        let stop_cell = self.stop_cell_at(offset);

        let mut t = self.prefix[stop_cell] + full_periods * self.period_s;
        let times = (0..self.config.roi)
            .map(|i| {
                t += self.widths_s[(stop_cell + i) % n];
                t
            })
            .collect();
        (stop_cell, times)
    }

    fn generate(&mut self, event_counter: u64, trigger_time: f64) -> AcquisitionEvent {
        let (stop_cell, times) = self.sample_times(trigger_time);
        let phase = match self.config.phase {
            Some(phase) => phase,
            None => self.rng.gen::<f64>(),
        };
        let (amplitude, frequency, noise) =
            (self.config.amplitude, self.config.frequency_hz, self.noise);
        let samples = times
            .iter()
            .map(|&t| {
                let clean = amplitude * (2.0 * PI * (frequency * t + phase)).sin();
                match noise {
                    Some(normal) => clean + self.rng.sample(normal),
                    None => clean,
                }
            })
            .collect();
        AcquisitionEvent {
            event_counter,
            stop_cell,
            waveform: CalibratedWaveform::new(samples),
        }
    }
}

impl Iterator for SyntheticEventSource {
    type Item = AcquisitionEvent;

    fn next(&mut self) -> Option<AcquisitionEvent> {
        let trigger_time = *self.trigger_times.get(self.next_trigger)?;
        let event_counter = self.next_trigger as u64;
        self.next_trigger += 1;
        Some(self.generate(event_counter, trigger_time))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

/// Relative widths `1 + U(-spread, spread)`, rescaled to mean 1.
pub fn uniform_jitter_widths<R: Rng + ?Sized>(ring_size: usize, spread: f64, rng: &mut R) -> Vec<f64> {
    let raw: Vec<f64> = (0..ring_size)
        .map(|_| 1.0 + rng.gen_range(-spread..=spread))
        .collect();
    normalize_mean(raw)
}

/// Relative widths `1 + amplitude * sin(2πi/N)`; already mean 1.
pub fn sinusoidal_widths(ring_size: usize, amplitude: f64) -> Vec<f64> {
    (0..ring_size)
        .map(|i| 1.0 + amplitude * (2.0 * PI * i as f64 / ring_size as f64).sin())
        .collect()
}

/// Cumulative sum of `count` gaps drawn from `U(0, max_gap)`.
pub fn uniform_trigger_times<R: Rng + ?Sized>(count: usize, max_gap: f64, rng: &mut R) -> Vec<f64> {
    let mut t = 0.0;
    (0..count)
        .map(|_| {
            t += rng.gen_range(0.0..=max_gap);
            t
        })
        .collect()
}

fn normalize_mean(mut widths: Vec<f64>) -> Vec<f64> {
    let mean = widths.iter().sum::<f64>() / widths.len().max(1) as f64;
    if mean > 0.0 {
        for w in widths.iter_mut() {
            *w /= mean;
        }
    }
    widths
}

use crate::config::{CalibrationConfig, IterativeConfig};
use crate::error::CalibrationError;
use crate::measurement::{build_weight_vector, MeasurementSpan, Rejection, SpanDecision, WeightVector};
use crate::types::CellWidthVector;

/// Clamp and renormalisation alternate until both bounds hold; in practice
/// one round suffices unless a cell sits right at the clamp.
const MAX_RENORMALIZE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    /// `n0` scaled the cells inside the span, `n1` the cells outside it.
    Applied { n0: f64, n1: f64 },
    Rejected(Rejection),
}

/// Online multiplicative-correction solver.
///
/// Every accepted span pulls its predicted duration onto the nominal one by
/// scaling the cells it covers, while the remaining cells absorb the opposite
/// change so the ring total is (approximately) preserved. Widths are then
/// clamped and renormalised to mean 1.
#[derive(Debug, Clone)]
pub struct IterativeSolver {
    widths: CellWidthVector,
    total: f64,
    nominal_half_period: f64,
    nominal_span_length: usize,
    config: IterativeConfig,
    corrections: Vec<f64>,
}

impl IterativeSolver {
    pub fn new(config: &CalibrationConfig) -> Self {
        let widths = CellWidthVector::uniform(config.ring_size);
        Self {
            total: widths.sum(),
            widths,
            nominal_half_period: config.nominal_half_period(),
            nominal_span_length: config.nominal_span_length(),
            config: config.iterative.clone(),
            corrections: Vec::new(),
        }
    }

    /// Starts from a prior estimate, rescaled to mean 1 and clamped into the
    /// configured width window.
    pub fn with_seed(
        config: &CalibrationConfig,
        seed: CellWidthVector,
    ) -> Result<Self, CalibrationError> {
        if seed.len() != config.ring_size {
            return Err(CalibrationError::invalid_input(format!(
                "seed has {} cells, ring has {}",
                seed.len(),
                config.ring_size
            )));
        }
        let mean = seed.mean();
        if !(mean.is_finite() && mean > 0.0) {
            return Err(CalibrationError::invalid_input(format!(
                "seed mean {mean} cannot be normalised"
            )));
        }
        let mut widths = seed.into_vec();
        for w in widths.iter_mut() {
            *w /= mean;
        }
        let mut solver = Self::new(config);
        if !solver.clamp_and_normalize(&mut widths) {
            return Err(CalibrationError::invalid_input(
                "seed collapses to zero inside the clamp window",
            ));
        }
        solver.total = widths.iter().sum();
        solver.widths = CellWidthVector::from_solution(widths);
        Ok(solver)
    }

    pub fn widths(&self) -> &CellWidthVector {
        &self.widths
    }

    pub fn nominal_half_period(&self) -> f64 {
        self.nominal_half_period
    }

    pub fn config(&self) -> &IterativeConfig {
        &self.config
    }

    /// `n0` of every applied update, in order. Its distance from 1 shrinks as
    /// the estimate converges.
    pub fn corrections(&self) -> &[f64] {
        &self.corrections
    }

    pub fn updates_applied(&self) -> usize {
        self.corrections.len()
    }

    /// Span-length window around the nominal span, then weight construction.
    pub fn validate(&self, span: &MeasurementSpan) -> SpanDecision {
        let length = span.len_samples();
        if length.abs_diff(self.nominal_span_length) > self.config.span_length_tolerance {
            return SpanDecision::Rejected(Rejection::SpanLengthOutOfRange { length });
        }
        match build_weight_vector(span) {
            Ok(weights) => SpanDecision::Accepted(weights),
            Err(reason) => SpanDecision::Rejected(reason),
        }
    }

    pub fn update(&mut self, weights: &WeightVector) -> UpdateOutcome {
        if weights.ring_size() != self.widths.len() {
            return UpdateOutcome::Rejected(Rejection::RingSizeMismatch {
                ring_size: weights.ring_size(),
            });
        }
        let nominal = self.nominal_half_period;
        let measured = weights.dot(self.widths.as_slice());
        if !measured.is_finite()
            || measured < nominal * self.config.min_period_ratio
            || measured > nominal * self.config.max_period_ratio
        {
            return UpdateOutcome::Rejected(Rejection::PeriodOutOfRange { measured });
        }

        let outside_measured = self.total - measured;
        let outside_nominal = self.total - nominal;
        if outside_measured <= 0.0 || outside_nominal <= 0.0 {
            return UpdateOutcome::Rejected(Rejection::DegenerateCompensation);
        }
        let n0 = nominal / measured;
        let n1 = outside_nominal / outside_measured;

        let mut correction = vec![n1; self.widths.len()];
        for (cell, w) in weights.iter() {
            correction[cell] = w * n0 + (1.0 - w) * n1;
        }
        let mut next: Vec<f64> = self
            .widths
            .as_slice()
            .iter()
            .zip(&correction)
            .map(|(c, k)| c * k)
            .collect();

        if !self.clamp_and_normalize(&mut next) {
            return UpdateOutcome::Rejected(Rejection::DegenerateCompensation);
        }
        self.total = next.iter().sum();
        self.widths = CellWidthVector::from_solution(next);
        self.corrections.push(n0);
        UpdateOutcome::Applied { n0, n1 }
    }

    /// Returns false when the vector collapsed and cannot be renormalised.
    fn clamp_and_normalize(&self, widths: &mut [f64]) -> bool {
        let (lo, hi) = (self.config.clamp_min, self.config.clamp_max);
        for _ in 0..MAX_RENORMALIZE_ROUNDS {
            for w in widths.iter_mut() {
                *w = w.clamp(lo, hi);
            }
            let mean = widths.iter().sum::<f64>() / widths.len() as f64;
            if !(mean.is_finite() && mean > 0.0) {
                return false;
            }
            for w in widths.iter_mut() {
                *w /= mean;
            }
            if widths.iter().all(|w| (lo..=hi).contains(w)) {
                return true;
            }
        }
        // Converged to within rounding of the bound; pin the stragglers.
        for w in widths.iter_mut() {
            *w = w.clamp(lo, hi);
        }
        true
    }

    pub fn into_widths(self) -> CellWidthVector {
        self.widths.rotated(self.config.output_rotation)
    }
}

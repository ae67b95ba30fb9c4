use crate::error::CalibrationError;
use crate::measurement::find_zero_crossings;
use crate::pipeline::traits::EventSource;
use crate::types::{sample_to_cell, AcquisitionEvent, CellWidthVector};

/// Per-cell width estimate from the sine slope at zero crossings.
///
/// Near a zero crossing the reference is close to linear, so the voltage step
/// across a cell is proportional to the cell's width. Cheap and local, but
/// biased by amplitude noise; mostly useful as a seed for the iterative solver.
#[derive(Debug, Clone)]
pub struct LocalSlopeEstimator {
    sums: Vec<f64>,
    sums_sq: Vec<f64>,
    counts: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalEstimate {
    /// Normalised so that supported cells average 1; unsupported cells are 1.
    pub widths: CellWidthVector,
    /// Standard error of each width, same normalisation.
    pub std_errors: Vec<f64>,
    pub crossing_counts: Vec<u64>,
}

impl LocalSlopeEstimator {
    pub fn new(ring_size: usize) -> Self {
        Self {
            sums: vec![0.0; ring_size],
            sums_sq: vec![0.0; ring_size],
            counts: vec![0; ring_size],
        }
    }

    pub fn ring_size(&self) -> usize {
        self.counts.len()
    }

    pub fn observe(&mut self, event: &AcquisitionEvent) -> Result<(), CalibrationError> {
        let ring_size = self.ring_size();
        event.check_against_ring(ring_size)?;
        for crossing in find_zero_crossings(&event.waveform.samples) {
            let cell = sample_to_cell(crossing.index, event.stop_cell, ring_size);
            let slope = crossing.slope().abs();
            self.sums[cell] += slope;
            self.sums_sq[cell] += slope * slope;
            self.counts[cell] += 1;
        }
        Ok(())
    }

    pub fn estimate(&self) -> LocalEstimate {
        let ring_size = self.ring_size();
        let mut means = vec![0.0; ring_size];
        let mut std_errors = vec![0.0; ring_size];
        let mut supported_sum = 0.0;
        let mut supported = 0usize;
        for cell in 0..ring_size {
            let n = self.counts[cell];
            if n == 0 {
                continue;
            }
            let n = n as f64;
            let mean = self.sums[cell] / n;
            let variance = (self.sums_sq[cell] / n - mean * mean).max(0.0);
            means[cell] = mean;
            std_errors[cell] = variance.sqrt() / n.sqrt();
            supported_sum += mean;
            supported += 1;
        }

        let scale = if supported > 0 && supported_sum > 0.0 {
            supported_sum / supported as f64
        } else {
            1.0
        };
        let widths = means
            .iter()
            .zip(&self.counts)
            .map(|(&mean, &n)| if n == 0 { 1.0 } else { mean / scale })
            .collect();
        for e in std_errors.iter_mut() {
            *e /= scale;
        }

        LocalEstimate {
            widths: CellWidthVector::from_solution(widths),
            std_errors,
            crossing_counts: self.counts.clone(),
        }
    }
}

/// Runs the slope estimator over a whole source, honouring an optional event cutoff.
pub fn estimate_local_widths<S: EventSource + ?Sized>(
    source: &mut S,
    ring_size: usize,
    max_events: Option<u64>,
) -> Result<LocalEstimate, CalibrationError> {
    let mut estimator = LocalSlopeEstimator::new(ring_size);
    let mut events = 0u64;
    while max_events.map_or(true, |limit| events < limit) {
        let Some(event) = source.next_event() else {
            break;
        };
        estimator.observe(&event)?;
        events += 1;
    }
    tracing::info!(events, ring_size, "local slope estimate finished");
    Ok(estimator.estimate())
}

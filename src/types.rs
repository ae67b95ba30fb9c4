use crate::error::CalibrationError;

/// Baseline-subtracted samples of one channel/gain for a single event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibratedWaveform {
    pub samples: Vec<f64>,
}

impl CalibratedWaveform {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f64>> for CalibratedWaveform {
    fn from(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionEvent {
    pub event_counter: u64,
    /// Ring cell that recorded sample index 0.
    pub stop_cell: usize,
    pub waveform: CalibratedWaveform,
}

impl AcquisitionEvent {
    pub(crate) fn check_against_ring(&self, ring_size: usize) -> Result<(), CalibrationError> {
        if self.stop_cell >= ring_size {
            return Err(CalibrationError::invalid_input(format!(
                "event {}: stop cell {} outside ring of {ring_size} cells",
                self.event_counter, self.stop_cell
            )));
        }
        if self.waveform.len() > ring_size {
            return Err(CalibrationError::invalid_input(format!(
                "event {}: waveform of {} samples exceeds ring of {ring_size} cells",
                self.event_counter,
                self.waveform.len()
            )));
        }
        Ok(())
    }
}

/// Maps a sample index of an event to its physical ring cell.
#[inline]
pub fn sample_to_cell(sample_index: usize, stop_cell: usize, ring_size: usize) -> usize {
    (stop_cell + sample_index) % ring_size
}

/// Relative width of every ring cell, nominally 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWidthVector {
    widths: Vec<f64>,
}

impl CellWidthVector {
    pub fn uniform(ring_size: usize) -> Self {
        Self {
            widths: vec![1.0; ring_size],
        }
    }

    pub fn from_widths(widths: Vec<f64>) -> Result<Self, CalibrationError> {
        if widths.is_empty() {
            return Err(CalibrationError::invalid_input("cell width vector is empty"));
        }
        if let Some((cell, w)) = widths
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(CalibrationError::invalid_input(format!(
                "cell {cell} has invalid width {w}"
            )));
        }
        Ok(Self { widths })
    }

    /// Reloads a stored estimate. Only finiteness is checked: a least-squares
    /// report may hold zero or negative widths for cells without support.
    pub fn from_estimate(widths: Vec<f64>) -> Result<Self, CalibrationError> {
        if widths.is_empty() {
            return Err(CalibrationError::invalid_input("cell width vector is empty"));
        }
        if let Some((cell, w)) = widths.iter().enumerate().find(|(_, w)| !w.is_finite()) {
            return Err(CalibrationError::invalid_input(format!(
                "cell {cell} has invalid width {w}"
            )));
        }
        Ok(Self { widths })
    }

    /// Wraps a solver result without the positivity check; least-squares
    /// columns without support may legitimately come back negative or zero.
    pub(crate) fn from_solution(widths: Vec<f64>) -> Self {
        Self { widths }
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.widths
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.widths
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.widths
    }

    pub fn sum(&self) -> f64 {
        self.widths.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.widths.len() as f64
    }

    /// Cumulative deviation from nominal, i.e. the time-base error accumulated
    /// when counting cells from cell 0.
    pub fn integral_deviation(&self) -> Vec<f64> {
        let mut acc = 0.0;
        self.widths
            .iter()
            .map(|w| {
                acc += w - 1.0;
                acc
            })
            .collect()
    }

    /// `out[i] = self[(i - shift) mod N]`.
    pub fn rotated(&self, shift: usize) -> Self {
        let n = self.widths.len();
        if n == 0 {
            return self.clone();
        }
        let shift = shift % n;
        let widths = (0..n).map(|i| self.widths[(i + n - shift) % n]).collect();
        Self { widths }
    }
}

/// Per-cell tallies collected alongside the estimate. They never enter the
/// estimation math.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellDiagnostics {
    /// Events whose stop cell was this cell.
    pub stop_cells: Vec<u64>,
    /// Zero crossings whose first sample landed on this cell.
    pub zero_crossings: Vec<u64>,
    /// Accepted measurements with non-zero weight on this cell.
    pub span_coverage: Vec<u64>,
}

impl CellDiagnostics {
    pub fn new(ring_size: usize) -> Self {
        Self {
            stop_cells: vec![0; ring_size],
            zero_crossings: vec![0; ring_size],
            span_coverage: vec![0; ring_size],
        }
    }

    pub fn unsupported_cells(&self) -> Vec<usize> {
        self.span_coverage
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(cell, _)| cell)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStats {
    pub events_processed: u64,
    pub spans_considered: u64,
    pub accepted_measurements: u64,
    pub rejected_degenerate_crossing: u64,
    pub rejected_span_length: u64,
    pub rejected_weight_sum: u64,
    pub rejected_period: u64,
    pub rejected_compensation: u64,
    pub rejected_ring_mismatch: u64,
    /// Iterations spent by the sparse solve, zero for the online solver.
    pub solve_iterations: usize,
}

impl RunStats {
    pub fn rejected_total(&self) -> u64 {
        self.rejected_degenerate_crossing
            + self.rejected_span_length
            + self.rejected_weight_sum
            + self.rejected_period
            + self.rejected_compensation
            + self.rejected_ring_mismatch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutput {
    pub solver: &'static str,
    pub widths: CellWidthVector,
    pub diagnostics: CellDiagnostics,
    pub stats: RunStats,
}

impl CalibrationOutput {
    /// Replaces widths of cells that no accepted measurement covered.
    /// Returns the number of cells replaced.
    pub fn neutralize_unsupported(&mut self, neutral: f64) -> usize {
        let unsupported = self.diagnostics.unsupported_cells();
        let widths = self.widths.as_mut_slice();
        for &cell in &unsupported {
            widths[cell] = neutral;
        }
        unsupported.len()
    }
}

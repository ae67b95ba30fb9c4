use std::path::Path;

use serde::Deserialize;

use crate::error::CalibrationError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of physical cells in the sampling ring.
    pub ring_size: usize,
    pub reference_frequency_hz: f64,
    /// Time represented by a cell of relative width 1.0.
    pub cell_width_unit_s: f64,
    /// Hard cutoff on the number of events pulled from the source.
    pub max_events: Option<u64>,
    pub iterative: IterativeConfig,
    pub least_squares: LeastSquaresConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IterativeConfig {
    /// Accepted deviation of a span length from the nominal span length, in samples.
    pub span_length_tolerance: usize,
    pub min_period_ratio: f64,
    pub max_period_ratio: f64,
    pub clamp_min: f64,
    pub clamp_max: f64,
    /// Fixed rotation applied to the final vector, as for the least-squares solver.
    pub output_rotation: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LeastSquaresConfig {
    /// Rows whose weights sum below this are dropped before the solve.
    pub min_weight_sum: f64,
    /// Fixed rotation applied to the solution: `out[i] = x[(i - rotation) mod N]`.
    pub output_rotation: usize,
    pub atol: f64,
    pub btol: f64,
    pub conditioning_limit: f64,
    /// Defaults to four times the ring size when unset.
    pub max_iterations: Option<usize>,
}

impl CalibrationConfig {
    pub const DEFAULT_RING_SIZE: usize = 1024;
    pub const DEFAULT_REFERENCE_FREQUENCY_HZ: f64 = 30e6;
    pub const DEFAULT_CELL_WIDTH_UNIT_S: f64 = 1e-9;

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CalibrationError::io("read calibration config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| CalibrationError::json("parse calibration config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Expected duration of one crossing-to-crossing span, in cell-width units.
    pub fn nominal_half_period(&self) -> f64 {
        1.0 / (self.reference_frequency_hz * self.cell_width_unit_s)
    }

    /// Samples a span covers on a ring of uniform cells, both boundary
    /// samples included.
    pub fn nominal_span_length(&self) -> usize {
        self.nominal_half_period().round() as usize + 1
    }

    pub fn lsqr_iteration_limit(&self) -> usize {
        self.least_squares
            .max_iterations
            .unwrap_or(4 * self.ring_size)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.ring_size == 0 {
            return Err(CalibrationError::invalid_input("ring_size must be non-zero"));
        }
        if !(self.reference_frequency_hz.is_finite() && self.reference_frequency_hz > 0.0) {
            return Err(CalibrationError::invalid_input(format!(
                "reference_frequency_hz must be positive, got {}",
                self.reference_frequency_hz
            )));
        }
        if !(self.cell_width_unit_s.is_finite() && self.cell_width_unit_s > 0.0) {
            return Err(CalibrationError::invalid_input(format!(
                "cell_width_unit_s must be positive, got {}",
                self.cell_width_unit_s
            )));
        }
        let period = self.nominal_half_period();
        if period >= self.ring_size as f64 {
            return Err(CalibrationError::invalid_input(format!(
                "nominal span of {period:.2} cells does not fit a ring of {} cells",
                self.ring_size
            )));
        }

        let it = &self.iterative;
        if !(it.min_period_ratio > 0.0 && it.min_period_ratio <= 1.0 && it.max_period_ratio >= 1.0)
        {
            return Err(CalibrationError::invalid_input(format!(
                "period window [{}, {}] must bracket 1.0",
                it.min_period_ratio, it.max_period_ratio
            )));
        }
        if !(it.clamp_min >= 0.0 && it.clamp_max > 1.0 && it.clamp_min < 1.0) {
            return Err(CalibrationError::invalid_input(format!(
                "clamp range [{}, {}] must contain the neutral width 1.0",
                it.clamp_min, it.clamp_max
            )));
        }

        let ls = &self.least_squares;
        if !(ls.atol >= 0.0 && ls.btol >= 0.0 && ls.conditioning_limit >= 0.0) {
            return Err(CalibrationError::invalid_input(
                "least-squares tolerances must be non-negative",
            ));
        }
        if ls.max_iterations == Some(0) {
            return Err(CalibrationError::invalid_input(
                "least-squares max_iterations must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ring_size: Self::DEFAULT_RING_SIZE,
            reference_frequency_hz: Self::DEFAULT_REFERENCE_FREQUENCY_HZ,
            cell_width_unit_s: Self::DEFAULT_CELL_WIDTH_UNIT_S,
            max_events: None,
            iterative: IterativeConfig::default(),
            least_squares: LeastSquaresConfig::default(),
        }
    }
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            span_length_tolerance: 7,
            min_period_ratio: 0.7,
            max_period_ratio: 1.3,
            clamp_min: 0.0,
            clamp_max: 2.0,
            output_rotation: 0,
        }
    }
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            min_weight_sum: 30.0,
            output_rotation: 1,
            atol: 1e-8,
            btol: 1e-8,
            conditioning_limit: 1e8,
            max_iterations: None,
        }
    }
}

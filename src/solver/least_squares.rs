use crate::config::{CalibrationConfig, LeastSquaresConfig};
use crate::error::CalibrationError;
use crate::measurement::{build_weight_vector, MeasurementSpan, Rejection, SpanDecision, WeightVector};
use nalgebra::DVector;

use crate::solver::sparse::{lsqr, LsqrSettings, LsqrStop, SparseRows};
use crate::types::CellWidthVector;

#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresSolution {
    pub widths: CellWidthVector,
    pub stop: LsqrStop,
    pub iterations: usize,
    pub residual_norm: f64,
    pub rows: usize,
}

/// Batch solver: accumulate one sparse row per accepted span, then solve
/// `A·x ≈ P·1` once.
#[derive(Debug, Clone)]
pub struct LeastSquaresSolver {
    rows: SparseRows,
    nominal_half_period: f64,
    settings: LsqrSettings,
    config: LeastSquaresConfig,
}

impl LeastSquaresSolver {
    pub fn new(config: &CalibrationConfig) -> Self {
        let ls = &config.least_squares;
        Self {
            rows: SparseRows::new(config.ring_size),
            nominal_half_period: config.nominal_half_period(),
            settings: LsqrSettings {
                atol: ls.atol,
                btol: ls.btol,
                conlim: ls.conditioning_limit,
                iter_lim: config.lsqr_iteration_limit(),
            },
            config: ls.clone(),
        }
    }

    pub fn ring_size(&self) -> usize {
        self.rows.n_cols()
    }

    pub fn row_count(&self) -> usize {
        self.rows.n_rows()
    }

    pub fn nominal_half_period(&self) -> f64 {
        self.nominal_half_period
    }

    pub fn config(&self) -> &LeastSquaresConfig {
        &self.config
    }

    /// Weight construction, then the minimum-weight-sum filter. There is no
    /// period window here: every accepted row takes part in the global solve.
    pub fn validate(&self, span: &MeasurementSpan) -> SpanDecision {
        let weights = match build_weight_vector(span) {
            Ok(weights) => weights,
            Err(reason) => return SpanDecision::Rejected(reason),
        };
        let sum = weights.sum();
        if !(sum >= self.config.min_weight_sum) {
            return SpanDecision::Rejected(Rejection::WeightSumTooSmall { sum });
        }
        SpanDecision::Accepted(weights)
    }

    /// Appends one row. A vector built for another ring size is refused.
    pub fn accumulate(&mut self, weights: &WeightVector) -> Result<(), Rejection> {
        if weights.ring_size() != self.rows.n_cols() {
            return Err(Rejection::RingSizeMismatch {
                ring_size: weights.ring_size(),
            });
        }
        self.rows.push_row(weights.iter());
        Ok(())
    }

    /// Columns no row touches come back as 0; they carry no information.
    pub fn solve(self) -> Result<LeastSquaresSolution, CalibrationError> {
        let m = self.rows.n_rows();
        if m == 0 {
            return Err(CalibrationError::NoMeasurements {
                solver: "least-squares",
            });
        }
        let matrix = self.rows.to_csr()?;
        let target = DVector::from_element(m, self.nominal_half_period);
        let solution = lsqr(&matrix, &target, &self.settings);

        tracing::info!(
            rows = m,
            cols = self.rows.n_cols(),
            nnz = self.rows.nnz(),
            stop = solution.stop.as_str(),
            iterations = solution.iterations,
            residual_norm = solution.residual_norm,
            condition_estimate = solution.condition_estimate,
            "least-squares: solve finished"
        );
        if solution.stop == LsqrStop::IterationLimit {
            tracing::warn!(
                iterations = solution.iterations,
                "least-squares: iteration limit reached before convergence"
            );
        }

        let widths =
            CellWidthVector::from_solution(solution.x.as_slice().to_vec()).rotated(self.config.output_rotation);
        Ok(LeastSquaresSolution {
            widths,
            stop: solution.stop,
            iterations: solution.iterations,
            residual_norm: solution.residual_norm,
            rows: m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::ZeroCrossing;

    fn config(ring_size: usize) -> CalibrationConfig {
        let mut config = CalibrationConfig {
            ring_size,
            // P = 8 cells
            reference_frequency_hz: 125e6,
            ..CalibrationConfig::default()
        };
        config.least_squares.min_weight_sum = 7.0;
        config.least_squares.atol = 1e-14;
        config.least_squares.btol = 1e-14;
        config.least_squares.conditioning_limit = 0.0;
        config.least_squares.max_iterations = Some(500);
        config
    }

    #[test]
    fn recovers_width_vector_from_exact_rows() {
        let n = 12;
        let truth: Vec<f64> = (0..n)
            .map(|i| 1.0 + 0.1 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).sin())
            .collect();
        let mut solver = LeastSquaresSolver::new(&config(n));
        let p = solver.nominal_half_period();
        for i in 0..n {
            // Circulant rows (1, 0.5) are invertible; rescale each so that it
            // predicts exactly the nominal half-period for the true widths.
            let raw = WeightVector::new(n, i, vec![1.0, 0.5]).unwrap();
            let scale = p / raw.dot(&truth);
            let row = WeightVector::new(n, i, vec![scale, 0.5 * scale]).unwrap();
            solver.accumulate(&row).unwrap();
        }
        assert_eq!(solver.row_count(), n);

        let solution = solver.solve().unwrap();
        let expected = CellWidthVector::from_widths(truth).unwrap().rotated(1);
        for (got, want) in solution.widths.as_slice().iter().zip(expected.as_slice()) {
            assert!((got - want).abs() < 1e-10, "{got} vs {want}");
        }
        assert!(solution.residual_norm < 1e-9);
    }

    #[test]
    fn solve_without_rows_is_an_error() {
        let solver = LeastSquaresSolver::new(&config(12));
        assert!(matches!(
            solver.solve(),
            Err(CalibrationError::NoMeasurements {
                solver: "least-squares"
            })
        ));
    }

    #[test]
    fn validate_filters_on_weight_sum() {
        let solver = LeastSquaresSolver::new(&config(32));
        let span = |end: usize| MeasurementSpan {
            start: ZeroCrossing { index: 0, before: -1.0, after: 1.0 },
            end: ZeroCrossing { index: end, before: 1.0, after: -1.0 },
            stop_cell: 5,
            ring_size: 32,
        };
        // boundary weights 0.5 each: sum = length - 1
        let SpanDecision::Accepted(w) = solver.validate(&span(7)) else {
            panic!("span of weight 7 should pass");
        };
        assert_eq!(w.first_cell(), 5);
        assert!((w.sum() - 7.0).abs() < 1e-12);
        assert_eq!(
            solver.validate(&span(6)),
            SpanDecision::Rejected(Rejection::WeightSumTooSmall { sum: 6.0 })
        );
    }

    #[test]
    fn unsupported_columns_come_back_at_zero() {
        let mut solver = LeastSquaresSolver::new(&config(16));
        for start in 0..4 {
            solver
                .accumulate(&WeightVector::new(16, start, vec![1.0; 8]).unwrap())
                .unwrap();
        }
        let solution = solver.solve().unwrap();
        // Rows cover cells 0..=10; after the rotation by one, cells 12..=15 and 0 are empty.
        let widths = solution.widths.as_slice();
        for cell in [12, 13, 14, 15, 0] {
            assert_eq!(widths[cell], 0.0);
        }
        assert!(widths[5] > 0.0);
    }

    #[test]
    fn row_for_another_ring_is_refused() {
        let mut solver = LeastSquaresSolver::new(&config(16));
        let foreign = WeightVector::new(32, 12, vec![1.0; 9]).unwrap();
        assert_eq!(
            solver.accumulate(&foreign),
            Err(Rejection::RingSizeMismatch { ring_size: 32 })
        );
        assert_eq!(solver.row_count(), 0);
    }
}

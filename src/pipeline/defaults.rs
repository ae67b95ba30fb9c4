use crate::error::CalibrationError;
use crate::measurement::{MeasurementSpan, SpanDecision, WeightVector};
use crate::pipeline::traits::{CellWidthSolver, IngestOutcome, SolveOutcome};
use crate::solver::iterative::{IterativeSolver, UpdateOutcome};
use crate::solver::least_squares::LeastSquaresSolver;

impl CellWidthSolver for IterativeSolver {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn ring_size(&self) -> usize {
        self.widths().len()
    }

    fn output_rotation(&self) -> usize {
        self.config().output_rotation
    }

    fn validate(&self, span: &MeasurementSpan) -> SpanDecision {
        IterativeSolver::validate(self, span)
    }

    fn ingest(&mut self, weights: &WeightVector) -> IngestOutcome {
        match self.update(weights) {
            UpdateOutcome::Applied { .. } => IngestOutcome::Accepted,
            UpdateOutcome::Rejected(reason) => IngestOutcome::Rejected(reason),
        }
    }

    fn finish(self: Box<Self>) -> Result<SolveOutcome, CalibrationError> {
        Ok(SolveOutcome {
            widths: self.into_widths(),
            iterations: 0,
        })
    }
}

impl CellWidthSolver for LeastSquaresSolver {
    fn name(&self) -> &'static str {
        "least_squares"
    }

    fn ring_size(&self) -> usize {
        LeastSquaresSolver::ring_size(self)
    }

    fn output_rotation(&self) -> usize {
        self.config().output_rotation
    }

    fn validate(&self, span: &MeasurementSpan) -> SpanDecision {
        LeastSquaresSolver::validate(self, span)
    }

    fn ingest(&mut self, weights: &WeightVector) -> IngestOutcome {
        match self.accumulate(weights) {
            Ok(()) => IngestOutcome::Accepted,
            Err(reason) => IngestOutcome::Rejected(reason),
        }
    }

    fn finish(self: Box<Self>) -> Result<SolveOutcome, CalibrationError> {
        let solution = self.solve()?;
        Ok(SolveOutcome {
            widths: solution.widths,
            iterations: solution.iterations,
        })
    }
}

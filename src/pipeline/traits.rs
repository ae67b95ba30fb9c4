use crate::error::CalibrationError;
use crate::measurement::{MeasurementSpan, Rejection, SpanDecision, WeightVector};
use crate::types::{AcquisitionEvent, CellWidthVector};

/// Lazily produces acquisition events, one at a time.
pub trait EventSource {
    fn next_event(&mut self) -> Option<AcquisitionEvent>;
}

impl<I> EventSource for I
where
    I: Iterator<Item = AcquisitionEvent>,
{
    fn next_event(&mut self) -> Option<AcquisitionEvent> {
        self.next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Accepted,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub widths: CellWidthVector,
    /// Iterations of the final solve; zero for solvers that update online.
    pub iterations: usize,
}

/// A cell-width estimator fed with weight vectors built from accepted spans.
pub trait CellWidthSolver: Send {
    fn name(&self) -> &'static str;

    fn ring_size(&self) -> usize;

    /// Rotation the solver applies to its final vector, so callers can index
    /// per-cell diagnostics the same way.
    fn output_rotation(&self) -> usize;

    fn validate(&self, span: &MeasurementSpan) -> SpanDecision;

    fn ingest(&mut self, weights: &WeightVector) -> IngestOutcome;

    fn finish(self: Box<Self>) -> Result<SolveOutcome, CalibrationError>;
}

use crate::error::CalibrationError;
use crate::measurement::{collect_spans, find_zero_crossings, Rejection, SpanDecision};
use crate::pipeline::traits::{CellWidthSolver, EventSource, IngestOutcome};
use crate::types::{
    sample_to_cell, AcquisitionEvent, CalibrationOutput, CellDiagnostics, RunStats,
};

/// What one event contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSummary {
    pub crossings: usize,
    pub spans: usize,
    pub accepted: usize,
}

/// Drives one solver over an event stream: locates crossings, builds spans,
/// lets the solver filter and ingest them, and keeps the per-cell tallies.
pub struct Calibrator {
    solver: Box<dyn CellWidthSolver>,
    ring_size: usize,
    max_events: Option<u64>,
    diagnostics: CellDiagnostics,
    stats: RunStats,
}

pub(crate) struct CalibratorParts {
    pub solver: Box<dyn CellWidthSolver>,
    pub max_events: Option<u64>,
}

impl Calibrator {
    pub(crate) fn from_parts(parts: CalibratorParts) -> Self {
        let ring_size = parts.solver.ring_size();
        Self {
            solver: parts.solver,
            ring_size,
            max_events: parts.max_events,
            diagnostics: CellDiagnostics::new(ring_size),
            stats: RunStats::default(),
        }
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn diagnostics(&self) -> &CellDiagnostics {
        &self.diagnostics
    }

    pub fn process_event(
        &mut self,
        event: &AcquisitionEvent,
    ) -> Result<EventSummary, CalibrationError> {
        event.check_against_ring(self.ring_size)?;
        let stop_cell = event.stop_cell;
        self.diagnostics.stop_cells[stop_cell] += 1;

        let crossings = find_zero_crossings(&event.waveform.samples);
        for crossing in &crossings {
            let cell = sample_to_cell(crossing.index, stop_cell, self.ring_size);
            self.diagnostics.zero_crossings[cell] += 1;
        }

        let spans = collect_spans(&crossings, stop_cell, self.ring_size);
        let mut accepted = 0;
        for span in &spans {
            self.stats.spans_considered += 1;
            let weights = match self.solver.validate(span) {
                SpanDecision::Accepted(weights) => weights,
                SpanDecision::Rejected(reason) => {
                    self.record_rejection(reason);
                    continue;
                }
            };
            match self.solver.ingest(&weights) {
                IngestOutcome::Accepted => {
                    accepted += 1;
                    self.stats.accepted_measurements += 1;
                    for (cell, w) in weights.iter() {
                        if w != 0.0 {
                            self.diagnostics.span_coverage[cell] += 1;
                        }
                    }
                }
                IngestOutcome::Rejected(reason) => self.record_rejection(reason),
            }
        }
        self.stats.events_processed += 1;

        tracing::debug!(
            event = event.event_counter,
            stop_cell,
            crossings = crossings.len(),
            spans = spans.len(),
            accepted,
            "calibration: event processed"
        );
        Ok(EventSummary {
            crossings: crossings.len(),
            spans: spans.len(),
            accepted,
        })
    }

    /// Pulls events until the source runs dry or the event cutoff is reached,
    /// then finishes the solve.
    pub fn run<S: EventSource + ?Sized>(
        mut self,
        source: &mut S,
    ) -> Result<CalibrationOutput, CalibrationError> {
        tracing::info!(
            solver = self.solver.name(),
            ring_size = self.ring_size,
            max_events = ?self.max_events,
            "calibration: run started"
        );
        while self
            .max_events
            .map_or(true, |limit| self.stats.events_processed < limit)
        {
            let Some(event) = source.next_event() else {
                break;
            };
            self.process_event(&event)?;
        }
        self.finish()
    }

    pub fn finish(self) -> Result<CalibrationOutput, CalibrationError> {
        let Self {
            solver,
            mut diagnostics,
            mut stats,
            ..
        } = self;
        let name = solver.name();
        let rotation = solver.output_rotation();
        let outcome = solver.finish()?;
        stats.solve_iterations = outcome.iterations;

        // Coverage is reported in the same indexing as the returned widths.
        if rotation % diagnostics.span_coverage.len() != 0 {
            let n = diagnostics.span_coverage.len();
            let shift = rotation % n;
            let coverage = &diagnostics.span_coverage;
            diagnostics.span_coverage = (0..n).map(|i| coverage[(i + n - shift) % n]).collect();
        }

        let unsupported = diagnostics.unsupported_cells().len();
        if unsupported > 0 {
            tracing::warn!(
                solver = name,
                unsupported,
                "calibration: cells without any accepted measurement"
            );
        }
        tracing::info!(
            solver = name,
            events = stats.events_processed,
            accepted = stats.accepted_measurements,
            rejected = stats.rejected_total(),
            solve_iterations = stats.solve_iterations,
            "calibration: run finished"
        );
        Ok(CalibrationOutput {
            solver: name,
            widths: outcome.widths,
            diagnostics,
            stats,
        })
    }

    fn record_rejection(&mut self, reason: Rejection) {
        let counter = match reason {
            Rejection::DegenerateCrossing => &mut self.stats.rejected_degenerate_crossing,
            Rejection::SpanLengthOutOfRange { .. } => &mut self.stats.rejected_span_length,
            Rejection::WeightSumTooSmall { .. } => &mut self.stats.rejected_weight_sum,
            Rejection::PeriodOutOfRange { .. } => &mut self.stats.rejected_period,
            Rejection::DegenerateCompensation => &mut self.stats.rejected_compensation,
            Rejection::RingSizeMismatch { .. } => &mut self.stats.rejected_ring_mismatch,
        };
        *counter += 1;
    }
}

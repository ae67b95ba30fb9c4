//! Per-event measurement construction shared by every solver: zero crossings,
//! crossing-to-crossing spans and their weight vectors over the ring.

pub mod span;
pub mod weights;
pub mod zero_crossing;

pub use span::{collect_spans, MeasurementSpan};
pub use weights::{build_weight_vector, end_boundary_weight, start_boundary_weight, WeightVector};
pub use zero_crossing::{find_zero_crossings, split_families, CrossingFamilies, ZeroCrossing};

/// Why a span never reached a solver. Rejections are expected and frequent;
/// they are tallied, never raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Equal samples on both sides of a boundary crossing; no interpolation possible.
    DegenerateCrossing,
    SpanLengthOutOfRange { length: usize },
    WeightSumTooSmall { sum: f64 },
    PeriodOutOfRange { measured: f64 },
    /// The span claims the entire ring, leaving nothing to compensate with.
    DegenerateCompensation,
    /// The weight vector was built for a ring of another size than the solver's.
    RingSizeMismatch { ring_size: usize },
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DegenerateCrossing => "degenerate_crossing",
            Self::SpanLengthOutOfRange { .. } => "span_length_out_of_range",
            Self::WeightSumTooSmall { .. } => "weight_sum_too_small",
            Self::PeriodOutOfRange { .. } => "period_out_of_range",
            Self::DegenerateCompensation => "degenerate_compensation",
            Self::RingSizeMismatch { .. } => "ring_size_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpanDecision {
    Accepted(WeightVector),
    Rejected(Rejection),
}

impl SpanDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

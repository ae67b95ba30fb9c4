use crate::error::CalibrationError;
use crate::measurement::span::MeasurementSpan;
use crate::measurement::zero_crossing::ZeroCrossing;
use crate::measurement::Rejection;

/// Sparse weights of one span over the ring: a contiguous run of cells
/// starting at `first_cell` and wrapping modulo the ring size.
///
/// Dotted with a cell-width vector this is the model's prediction of the
/// span's duration.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    ring_size: usize,
    first_cell: usize,
    weights: Vec<f64>,
}

impl WeightVector {
    pub fn new(
        ring_size: usize,
        first_cell: usize,
        weights: Vec<f64>,
    ) -> Result<Self, CalibrationError> {
        if ring_size == 0 {
            return Err(CalibrationError::invalid_input(
                "weight vector over an empty ring",
            ));
        }
        if weights.len() > ring_size {
            return Err(CalibrationError::invalid_input(format!(
                "{} weights do not fit a ring of {ring_size} cells",
                weights.len()
            )));
        }
        Ok(Self::from_parts(ring_size, first_cell, weights))
    }

    /// Caller guarantees `0 < weights.len() <= ring_size`.
    pub(crate) fn from_parts(ring_size: usize, first_cell: usize, weights: Vec<f64>) -> Self {
        Self {
            ring_size,
            first_cell: first_cell % ring_size,
            weights,
        }
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    pub fn first_cell(&self) -> usize {
        self.first_cell
    }

    /// Number of cells carrying a weight.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `(cell, weight)` pairs in span order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.weights
            .iter()
            .enumerate()
            .map(move |(k, &w)| ((self.first_cell + k) % self.ring_size, w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn dot(&self, widths: &[f64]) -> f64 {
        debug_assert_eq!(widths.len(), self.ring_size);
        self.iter().map(|(cell, w)| w * widths[cell]).sum()
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.ring_size];
        for (cell, w) in self.iter() {
            dense[cell] = w;
        }
        dense
    }
}

/// Share of the first span cell lying after the interpolated crossing.
pub fn start_boundary_weight(crossing: &ZeroCrossing) -> Option<f64> {
    crossing.fraction().map(|f| 1.0 - f)
}

/// Share of the last span cell lying before the interpolated crossing.
pub fn end_boundary_weight(crossing: &ZeroCrossing) -> Option<f64> {
    crossing.fraction()
}

/// Weight 1 for every enclosed cell, interpolated weights at both ends.
///
/// Fails only on flat boundary steps or spans that do not fit the ring;
/// tolerance windows are the solvers' business.
pub fn build_weight_vector(span: &MeasurementSpan) -> Result<WeightVector, Rejection> {
    let length = span.len_samples();
    if span.end.index <= span.start.index || length > span.ring_size {
        return Err(Rejection::SpanLengthOutOfRange { length });
    }
    let start_weight = start_boundary_weight(&span.start).ok_or(Rejection::DegenerateCrossing)?;
    let end_weight = end_boundary_weight(&span.end).ok_or(Rejection::DegenerateCrossing)?;

    let mut weights = vec![1.0; length];
    weights[0] = start_weight;
    weights[length - 1] = end_weight;
    Ok(WeightVector::from_parts(span.ring_size, span.first_cell(), weights))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossing(index: usize, before: f64, after: f64) -> ZeroCrossing {
        ZeroCrossing {
            index,
            before,
            after,
        }
    }

    fn span(start: ZeroCrossing, end: ZeroCrossing, stop_cell: usize, ring_size: usize) -> MeasurementSpan {
        MeasurementSpan {
            start,
            end,
            stop_cell,
            ring_size,
        }
    }

    #[test]
    fn boundary_weight_formula() {
        let c = crossing(0, -1.0, 3.0);
        assert!((start_boundary_weight(&c).unwrap() - 0.75).abs() < 1e-15);
        assert!((end_boundary_weight(&c).unwrap() - 0.25).abs() < 1e-15);
    }

    #[test]
    fn flat_boundary_is_degenerate() {
        let flat = crossing(8, -0.0, 0.0);
        let s = span(crossing(2, -1.0, 3.0), flat, 0, 16);
        assert_eq!(build_weight_vector(&s), Err(Rejection::DegenerateCrossing));
        let s = span(flat, crossing(12, -1.0, 3.0), 0, 16);
        assert_eq!(build_weight_vector(&s), Err(Rejection::DegenerateCrossing));
    }

    #[test]
    fn interior_cells_have_unit_weight() {
        let s = span(crossing(2, -1.0, 3.0), crossing(6, 2.0, -2.0), 0, 16);
        let w = build_weight_vector(&s).unwrap();
        assert_eq!(w.first_cell(), 2);
        assert_eq!(w.weights(), &[0.75, 1.0, 1.0, 1.0, 0.5]);
        assert!((w.sum() - 4.25).abs() < 1e-12);
    }

    #[test]
    fn cells_wrap_modulo_ring() {
        let s = span(crossing(1, -1.0, 3.0), crossing(4, 1.0, -3.0), 6, 8);
        let w = build_weight_vector(&s).unwrap();
        let cells: Vec<usize> = w.iter().map(|(cell, _)| cell).collect();
        assert_eq!(cells, vec![7, 0, 1, 2]);
        let dense = w.to_dense();
        assert_eq!(dense, vec![1.0, 1.0, 0.25, 0.0, 0.0, 0.0, 0.0, 0.75]);
    }

    #[test]
    fn dot_with_uniform_widths_is_weight_sum() {
        let s = span(crossing(0, -1.0, 1.0), crossing(9, 1.0, -1.0), 3, 12);
        let w = build_weight_vector(&s).unwrap();
        assert!((w.dot(&[1.0; 12]) - w.sum()).abs() < 1e-12);
        let mut widths = vec![1.0; 12];
        widths[5] = 2.0;
        assert!((w.dot(&widths) - (w.sum() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn span_longer_than_ring_is_rejected() {
        let s = span(crossing(0, -1.0, 1.0), crossing(9, 1.0, -1.0), 0, 8);
        assert_eq!(
            build_weight_vector(&s),
            Err(Rejection::SpanLengthOutOfRange { length: 10 })
        );
    }

    #[test]
    fn new_checks_ring_fit() {
        assert!(WeightVector::new(0, 0, vec![]).is_err());
        assert!(WeightVector::new(4, 0, vec![1.0; 5]).is_err());
        let w = WeightVector::new(4, 6, vec![1.0; 4]).unwrap();
        assert_eq!(w.first_cell(), 2);
    }
}

use crate::measurement::zero_crossing::{split_families, ZeroCrossing};
use crate::types::sample_to_cell;

/// Two consecutive crossings of the same family: one observed span of the
/// reference signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSpan {
    pub start: ZeroCrossing,
    pub end: ZeroCrossing,
    pub stop_cell: usize,
    pub ring_size: usize,
}

impl MeasurementSpan {
    /// Samples covered, both boundary samples included.
    pub fn len_samples(&self) -> usize {
        (self.end.index + 1).saturating_sub(self.start.index)
    }

    pub fn first_cell(&self) -> usize {
        sample_to_cell(self.start.index, self.stop_cell, self.ring_size)
    }

    pub fn last_cell(&self) -> usize {
        sample_to_cell(self.end.index, self.stop_cell, self.ring_size)
    }
}

/// All spans of one event, the even family first and then the odd one.
pub fn collect_spans(
    crossings: &[ZeroCrossing],
    stop_cell: usize,
    ring_size: usize,
) -> Vec<MeasurementSpan> {
    let families = split_families(crossings);
    families
        .iter()
        .flat_map(|family| {
            family.windows(2).map(move |pair| MeasurementSpan {
                start: pair[0],
                end: pair[1],
                stop_cell,
                ring_size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::zero_crossing::find_zero_crossings;

    fn square_wave(half: usize, cycles: usize) -> Vec<f64> {
        (0..half * 2 * cycles)
            .map(|i| if (i / half) % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    #[test]
    fn spans_pair_same_family_crossings() {
        // crossings at 3, 7, 11, 15, 19
        let samples = square_wave(4, 3);
        let crossings = find_zero_crossings(&samples);
        let spans = collect_spans(&crossings, 0, 64);
        let bounds: Vec<(usize, usize)> = spans
            .iter()
            .map(|s| (s.start.index, s.end.index))
            .collect();
        assert_eq!(bounds, vec![(3, 11), (11, 19), (7, 15)]);
        assert!(spans.iter().all(|s| s.len_samples() == 9));
    }

    #[test]
    fn fewer_than_three_crossings_give_no_span() {
        let crossings = find_zero_crossings(&[1.0, -1.0, 1.0]);
        assert_eq!(crossings.len(), 2);
        assert!(collect_spans(&crossings, 0, 8).is_empty());
    }

    #[test]
    fn span_cells_follow_stop_cell() {
        let samples = square_wave(4, 3);
        let crossings = find_zero_crossings(&samples);
        let span = collect_spans(&crossings, 60, 64)[0];
        assert_eq!(span.first_cell(), 63);
        assert_eq!(span.last_cell(), 7);
    }
}

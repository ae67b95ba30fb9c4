use std::path::Path;

use crate::error::CalibrationError;
use crate::types::{sample_to_cell, AcquisitionEvent, CalibratedWaveform};

/// Per-cell baseline offsets of one channel/gain, indexed by physical ring cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PedestalCalibration {
    offsets: Vec<f64>,
}

impl PedestalCalibration {
    pub fn new(offsets: Vec<f64>) -> Result<Self, CalibrationError> {
        if offsets.is_empty() {
            return Err(CalibrationError::invalid_input("pedestal table is empty"));
        }
        if let Some(cell) = offsets.iter().position(|o| !o.is_finite()) {
            return Err(CalibrationError::invalid_input(format!(
                "pedestal offset of cell {cell} is not finite"
            )));
        }
        Ok(Self { offsets })
    }

    /// Whitespace-separated table, one row per cell; only the first column is used.
    /// Blank lines and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CalibrationError::io("read pedestal table", e))?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, CalibrationError> {
        let mut offsets = Vec::new();
        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            let value: f64 = first
                .parse()
                .map_err(|e| CalibrationError::parse("pedestal table", line_no + 1, e))?;
            offsets.push(value);
        }
        Self::new(offsets)
    }

    pub fn ring_size(&self) -> usize {
        self.offsets.len()
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// `out[i] = raw[i] - offsets[(stop_cell + i) mod N]`.
    pub fn subtract(
        &self,
        raw: &[f64],
        stop_cell: usize,
    ) -> Result<CalibratedWaveform, CalibrationError> {
        let n = self.offsets.len();
        if stop_cell >= n || raw.len() > n {
            return Err(CalibrationError::invalid_input(format!(
                "readout of {} samples at stop cell {stop_cell} does not fit {n} pedestal cells",
                raw.len()
            )));
        }
        let samples = raw
            .iter()
            .enumerate()
            .map(|(i, &x)| x - self.offsets[sample_to_cell(i, stop_cell, n)])
            .collect();
        Ok(CalibratedWaveform::new(samples))
    }

    /// Pedestal-subtracted event built from a raw readout.
    pub fn calibrate_event(
        &self,
        event_counter: u64,
        stop_cell: usize,
        raw: &[f64],
    ) -> Result<AcquisitionEvent, CalibrationError> {
        Ok(AcquisitionEvent {
            event_counter,
            stop_cell,
            waveform: self.subtract(raw, stop_cell)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_rolled_by_stop_cell() {
        let pedestal = PedestalCalibration::new(vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let out = pedestal.subtract(&[100.0, 100.0, 100.0], 2).unwrap();
        assert_eq!(out.samples, vec![70.0, 60.0, 90.0]);
    }

    #[test]
    fn parse_uses_first_column() {
        let text = "# cell offsets\n1.5 9 9\n\n-2.0\t7\n3e1\n";
        let pedestal = PedestalCalibration::parse(text).unwrap();
        assert_eq!(pedestal.offsets(), &[1.5, -2.0, 30.0]);
    }

    #[test]
    fn parse_reports_bad_line() {
        let err = PedestalCalibration::parse("1.0\nabc\n").unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Parse { table: "pedestal table", line: 2, .. }
        ));
    }

    #[test]
    fn oversized_readout_is_rejected() {
        let pedestal = PedestalCalibration::new(vec![0.0; 2]).unwrap();
        assert!(pedestal.subtract(&[1.0, 2.0, 3.0], 0).is_err());
        assert!(pedestal.subtract(&[1.0], 2).is_err());
    }

    #[test]
    fn calibrate_event_keeps_header() {
        let pedestal = PedestalCalibration::new(vec![1.0; 4]).unwrap();
        let event = pedestal.calibrate_event(9, 3, &[2.0, 2.0]).unwrap();
        assert_eq!(event.event_counter, 9);
        assert_eq!(event.stop_cell, 3);
        assert_eq!(event.waveform.samples, vec![1.0, 1.0]);
    }
}

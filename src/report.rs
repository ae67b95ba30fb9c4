use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::error::CalibrationError;
use crate::solver::LocalEstimate;
use crate::types::{CalibrationOutput, CellWidthVector};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub schema_version: u32,
    pub meta: ReportMeta,
    pub cells: Vec<CellRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub generated_at: String,
    pub solver: String,
    pub ring_size: usize,
    pub events_processed: u64,
    pub accepted_measurements: u64,
    pub rejected_measurements: u64,
    pub solve_iterations: usize,
    pub unsupported_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellRow {
    pub cell: usize,
    pub cell_width_mean: f64,
    pub cell_width_std: f64,
    pub number_of_crossings: u64,
    pub stop_cell: u64,
    pub span_coverage: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_width_truth: Option<f64>,
}

impl CalibrationReport {
    pub fn from_output(output: &CalibrationOutput) -> Self {
        let diagnostics = &output.diagnostics;
        let cells = output
            .widths
            .as_slice()
            .iter()
            .enumerate()
            .map(|(cell, &width)| CellRow {
                cell,
                cell_width_mean: width,
                cell_width_std: 0.0,
                number_of_crossings: diagnostics.zero_crossings[cell],
                stop_cell: diagnostics.stop_cells[cell],
                span_coverage: diagnostics.span_coverage[cell],
                cell_width_truth: None,
            })
            .collect();
        let stats = &output.stats;
        Self {
            schema_version: SCHEMA_VERSION,
            meta: ReportMeta {
                generated_at: Utc::now().to_rfc3339(),
                solver: output.solver.to_string(),
                ring_size: output.widths.len(),
                events_processed: stats.events_processed,
                accepted_measurements: stats.accepted_measurements,
                rejected_measurements: stats.rejected_total(),
                solve_iterations: stats.solve_iterations,
                unsupported_cells: diagnostics.unsupported_cells().len(),
            },
            cells,
        }
    }

    /// The slope estimator has no span bookkeeping; its rows carry crossing
    /// counts and standard errors only.
    pub fn from_local_estimate(estimate: &LocalEstimate, events_processed: u64) -> Self {
        let cells = estimate
            .widths
            .as_slice()
            .iter()
            .enumerate()
            .map(|(cell, &width)| CellRow {
                cell,
                cell_width_mean: width,
                cell_width_std: estimate.std_errors[cell],
                number_of_crossings: estimate.crossing_counts[cell],
                stop_cell: 0,
                span_coverage: 0,
                cell_width_truth: None,
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            meta: ReportMeta {
                generated_at: Utc::now().to_rfc3339(),
                solver: "local_slope".to_string(),
                ring_size: estimate.widths.len(),
                events_processed,
                accepted_measurements: estimate.crossing_counts.iter().sum(),
                rejected_measurements: 0,
                solve_iterations: 0,
                unsupported_cells: estimate.crossing_counts.iter().filter(|&&n| n == 0).count(),
            },
            cells,
        }
    }

    /// Attaches known widths, e.g. from a synthetic run.
    pub fn with_truth(mut self, truth: &CellWidthVector) -> Result<Self, CalibrationError> {
        if truth.len() != self.cells.len() {
            return Err(CalibrationError::invalid_input(format!(
                "truth has {} cells, report has {}",
                truth.len(),
                self.cells.len()
            )));
        }
        for (row, &w) in self.cells.iter_mut().zip(truth.as_slice()) {
            row.cell_width_truth = Some(w);
        }
        Ok(self)
    }

    /// Tabular record with a header line; the truth column only appears when set.
    pub fn to_csv(&self) -> Result<String, CalibrationError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_rows(&mut writer)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| CalibrationError::io("flush csv report", e.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|e| CalibrationError::invalid_input(format!("csv report is not UTF-8: {e}")))
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), CalibrationError> {
        ensure_parent_directory(path)?;
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| CalibrationError::csv("create report", e))?;
        self.write_rows(&mut writer)?;
        writer
            .flush()
            .map_err(|e| CalibrationError::io("flush csv report", e))
    }

    fn write_rows<W: std::io::Write>(
        &self,
        writer: &mut csv::Writer<W>,
    ) -> Result<(), CalibrationError> {
        for row in &self.cells {
            writer
                .serialize(row)
                .map_err(|e| CalibrationError::csv("write report row", e))?;
        }
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<(), CalibrationError> {
        ensure_parent_directory(path)?;
        let mut file =
            File::create(path).map_err(|e| CalibrationError::io("create json report", e))?;
        serde_json::to_writer_pretty(&mut file, self)
            .map_err(|e| CalibrationError::json("serialize json report", e))?;
        file.write_all(b"\n")
            .map_err(|e| CalibrationError::io("finalize json report", e))?;
        Ok(())
    }
}

fn ensure_parent_directory(path: &Path) -> Result<(), CalibrationError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| CalibrationError::io("create report output directory", e)),
        _ => Ok(()),
    }
}

const WIDTH_TABLE: &str = "cell width csv";

/// Reads one column of a comma-separated table with a header line, e.g. the
/// `cell_width_mean` column of an earlier report, for use as a solver seed.
/// Any finite value is accepted; the seeding solver clamps it.
pub fn load_cell_widths_csv(path: &Path, column: &str) -> Result<CellWidthVector, CalibrationError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CalibrationError::csv("open cell width table", e))?;
    read_width_column(reader, column)
}

pub fn parse_cell_widths_csv(data: &str, column: &str) -> Result<CellWidthVector, CalibrationError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    read_width_column(reader, column)
}

fn read_width_column<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    column: &str,
) -> Result<CellWidthVector, CalibrationError> {
    let index = reader
        .headers()
        .map_err(|e| CalibrationError::csv("read cell width header", e))?
        .iter()
        .position(|name| name == column)
        .ok_or_else(|| {
            CalibrationError::parse(WIDTH_TABLE, 1, format!("no column named '{column}'"))
        })?;

    let mut widths = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| CalibrationError::csv("read cell width row", e))?;
        let line = record
            .position()
            .map_or(row + 2, |position| position.line() as usize);
        let field = record
            .get(index)
            .ok_or_else(|| CalibrationError::parse(WIDTH_TABLE, line, "missing field"))?;
        let value: f64 = field
            .parse()
            .map_err(|e| CalibrationError::parse(WIDTH_TABLE, line, e))?;
        widths.push(value);
    }
    CellWidthVector::from_estimate(widths)
}

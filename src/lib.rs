pub mod config;
pub mod error;
pub mod measurement;
pub mod pedestal;
pub mod pipeline;
pub mod report;
pub mod solver;
pub mod synthetic;
pub mod types;

pub use config::{CalibrationConfig, IterativeConfig, LeastSquaresConfig};
pub use error::CalibrationError;
pub use measurement::{Rejection, SpanDecision, WeightVector};
pub use pedestal::PedestalCalibration;
pub use pipeline::builder::{CalibratorBuilder, SolverKind};
pub use pipeline::runtime::{Calibrator, EventSummary};
pub use pipeline::traits::{CellWidthSolver, EventSource};
pub use report::CalibrationReport;
pub use synthetic::{SyntheticConfig, SyntheticEventSource};
pub use types::{AcquisitionEvent, CalibratedWaveform, CalibrationOutput, CellWidthVector};

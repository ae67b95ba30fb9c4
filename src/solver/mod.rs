pub mod iterative;
pub mod least_squares;
pub mod local;
pub mod sparse;

pub use iterative::{IterativeSolver, UpdateOutcome};
pub use least_squares::{LeastSquaresSolution, LeastSquaresSolver};
pub use local::{estimate_local_widths, LocalEstimate, LocalSlopeEstimator};

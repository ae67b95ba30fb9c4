use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::pipeline::runtime::{Calibrator, CalibratorParts};
use crate::pipeline::traits::CellWidthSolver;
use crate::solver::iterative::IterativeSolver;
use crate::solver::least_squares::LeastSquaresSolver;
use crate::types::CellWidthVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    Iterative,
    LeastSquares,
}

pub struct CalibratorBuilder {
    config: CalibrationConfig,
    solver_kind: SolverKind,
    seed: Option<CellWidthVector>,
    solver: Option<Box<dyn CellWidthSolver>>,
}

impl CalibratorBuilder {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            solver_kind: SolverKind::default(),
            seed: None,
            solver: None,
        }
    }

    pub fn with_solver_kind(mut self, solver_kind: SolverKind) -> Self {
        self.solver_kind = solver_kind;
        self
    }

    /// Starting widths for the iterative solver.
    pub fn with_seed(mut self, seed: CellWidthVector) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn CellWidthSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn build(self) -> Result<Calibrator, CalibrationError> {
        self.config.validate()?;

        let solver: Box<dyn CellWidthSolver> = if let Some(solver) = self.solver {
            if solver.ring_size() != self.config.ring_size {
                return Err(CalibrationError::invalid_input(format!(
                    "solver '{}' is sized for {} cells, config has {}",
                    solver.name(),
                    solver.ring_size(),
                    self.config.ring_size
                )));
            }
            solver
        } else {
            match self.solver_kind {
                SolverKind::Iterative => match self.seed {
                    Some(seed) => Box::new(IterativeSolver::with_seed(&self.config, seed)?),
                    None => Box::new(IterativeSolver::new(&self.config)),
                },
                SolverKind::LeastSquares => {
                    if self.seed.is_some() {
                        tracing::warn!("calibration: seed ignored by the least-squares solver");
                    }
                    Box::new(LeastSquaresSolver::new(&self.config))
                }
            }
        };

        tracing::debug!(
            solver = solver.name(),
            ring_size = self.config.ring_size,
            nominal_half_period = self.config.nominal_half_period(),
            "calibration: calibrator built"
        );
        Ok(Calibrator::from_parts(CalibratorParts {
            solver,
            max_events: self.config.max_events,
        }))
    }
}

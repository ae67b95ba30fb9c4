//! Row storage for the batch solver and the LSQR iteration (Paige & Saunders,
//! 1982) over `nalgebra-sparse` matrices. The normal equations are never
//! formed: LSQR only needs `A·v` and `Aᵀ·u` products.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::CalibrationError;

/// Sparse rows grown one at a time as triplets, frozen to CSR at solve time.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRows {
    n_cols: usize,
    n_rows: usize,
    row_indices: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseRows {
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            n_rows: 0,
            row_indices: Vec::new(),
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends a row given as `(column, value)` pairs. Zero values are not stored.
    pub fn push_row(&mut self, entries: impl IntoIterator<Item = (usize, f64)>) {
        let row = self.n_rows;
        for (col, value) in entries {
            if value != 0.0 {
                self.row_indices.push(row);
                self.col_indices.push(col);
                self.values.push(value);
            }
        }
        self.n_rows += 1;
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn to_csr(&self) -> Result<CsrMatrix<f64>, CalibrationError> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.row_indices.clone(),
            self.col_indices.clone(),
            self.values.clone(),
        )
        .map_err(|e| CalibrationError::invalid_input(format!("sparse measurement rows: {e}")))?;
        Ok(CsrMatrix::from(&coo))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsqrSettings {
    pub atol: f64,
    pub btol: f64,
    /// Stop once the condition estimate exceeds this; zero disables the test.
    pub conlim: f64,
    pub iter_lim: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsqrStop {
    /// `x = 0` already solves the system (zero right-hand side or `Aᵀb = 0`).
    TrivialSolution,
    /// `A·x = b` holds to the requested tolerances.
    Compatible,
    /// `x` solves the least-squares problem to the requested tolerances.
    LeastSquares,
    ConditionLimit,
    /// As the three above, with tolerances at machine precision.
    CompatibleMachinePrecision,
    LeastSquaresMachinePrecision,
    ConditionMachinePrecision,
    IterationLimit,
}

impl LsqrStop {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrivialSolution => "trivial_solution",
            Self::Compatible => "compatible",
            Self::LeastSquares => "least_squares",
            Self::ConditionLimit => "condition_limit",
            Self::CompatibleMachinePrecision => "compatible_machine_precision",
            Self::LeastSquaresMachinePrecision => "least_squares_machine_precision",
            Self::ConditionMachinePrecision => "condition_machine_precision",
            Self::IterationLimit => "iteration_limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LsqrSolution {
    pub x: DVector<f64>,
    pub stop: LsqrStop,
    pub iterations: usize,
    /// `‖b − A·x‖`
    pub residual_norm: f64,
    /// `‖Aᵀ(b − A·x)‖`
    pub normal_residual_norm: f64,
    pub condition_estimate: f64,
}

/// Minimises `‖A·x − b‖₂` starting from `x = 0`. Columns that no row touches
/// stay at zero.
pub fn lsqr(a: &CsrMatrix<f64>, b: &DVector<f64>, settings: &LsqrSettings) -> LsqrSolution {
    debug_assert_eq!(b.len(), a.nrows());
    let at = a.transpose();

    let mut x: DVector<f64> = DVector::zeros(a.ncols());
    let mut u = b.clone();
    let mut v: DVector<f64> = DVector::zeros(a.ncols());

    let mut beta = u.norm();
    let mut alpha = 0.0;
    if beta > 0.0 {
        u /= beta;
        v = &at * &u;
        alpha = v.norm();
    }
    if alpha > 0.0 {
        v /= alpha;
    }
    let mut w = v.clone();

    let bnorm = beta;
    let mut rhobar = alpha;
    let mut phibar = beta;
    let mut rnorm = beta;
    let mut arnorm = alpha * beta;
    let mut anorm = 0.0f64;
    let mut acond = 0.0;
    let mut ddnorm = 0.0;
    let mut xxnorm = 0.0;
    let mut z = 0.0;
    let mut cs2 = -1.0;
    let mut sn2 = 0.0;

    if arnorm == 0.0 {
        return LsqrSolution {
            x,
            stop: LsqrStop::TrivialSolution,
            iterations: 0,
            residual_norm: rnorm,
            normal_residual_norm: arnorm,
            condition_estimate: acond,
        };
    }

    let ctol = if settings.conlim > 0.0 {
        1.0 / settings.conlim
    } else {
        0.0
    };
    let mut stop = LsqrStop::IterationLimit;
    let mut itn = 0;

    while itn < settings.iter_lim {
        itn += 1;

        // Golub-Kahan step: beta·u = A·v − alpha·u, alpha·v = Aᵀ·u − beta·v.
        u = a * &v - &u * alpha;
        beta = u.norm();
        if beta > 0.0 {
            u /= beta;
            anorm = (anorm * anorm + alpha * alpha + beta * beta).sqrt();
            v = &at * &u - &v * beta;
            alpha = v.norm();
            if alpha > 0.0 {
                v /= alpha;
            }
        }

        let rho = rhobar.hypot(beta);
        let cs = rhobar / rho;
        let sn = beta / rho;
        let theta = sn * alpha;
        rhobar = -cs * alpha;
        let phi = cs * phibar;
        phibar *= sn;
        let tau = sn * phi;

        ddnorm += w.norm_squared() / (rho * rho);
        x.axpy(phi / rho, &w, 1.0);
        w = &v - &w * (theta / rho);

        let delta = sn2 * rho;
        let gambar = -cs2 * rho;
        let rhs = phi - delta * z;
        let zbar = rhs / gambar;
        let xnorm = (xxnorm + zbar * zbar).sqrt();
        let gamma = gambar.hypot(theta);
        cs2 = gambar / gamma;
        sn2 = theta / gamma;
        z = rhs / gamma;
        xxnorm += z * z;

        acond = anorm * ddnorm.sqrt();
        rnorm = phibar.abs();
        arnorm = alpha * tau.abs();

        let test1 = rnorm / bnorm;
        let test2 = arnorm / (anorm * rnorm + f64::EPSILON);
        let test3 = 1.0 / (acond + f64::EPSILON);
        let scaled_test1 = test1 / (1.0 + anorm * xnorm / bnorm);
        let rtol = settings.btol + settings.atol * anorm * xnorm / bnorm;

        let mut reason = None;
        if itn >= settings.iter_lim {
            reason = Some(LsqrStop::IterationLimit);
        }
        if 1.0 + test3 <= 1.0 {
            reason = Some(LsqrStop::ConditionMachinePrecision);
        }
        if 1.0 + test2 <= 1.0 {
            reason = Some(LsqrStop::LeastSquaresMachinePrecision);
        }
        if 1.0 + scaled_test1 <= 1.0 {
            reason = Some(LsqrStop::CompatibleMachinePrecision);
        }
        if test3 <= ctol {
            reason = Some(LsqrStop::ConditionLimit);
        }
        if test2 <= settings.atol {
            reason = Some(LsqrStop::LeastSquares);
        }
        if test1 <= rtol {
            reason = Some(LsqrStop::Compatible);
        }
        if let Some(reason) = reason {
            stop = reason;
            break;
        }
    }

    LsqrSolution {
        x,
        stop,
        iterations: itn,
        residual_norm: rnorm,
        normal_residual_norm: arnorm,
        condition_estimate: acond,
    }
}

//! Linear solvers for constrained systems.
use crate::constraints::ConstrainedSystem;
use crate::error::{Error, Result};
use log::{debug, info};
use meshfem_sparse::cg::PcgSolver;
use meshfem_sparse::operator::JacobiPreconditioner;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SolveStatistics {
    /// Number of solver iterations, zero for direct solvers.
    pub iterations: usize,
    /// Residual norm `|b - Ax|` relative to `|b|`.
    pub residual: f64,
}

/// The solution of a linear system, one value per DOF.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionVector {
    values: DVector<f64>,
    statistics: SolveStatistics,
}

impl SolutionVector {
    pub fn new(values: DVector<f64>, statistics: SolveStatistics) -> Self {
        Self { values, statistics }
    }

    /// A solution vector that was not produced by a solver, e.g. an interpolated function.
    pub fn from_values(values: impl Into<Vec<f64>>) -> Self {
        Self::new(
            DVector::from_vec(values.into()),
            SolveStatistics {
                iterations: 0,
                residual: 0.0,
            },
        )
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, dof: usize) -> f64 {
        self.values[dof]
    }

    pub fn statistics(&self) -> &SolveStatistics {
        &self.statistics
    }

    pub fn into_inner(self) -> DVector<f64> {
        self.values
    }
}

pub trait LinearSolver {
    fn solve(&self, system: &ConstrainedSystem) -> Result<SolutionVector>;
}

/// `|b - Ax| / |b|`, or `|Ax|` for a zero right-hand side.
fn relative_residual(matrix: &CsrMatrix<f64>, x: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let residual_norm = matrix
        .row_iter()
        .zip(b.iter())
        .map(|(row, &b_i)| {
            let ax_i: f64 = row
                .col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &a_ij)| a_ij * x[j])
                .sum();
            (b_i - ax_i).powi(2)
        })
        .sum::<f64>()
        .sqrt();
    let b_norm = b.norm();
    if b_norm > 0.0 {
        residual_norm / b_norm
    } else {
        residual_norm
    }
}

/// Whether every row sums to zero, which means the constant vector lies in the kernel.
///
/// This is the case for diffusion operators without any Dirichlet condition or reaction term.
fn has_constant_kernel(matrix: &CsrMatrix<f64>) -> bool {
    matrix.nrows() > 0
        && matrix.row_iter().all(|row| {
            let sum: f64 = row.values().iter().sum();
            let abs_sum: f64 = row.values().iter().map(|a_ij| a_ij.abs()).sum();
            sum.abs() <= 1e-10 * abs_sum
        })
}

fn constant_kernel_error() -> Error {
    Error::SingularSystem {
        reason: "constant vectors lie in the kernel of the operator (no Dirichlet condition constrains the system)"
            .to_string(),
    }
}

/// Sparse Cholesky factorization.
///
/// Requires a symmetric positive definite system, which is what elimination of Dirichlet
/// conditions produces for well-posed problems.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectSolver {
    /// Solutions whose relative residual exceeds this are rejected as singular.
    pub residual_tolerance: f64,
    /// Factorizations whose smallest pivot is below this fraction of the largest pivot are
    /// rejected as singular.
    pub pivot_tolerance: f64,
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self {
            residual_tolerance: 1e-6,
            pivot_tolerance: 1e-12,
        }
    }
}

impl DirectSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_residual_tolerance(self, residual_tolerance: f64) -> Self {
        Self {
            residual_tolerance,
            ..self
        }
    }

    pub fn with_pivot_tolerance(self, pivot_tolerance: f64) -> Self {
        Self {
            pivot_tolerance,
            ..self
        }
    }
}

impl LinearSolver for DirectSolver {
    fn solve(&self, system: &ConstrainedSystem) -> Result<SolutionVector> {
        let start = Instant::now();
        let matrix = system.matrix();
        let rhs = system.rhs();

        for (i, row) in matrix.row_iter().enumerate() {
            let diagonal = row
                .col_indices()
                .binary_search(&i)
                .ok()
                .map(|local_idx| row.values()[local_idx])
                .unwrap_or(0.0);
            if !(diagonal > 0.0 && diagonal.is_finite()) {
                return Err(Error::SingularSystem {
                    reason: format!("diagonal entry {} is {:e}", i, diagonal),
                });
            }
        }

        if has_constant_kernel(matrix) {
            return Err(constant_kernel_error());
        }

        let csc = CscMatrix::from(matrix);
        let factorization = CscCholesky::factor(&csc).map_err(|err| Error::SingularSystem {
            reason: format!("Cholesky factorization failed: {:?}", err),
        })?;
        let (min_pivot, max_pivot) = pivot_range(factorization.l());
        if !(min_pivot > self.pivot_tolerance * max_pivot) {
            return Err(Error::SingularSystem {
                reason: format!(
                    "smallest Cholesky pivot {:e} is negligible compared to the largest pivot {:e}",
                    min_pivot, max_pivot
                ),
            });
        }
        let b = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
        let x: DVector<f64> = factorization.solve(&b).column(0).into_owned();

        if x.iter().any(|x_i| !x_i.is_finite()) {
            return Err(Error::SingularSystem {
                reason: "Cholesky solve produced non-finite values".to_string(),
            });
        }
        let residual = relative_residual(matrix, &x, rhs);
        if !(residual <= self.residual_tolerance) {
            return Err(Error::SingularSystem {
                reason: format!(
                    "relative residual {:e} of direct solve exceeds tolerance {:e}",
                    residual, self.residual_tolerance
                ),
            });
        }

        info!(
            "Direct solve of {} DOFs finished in {:.2?} (relative residual {:e})",
            rhs.len(),
            start.elapsed(),
            residual
        );
        Ok(SolutionVector::new(
            x,
            SolveStatistics {
                iterations: 0,
                residual,
            },
        ))
    }
}

/// Smallest and largest pivot `l_jj²` of a Cholesky factor.
fn pivot_range(l: &CscMatrix<f64>) -> (f64, f64) {
    (0..l.ncols())
        .map(|j| {
            let column = l.col(j);
            column
                .row_indices()
                .binary_search(&j)
                .ok()
                .map(|local_idx| column.values()[local_idx].powi(2))
                .unwrap_or(0.0)
        })
        .fold((f64::INFINITY, 0.0), |(min, max), pivot| (min.min(pivot), max.max(pivot)))
}

/// Jacobi-preconditioned conjugate gradient with iteration and wall-clock budgets.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateGradientSolver {
    pub relative_tolerance: f64,
    pub max_iterations: usize,
    pub deadline: Option<Duration>,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-10,
            max_iterations: 10_000,
            deadline: None,
        }
    }
}

impl ConjugateGradientSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relative_tolerance(self, relative_tolerance: f64) -> Self {
        Self {
            relative_tolerance,
            ..self
        }
    }

    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self { max_iterations, ..self }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }
}

impl LinearSolver for ConjugateGradientSolver {
    fn solve(&self, system: &ConstrainedSystem) -> Result<SolutionVector> {
        let start = Instant::now();
        let matrix = system.matrix();
        if has_constant_kernel(matrix) {
            return Err(constant_kernel_error());
        }
        let preconditioner = JacobiPreconditioner::from_csr(matrix);
        let mut pcg = PcgSolver::new(self.relative_tolerance).with_max_iterations(self.max_iterations);
        if let Some(deadline) = self.deadline {
            pcg = pcg.with_time_budget(deadline);
        }

        let mut x = DVector::zeros(system.num_dofs());
        match pcg.solve(matrix, &preconditioner, system.rhs().into(), (&mut x).into()) {
            Ok(report) => {
                info!(
                    "CG solve of {} DOFs converged in {} iterations and {:.2?} (relative residual {:e})",
                    system.num_dofs(),
                    report.iterations,
                    start.elapsed(),
                    report.relative_residual()
                );
                Ok(SolutionVector::new(
                    x,
                    SolveStatistics {
                        iterations: report.iterations,
                        residual: report.relative_residual(),
                    },
                ))
            }
            Err(error) => {
                debug!("CG solve failed: {}", error);
                let iterations = error.report.iterations;
                let residual = error.report.relative_residual();
                if error.failure.is_budget_exhausted() {
                    Err(Error::SolverDiverged { iterations, residual })
                } else {
                    Err(Error::SingularSystem {
                        reason: format!(
                            "conjugate gradient breakdown after {} iterations: {}",
                            iterations, error.failure
                        ),
                    })
                }
            }
        }
    }
}

/// Serializable choice of linear solver.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverConfig {
    Direct(DirectSolver),
    ConjugateGradient(ConjugateGradientSolver),
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::Direct(DirectSolver::default())
    }
}

impl From<DirectSolver> for SolverConfig {
    fn from(solver: DirectSolver) -> Self {
        Self::Direct(solver)
    }
}

impl From<ConjugateGradientSolver> for SolverConfig {
    fn from(solver: ConjugateGradientSolver) -> Self {
        Self::ConjugateGradient(solver)
    }
}

impl LinearSolver for SolverConfig {
    fn solve(&self, system: &ConstrainedSystem) -> Result<SolutionVector> {
        match self {
            Self::Direct(solver) => solver.solve(system),
            Self::ConjugateGradient(solver) => solver.solve(system),
        }
    }
}

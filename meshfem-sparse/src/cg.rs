//! Preconditioned conjugate gradient with iteration and wall-clock budgets.
use crate::operator::LinearOperator;
use core::fmt;
use nalgebra::{DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use num::Zero;
use std::error::Error;
use std::time::{Duration, Instant};

/// Summary of a (possibly aborted) PCG run.
#[derive(Debug, Clone, PartialEq)]
pub struct PcgReport<T> {
    /// Number of updates made to the solution vector.
    pub iterations: usize,
    /// Norm of the recurrence residual when the solver stopped.
    ///
    /// For ill-conditioned problems this may drift from the true residual `b - Ax`.
    pub residual_norm: T,
    pub rhs_norm: T,
}

impl<T: RealField> PcgReport<T> {
    /// Residual norm relative to the right-hand side norm (zero for a zero right-hand side).
    pub fn relative_residual(&self) -> T {
        if self.rhs_norm.is_zero() {
            T::zero()
        } else {
            self.residual_norm.clone() / self.rhs_norm.clone()
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum PcgFailure {
    Operator(Box<dyn Error>),
    Preconditioner(Box<dyn Error>),
    /// A search direction with `pᵀAp <= 0` was encountered.
    IndefiniteOperator,
    /// A residual with `rᵀPr <= 0` was encountered.
    IndefinitePreconditioner,
    IterationBudgetExhausted { max_iterations: usize },
    TimeBudgetExceeded { budget: Duration },
}

impl PcgFailure {
    /// Whether the solver ran out of iterations or time rather than breaking down.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(
            self,
            Self::IterationBudgetExhausted { .. } | Self::TimeBudgetExceeded { .. }
        )
    }
}

impl fmt::Display for PcgFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator(err) => write!(f, "error applying operator: {}", err),
            Self::Preconditioner(err) => write!(f, "error applying preconditioner: {}", err),
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::IterationBudgetExhausted { max_iterations } => {
                write!(f, "no convergence within {} iterations", max_iterations)
            }
            Self::TimeBudgetExceeded { budget } => write!(f, "time budget of {:?} exceeded", budget),
        }
    }
}

#[derive(Debug)]
pub struct PcgError<T> {
    pub report: PcgReport<T>,
    pub failure: PcgFailure,
}

impl<T> fmt::Display for PcgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCG failed after {} iterations: {}", self.report.iterations, self.failure)
    }
}

impl<T: fmt::Debug> Error for PcgError<T> {}

#[derive(Debug, Clone)]
struct PcgWorkspace<T: Scalar> {
    residual: DVector<T>,
    preconditioned: DVector<T>,
    direction: DVector<T>,
    operator_direction: DVector<T>,
}

impl<T: Scalar + Zero> PcgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for buffer in [
            &mut self.residual,
            &mut self.preconditioned,
            &mut self.direction,
            &mut self.operator_direction,
        ] {
            buffer.resize_vertically_mut(dim, T::zero());
        }
    }
}

/// Conjugate gradient for symmetric positive definite operators.
///
/// The solver owns its work vectors, so repeated solves of the same size do not allocate.
///
/// ```ignore
/// let preconditioner = JacobiPreconditioner::from_csr(&matrix);
/// let report = PcgSolver::new(1e-10)
///     .with_max_iterations(500)
///     .solve(&matrix, &preconditioner, (&b).into(), (&mut x).into())?;
/// ```
#[derive(Debug, Clone)]
pub struct PcgSolver<T: Scalar> {
    relative_tolerance: T,
    max_iterations: Option<usize>,
    time_budget: Option<Duration>,
    workspace: PcgWorkspace<T>,
}

impl<T: RealField> PcgSolver<T> {
    /// Converges once `|r| <= relative_tolerance * |b|` for the recurrence residual `r`.
    pub fn new(relative_tolerance: T) -> Self {
        Self {
            relative_tolerance,
            max_iterations: None,
            time_budget: None,
            workspace: PcgWorkspace {
                residual: DVector::zeros(0),
                preconditioned: DVector::zeros(0),
                direction: DVector::zeros(0),
                operator_direction: DVector::zeros(0),
            },
        }
    }

    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations: Some(max_iterations),
            ..self
        }
    }

    /// Abort the solve once it has been running for longer than `budget`.
    ///
    /// The budget is checked once per iteration, so a single expensive operator application
    /// may overshoot it.
    pub fn with_time_budget(self, budget: Duration) -> Self {
        Self {
            time_budget: Some(budget),
            ..self
        }
    }

    /// Solves `A x = b` using the contents of `x` as the initial guess.
    ///
    /// `preconditioner` approximates `A^{-1}` and must be symmetric positive definite.
    #[allow(non_snake_case)]
    pub fn solve(
        &mut self,
        operator: &dyn LinearOperator<T>,
        preconditioner: &dyn LinearOperator<T>,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<PcgReport<T>, PcgError<T>> {
        assert_eq!(b.len(), x.len(), "right-hand side and solution must have the same length");
        let start = Instant::now();
        let mut report = PcgReport {
            iterations: 0,
            residual_norm: T::zero(),
            rhs_norm: b.norm(),
        };
        let fail = |report: &PcgReport<T>, failure: PcgFailure| -> Result<PcgReport<T>, PcgError<T>> {
            Err(PcgError {
                report: report.clone(),
                failure,
            })
        };

        if report.rhs_norm.is_zero() {
            x.fill(T::zero());
            return Ok(report);
        }

        self.workspace.resize(x.len());
        let PcgWorkspace {
            residual: r,
            preconditioned: z,
            direction: p,
            operator_direction: Ap,
        } = &mut self.workspace;

        // r = b - A x
        if let Err(err) = operator.apply((&mut *r).into(), (&x).into()) {
            return fail(&report, PcgFailure::Operator(err));
        }
        r.zip_apply(&b, |Ax_i, b_i| *Ax_i = b_i - Ax_i.clone());

        if let Err(err) = preconditioner.apply((&mut *z).into(), (&*r).into()) {
            return fail(&report, PcgFailure::Preconditioner(err));
        }
        p.copy_from(z);
        let mut rTz = r.dot(z);
        let tolerance = self.relative_tolerance.clone() * report.rhs_norm.clone();

        loop {
            report.residual_norm = r.norm();
            if report.residual_norm <= tolerance {
                return Ok(report);
            }
            if let Some(max_iterations) = self.max_iterations {
                if report.iterations >= max_iterations {
                    return fail(&report, PcgFailure::IterationBudgetExhausted { max_iterations });
                }
            }
            if let Some(budget) = self.time_budget {
                if start.elapsed() > budget {
                    return fail(&report, PcgFailure::TimeBudgetExceeded { budget });
                }
            }
            if rTz <= T::zero() {
                return fail(&report, PcgFailure::IndefinitePreconditioner);
            }

            if let Err(err) = operator.apply((&mut *Ap).into(), (&*p).into()) {
                return fail(&report, PcgFailure::Operator(err));
            }
            let pAp = p.dot(Ap);
            if pAp <= T::zero() {
                return fail(&report, PcgFailure::IndefiniteOperator);
            }

            let alpha = rTz.clone() / pAp;
            x.axpy(alpha.clone(), &*p, T::one());
            r.axpy(-alpha, &*Ap, T::one());
            report.iterations += 1;

            if let Err(err) = preconditioner.apply((&mut *z).into(), (&*r).into()) {
                return fail(&report, PcgFailure::Preconditioner(err));
            }
            let rTz_next = r.dot(z);
            let beta = rTz_next.clone() / rTz;
            // p = z + beta p
            p.axpy(T::one(), &*z, beta);
            rTz = rTz_next;
        }
    }
}

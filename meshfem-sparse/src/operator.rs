use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, RealField, Scalar, U1};
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;
use std::fmt;

/// A linear map `y = A x` between vectors of the same scalar type.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

/// Returned by operators whose dimensions do not match the vectors they are applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub operator_shape: (usize, usize),
    pub output_len: usize,
    pub input_len: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nrows, ncols) = self.operator_shape;
        write!(
            f,
            "cannot apply {}x{} operator to input of length {} with output of length {}",
            nrows, ncols, self.input_len, self.output_len
        )
    }
}

impl Error for DimensionMismatch {}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: RealField,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if self.nrows() != y.len() || self.ncols() != x.len() {
            return Err(Box::new(DimensionMismatch {
                operator_shape: (self.nrows(), self.ncols()),
                output_len: y.len(),
                input_len: x.len(),
            }));
        }

        for (i, row) in self.row_iter().enumerate() {
            let mut y_i = T::zero();
            for (&j, a_ij) in row.col_indices().iter().zip(row.values()) {
                y_i += a_ij.clone() * x[j].clone();
            }
            y[i] = y_i;
        }
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner `P = diag(A)^{-1}`.
///
/// Rows with a zero or non-finite diagonal entry are left unscaled.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobiPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let inverse_diagonal = DVector::from_iterator(
            matrix.nrows(),
            matrix.row_iter().enumerate().map(|(i, row)| {
                let diagonal = row
                    .col_indices()
                    .binary_search(&i)
                    .ok()
                    .map(|idx| row.values()[idx].clone())
                    .unwrap_or_else(T::zero);
                if diagonal == T::zero() || !diagonal.is_finite() {
                    T::one()
                } else {
                    T::one() / diagonal
                }
            }),
        );
        Self { inverse_diagonal }
    }

    pub fn inverse_diagonal(&self) -> &DVector<T> {
        &self.inverse_diagonal
    }
}

impl<T: RealField> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.inverse_diagonal.len();
        if y.len() != n || x.len() != n {
            return Err(Box::new(DimensionMismatch {
                operator_shape: (n, n),
                output_len: y.len(),
                input_len: x.len(),
            }));
        }
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

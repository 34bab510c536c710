//! Sparse iterative solvers used by `meshfem`.
//!
//! The solvers are written against the [`LinearOperator`](operator::LinearOperator) abstraction
//! so that they can be applied to assembled CSR matrices as well as matrix-free operators.

pub mod cg;
pub mod operator;

pub use nalgebra_sparse::CsrMatrix;

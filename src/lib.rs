//! Sparse finite element assembly and solution of scalar elliptic problems
//! `-div(ν ∇u) + r u = f` with continuous Lagrange elements on simplicial meshes.
//!
//! The pipeline follows the modules: reference [`quadrature`] and [`element`] tables, a
//! [`mesh`] with physical groups and its [`dof`] numbering, element evaluation and global
//! [`assembly`] into a shared sparsity pattern, Dirichlet [`constraints`], a linear [`solver`]
//! and per-element [`field`] post-processing. [`problem`] drives all stages.
pub mod assembly;
pub mod constraints;
pub mod dof;
pub mod element;
pub mod error;
pub mod field;
pub mod io;
pub mod mesh;
pub mod problem;
pub mod quadrature;
pub mod solver;

pub use error::{Error, Result};

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

//! Error taxonomy shared by all stages of the assembly and solve pipeline.
use crate::constraints::ConstraintClaim;
use crate::element::ElementShape;
use std::fmt;
use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// No Lagrange element is available for the requested shape and polynomial order.
    UnsupportedOrderOrShape { shape: ElementShape, order: usize },
    /// No quadrature rule of the requested strength is available for the shape.
    UnsupportedQuadrature { shape: ElementShape, strength: usize },
    /// The mesh data violates a structural invariant.
    InvalidMesh(String),
    /// The element has a non-positive (or non-finite) Jacobian determinant.
    InvertedElement { element_index: usize, determinant: f64 },
    /// Two constraints prescribe different values for the same DOF without a priority to decide.
    ConflictingConstraint {
        dof: usize,
        first: ConstraintClaim,
        second: ConstraintClaim,
    },
    /// A constraint refers to a DOF that does not exist in the system.
    InvalidConstraint { dof: usize, num_dofs: usize },
    /// A Dirichlet condition refers to a physical group the mesh does not have.
    UnknownPhysicalGroup { tag: i32 },
    /// The linear system could not be solved because it is (numerically) singular.
    SingularSystem { reason: String },
    /// The iterative solver exhausted its iteration or time budget.
    SolverDiverged { iterations: usize, residual: f64 },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOrderOrShape { shape, order } => {
                write!(f, "no Lagrange element of order {} is available for shape {:?}", order, shape)
            }
            Self::UnsupportedQuadrature { shape, strength } => {
                write!(f, "no quadrature rule of strength {} is available for shape {:?}", strength, shape)
            }
            Self::InvalidMesh(msg) => write!(f, "invalid mesh: {}", msg),
            Self::InvertedElement {
                element_index,
                determinant,
            } => write!(
                f,
                "element {} is inverted or degenerate (Jacobian determinant {:e})",
                element_index, determinant
            ),
            Self::ConflictingConstraint { dof, first, second } => write!(
                f,
                "conflicting Dirichlet values for DOF {}: {} vs. {}",
                dof, first, second
            ),
            Self::InvalidConstraint { dof, num_dofs } => {
                write!(f, "constraint on DOF {} but the system only has {} DOFs", dof, num_dofs)
            }
            Self::UnknownPhysicalGroup { tag } => {
                write!(f, "the mesh has no physical group with tag {}", tag)
            }
            Self::SingularSystem { reason } => write!(f, "singular system: {}", reason),
            Self::SolverDiverged { iterations, residual } => write!(
                f,
                "iterative solver did not converge after {} iterations (relative residual {:e})",
                iterations, residual
            ),
        }
    }
}

impl std::error::Error for Error {}

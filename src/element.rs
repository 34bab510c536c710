//! Lagrange reference elements on the reference simplices.
//!
//! Every supported combination of [`ElementShape`] and polynomial order has its own type
//! implementing [`ReferenceFiniteElement`]. Node ordering follows Gmsh: corner vertices first,
//! then one node per local edge (see [`ElementShape::local_edges`]).
use crate::error::{Error, Result};
use nalgebra::DMatrixViewMut;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod reference_table;
mod segment;
mod tetrahedron;
mod triangle;

pub use reference_table::ReferenceTable;
pub use segment::{Segment2, Segment3};
pub use tetrahedron::{Tet10, Tet4};
pub use triangle::{Tri3, Tri6};

/// Geometric shape of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementShape {
    Segment,
    Triangle,
    Tetrahedron,
}

impl ElementShape {
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle => 2,
            Self::Tetrahedron => 3,
        }
    }

    /// Number of corner vertices.
    pub fn num_vertices(&self) -> usize {
        self.reference_dim() + 1
    }

    /// Number of vertices of a facet (the boundary entities of dimension `d - 1`).
    pub fn num_facet_vertices(&self) -> usize {
        self.reference_dim()
    }

    /// Local edges as pairs of local vertex indices, in the order used for edge nodes.
    pub fn local_edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Segment => &[[0, 1]],
            Self::Triangle => &[[0, 1], [1, 2], [2, 0]],
            Self::Tetrahedron => &[[0, 1], [1, 2], [2, 0], [0, 3], [2, 3], [1, 3]],
        }
    }

    /// Length, area or volume of the reference domain.
    pub fn reference_volume(&self) -> f64 {
        match self {
            Self::Segment => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }

    pub fn from_reference_dim(dim: usize) -> Option<Self> {
        match dim {
            1 => Some(Self::Segment),
            2 => Some(Self::Triangle),
            3 => Some(Self::Tetrahedron),
            _ => None,
        }
    }
}

/// A Lagrange element type: a shape together with a polynomial order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementType {
    shape: ElementShape,
    order: usize,
}

impl ElementType {
    /// Fails with [`Error::UnsupportedOrderOrShape`] unless a reference element exists.
    pub fn new(shape: ElementShape, order: usize) -> Result<Self> {
        let element_type = Self { shape, order };
        element_type.reference_element()?;
        Ok(element_type)
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_nodes(&self) -> usize {
        match self.order {
            1 => self.shape.num_vertices(),
            _ => self.shape.num_vertices() + self.shape.local_edges().len(),
        }
    }

    /// Quadrature strength that integrates the mass matrix exactly on affine elements.
    pub fn default_quadrature_strength(&self) -> usize {
        2 * self.order
    }

    pub fn reference_element(&self) -> Result<&'static dyn ReferenceFiniteElement> {
        use ElementShape::*;
        match (self.shape, self.order) {
            (Segment, 1) => Ok(&Segment2),
            (Segment, 2) => Ok(&Segment3),
            (Triangle, 1) => Ok(&Tri3),
            (Triangle, 2) => Ok(&Tri6),
            (Tetrahedron, 1) => Ok(&Tet4),
            (Tetrahedron, 2) => Ok(&Tet10),
            (shape, order) => Err(Error::UnsupportedOrderOrShape { shape, order }),
        }
    }
}

pub trait ReferenceFiniteElement: Debug + Send + Sync {
    fn element_type(&self) -> ElementType;

    fn reference_dim(&self) -> usize {
        self.element_type().shape().reference_dim()
    }

    /// Returns the number of nodes in the element.
    fn num_nodes(&self) -> usize {
        self.element_type().num_nodes()
    }

    /// Reference coordinates of the nodes, `reference_dim` entries per node.
    fn reference_nodes(&self) -> &'static [f64];

    /// Evaluates each basis function at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `basis_values` does not have exactly one entry per node.
    fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]);

    /// Writes the reference gradient of each basis function into the corresponding column of
    /// `gradients`, a `reference_dim x num_nodes` matrix.
    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<f64>, xi: &[f64]);
}

/// Barycentric coordinates `λ_0 = 1 - Σ ξ_k` and `λ_{k+1} = ξ_k`; unused entries are zero.
fn barycentric(xi: &[f64]) -> [f64; 4] {
    let mut lambda = [0.0; 4];
    lambda[0] = 1.0 - xi.iter().sum::<f64>();
    lambda[1..=xi.len()].copy_from_slice(xi);
    lambda
}

/// Component `k` of the (constant) reference gradient of `λ_a`.
fn barycentric_gradient(a: usize, k: usize) -> f64 {
    if a == 0 {
        -1.0
    } else if k + 1 == a {
        1.0
    } else {
        0.0
    }
}

fn populate_linear_basis(basis_values: &mut [f64], xi: &[f64]) {
    let n = xi.len() + 1;
    assert_eq!(basis_values.len(), n, "basis buffer must have one entry per node");
    basis_values.copy_from_slice(&barycentric(xi)[..n]);
}

fn populate_linear_gradients(mut gradients: DMatrixViewMut<f64>, xi: &[f64]) {
    let d = xi.len();
    assert_eq!(gradients.shape(), (d, d + 1), "gradient buffer has wrong dimensions");
    for a in 0..=d {
        for k in 0..d {
            gradients[(k, a)] = barycentric_gradient(a, k);
        }
    }
}

/// Quadratic basis expressed through the linear one: `λ_a (2 λ_a - 1)` at the vertices and
/// `4 λ_a λ_b` on the edge `(a, b)`.
fn populate_quadratic_basis(basis_values: &mut [f64], xi: &[f64], edges: &[[usize; 2]]) {
    let num_vertices = xi.len() + 1;
    assert_eq!(
        basis_values.len(),
        num_vertices + edges.len(),
        "basis buffer must have one entry per node"
    );
    let lambda = barycentric(xi);
    for a in 0..num_vertices {
        basis_values[a] = lambda[a] * (2.0 * lambda[a] - 1.0);
    }
    for (e, &[a, b]) in edges.iter().enumerate() {
        basis_values[num_vertices + e] = 4.0 * lambda[a] * lambda[b];
    }
}

fn populate_quadratic_gradients(mut gradients: DMatrixViewMut<f64>, xi: &[f64], edges: &[[usize; 2]]) {
    let d = xi.len();
    let num_vertices = d + 1;
    assert_eq!(
        gradients.shape(),
        (d, num_vertices + edges.len()),
        "gradient buffer has wrong dimensions"
    );
    let lambda = barycentric(xi);
    for k in 0..d {
        for a in 0..num_vertices {
            gradients[(k, a)] = (4.0 * lambda[a] - 1.0) * barycentric_gradient(a, k);
        }
        for (e, &[a, b]) in edges.iter().enumerate() {
            gradients[(k, num_vertices + e)] =
                4.0 * (lambda[b] * barycentric_gradient(a, k) + lambda[a] * barycentric_gradient(b, k));
        }
    }
}

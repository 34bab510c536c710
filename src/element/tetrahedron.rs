use super::{
    populate_linear_basis, populate_linear_gradients, populate_quadratic_basis, populate_quadratic_gradients,
    ElementShape, ElementType, ReferenceFiniteElement,
};
use nalgebra::DMatrixViewMut;

/// Linear tetrahedron with vertices `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Tet4;

/// Quadratic tetrahedron with Gmsh edge ordering `(0,1), (1,2), (2,0), (0,3), (2,3), (1,3)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Tet10;

impl ReferenceFiniteElement for Tet4 {
    fn element_type(&self) -> ElementType {
        ElementType {
            shape: ElementShape::Tetrahedron,
            order: 1,
        }
    }

    #[rustfmt::skip]
    fn reference_nodes(&self) -> &'static [f64] {
        &[0.0, 0.0, 0.0,
          1.0, 0.0, 0.0,
          0.0, 1.0, 0.0,
          0.0, 0.0, 1.0]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]) {
        assert_eq!(xi.len(), 3);
        populate_linear_basis(basis_values, xi);
    }

    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<f64>, xi: &[f64]) {
        assert_eq!(xi.len(), 3);
        populate_linear_gradients(gradients, xi);
    }
}

impl ReferenceFiniteElement for Tet10 {
    fn element_type(&self) -> ElementType {
        ElementType {
            shape: ElementShape::Tetrahedron,
            order: 2,
        }
    }

    #[rustfmt::skip]
    fn reference_nodes(&self) -> &'static [f64] {
        &[0.0, 0.0, 0.0,
          1.0, 0.0, 0.0,
          0.0, 1.0, 0.0,
          0.0, 0.0, 1.0,
          0.5, 0.0, 0.0,
          0.5, 0.5, 0.0,
          0.0, 0.5, 0.0,
          0.0, 0.0, 0.5,
          0.0, 0.5, 0.5,
          0.5, 0.0, 0.5]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]) {
        assert_eq!(xi.len(), 3);
        populate_quadratic_basis(basis_values, xi, ElementShape::Tetrahedron.local_edges());
    }

    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<f64>, xi: &[f64]) {
        assert_eq!(xi.len(), 3);
        populate_quadratic_gradients(gradients, xi, ElementShape::Tetrahedron.local_edges());
    }
}

use super::{
    populate_linear_basis, populate_linear_gradients, populate_quadratic_basis, populate_quadratic_gradients,
    ElementShape, ElementType, ReferenceFiniteElement,
};
use nalgebra::DMatrixViewMut;

/// Linear segment on `[0, 1]`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Segment2;

/// Quadratic segment on `[0, 1]` with the mid node last.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Segment3;

impl ReferenceFiniteElement for Segment2 {
    fn element_type(&self) -> ElementType {
        ElementType {
            shape: ElementShape::Segment,
            order: 1,
        }
    }

    fn reference_nodes(&self) -> &'static [f64] {
        &[0.0, 1.0]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]) {
        assert_eq!(xi.len(), 1);
        populate_linear_basis(basis_values, xi);
    }

    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<f64>, xi: &[f64]) {
        assert_eq!(xi.len(), 1);
        populate_linear_gradients(gradients, xi);
    }
}

impl ReferenceFiniteElement for Segment3 {
    fn element_type(&self) -> ElementType {
        ElementType {
            shape: ElementShape::Segment,
            order: 2,
        }
    }

    fn reference_nodes(&self) -> &'static [f64] {
        &[0.0, 1.0, 0.5]
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]) {
        assert_eq!(xi.len(), 1);
        populate_quadratic_basis(basis_values, xi, ElementShape::Segment.local_edges());
    }

    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<f64>, xi: &[f64]) {
        assert_eq!(xi.len(), 1);
        populate_quadratic_gradients(gradients, xi, ElementShape::Segment.local_edges());
    }
}

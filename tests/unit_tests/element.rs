use meshfem::element::{ElementShape, ElementType, ReferenceFiniteElement, ReferenceTable};
use meshfem::Error;
use nalgebra::DMatrix;
use proptest::prelude::*;
use std::sync::Arc;
use util::assert_approx_scalar_eq;

fn all_element_types() -> Vec<ElementType> {
    let mut types = Vec::new();
    for shape in [ElementShape::Segment, ElementShape::Triangle, ElementShape::Tetrahedron] {
        for order in [1, 2] {
            types.push(ElementType::new(shape, order).unwrap());
        }
    }
    types
}

fn evaluate_basis(element: &dyn ReferenceFiniteElement, xi: &[f64]) -> Vec<f64> {
    let mut phi = vec![0.0; element.num_nodes()];
    element.populate_basis(&mut phi, xi);
    phi
}

fn evaluate_gradients(element: &dyn ReferenceFiniteElement, xi: &[f64]) -> DMatrix<f64> {
    let mut gradients = DMatrix::zeros(element.reference_dim(), element.num_nodes());
    element.populate_basis_gradients((&mut gradients).into(), xi);
    gradients
}

/// Maps a point of the unit cube into the reference simplex of the same dimension.
fn simplex_point_from_cube(x: &[f64]) -> Vec<f64> {
    let sum: f64 = x.iter().sum();
    if sum > 1.0 {
        x.iter().map(|x_k| x_k / sum).collect()
    } else {
        x.to_vec()
    }
}

#[test]
fn node_counts() {
    let expected = [2, 3, 3, 6, 4, 10];
    for (element_type, expected) in all_element_types().into_iter().zip(expected) {
        assert_eq!(element_type.num_nodes(), expected);
        let element = element_type.reference_element().unwrap();
        assert_eq!(element.num_nodes(), expected);
        assert_eq!(element.reference_nodes().len(), expected * element.reference_dim());
    }
}

#[test]
fn unsupported_orders_are_rejected() {
    for shape in [ElementShape::Segment, ElementShape::Triangle, ElementShape::Tetrahedron] {
        for order in [0, 3] {
            assert_eq!(
                ElementType::new(shape, order).unwrap_err(),
                Error::UnsupportedOrderOrShape { shape, order }
            );
        }
    }
}

#[test]
fn lagrange_property() {
    // We expect that N_i(x_j) = delta_ij, where x_j is the reference position of node j
    for element_type in all_element_types() {
        let element = element_type.reference_element().unwrap();
        let d = element.reference_dim();
        for (j, x_j) in element.reference_nodes().chunks_exact(d).enumerate() {
            let phi = evaluate_basis(element, x_j);
            for (i, phi_i) in phi.into_iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_approx_scalar_eq!(phi_i, expected, abstol = 1e-14);
            }
        }
    }
}

#[test]
fn quadratic_elements_reproduce_quadratics() {
    let f = |x: &[f64]| -> f64 {
        let x0 = x[0];
        let x1 = x.get(1).copied().unwrap_or(0.0);
        let x2 = x.get(2).copied().unwrap_or(0.0);
        1.0 + 2.0 * x0 - x1 + 0.5 * x2 + 3.0 * x0 * x0 - x0 * x1 + 2.0 * x1 * x2 - x2 * x2
    };
    for shape in [ElementShape::Segment, ElementShape::Triangle, ElementShape::Tetrahedron] {
        let element = ElementType::new(shape, 2).unwrap().reference_element().unwrap();
        let d = element.reference_dim();
        let nodal_values: Vec<f64> = element.reference_nodes().chunks_exact(d).map(f).collect();
        let xi = &[0.2, 0.3, 0.1][..d];
        let interpolated: f64 = evaluate_basis(element, xi)
            .iter()
            .zip(&nodal_values)
            .map(|(phi, u)| phi * u)
            .sum();
        assert_approx_scalar_eq!(interpolated, f(xi), abstol = 1e-13);
    }
}

#[test]
fn reference_tables_are_memoized() {
    let element_type = ElementType::new(ElementShape::Triangle, 2).unwrap();
    let a = ReferenceTable::get(element_type, 4).unwrap();
    let b = ReferenceTable::with_default_strength(element_type).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let c = ReferenceTable::get(element_type, 5).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
}

#[test]
fn reference_table_matches_direct_evaluation() {
    for element_type in all_element_types() {
        let table = ReferenceTable::with_default_strength(element_type).unwrap();
        let element = table.reference_element();
        assert_eq!(table.num_nodes(), element_type.num_nodes());
        assert_eq!(table.num_points(), table.weights().len());
        for (q, xi) in table.quadrature().points().enumerate() {
            let phi = evaluate_basis(element, xi);
            let gradients = evaluate_gradients(element, xi);
            for i in 0..table.num_nodes() {
                assert_eq!(table.basis_values(q)[i], phi[i]);
            }
            assert_eq!(table.basis_gradients(q), &gradients);
        }
    }
}

#[test]
fn unsupported_table_strength_is_an_error() {
    let element_type = ElementType::new(ElementShape::Tetrahedron, 1).unwrap();
    assert!(matches!(
        ReferenceTable::get(element_type, 100),
        Err(Error::UnsupportedQuadrature { strength: 100, .. })
    ));
}

proptest! {
    #[test]
    fn partition_of_unity(x in prop::collection::vec(0.0..=1.0f64, 3)) {
        for element_type in all_element_types() {
            let element = element_type.reference_element().unwrap();
            let xi = simplex_point_from_cube(&x[..element.reference_dim()]);
            let sum: f64 = evaluate_basis(element, &xi).iter().sum();
            prop_assert!((sum - 1.0).abs() <= 1e-12);

            // Gradients of a partition of unity sum to zero
            let gradients = evaluate_gradients(element, &xi);
            for k in 0..element.reference_dim() {
                prop_assert!(gradients.row(k).sum().abs() <= 1e-12);
            }
        }
    }

    #[test]
    fn gradients_match_finite_differences(x in prop::collection::vec(0.05..=0.3f64, 3)) {
        let h = 1e-6;
        for element_type in all_element_types() {
            let element = element_type.reference_element().unwrap();
            let d = element.reference_dim();
            let xi = x[..d].to_vec();
            let gradients = evaluate_gradients(element, &xi);
            for k in 0..d {
                let mut forward = xi.clone();
                forward[k] += h;
                let mut backward = xi.clone();
                backward[k] -= h;
                let phi_forward = evaluate_basis(element, &forward);
                let phi_backward = evaluate_basis(element, &backward);
                for i in 0..element.num_nodes() {
                    let approx = (phi_forward[i] - phi_backward[i]) / (2.0 * h);
                    prop_assert!((approx - gradients[(k, i)]).abs() <= 1e-7);
                }
            }
        }
    }
}

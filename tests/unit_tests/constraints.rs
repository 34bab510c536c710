use meshfem::assembly::global::{GlobalAssembler, GlobalSystem};
use meshfem::assembly::local::ConstantCoefficients;
use meshfem::constraints::{
    apply, apply_with_scaling, resolve_constraints, BoundaryValue, ConstraintClaim, ConstraintSet, DiagonalScaling,
    DirichletCondition,
};
use meshfem::dof::DofMap;
use meshfem::mesh::procedural::{create_unit_interval_mesh, create_unit_square_uniform_tri_mesh_2d, BOTTOM, LEFT, RIGHT, TOP};
use meshfem::mesh::Mesh;
use meshfem::Error;
use nalgebra::{DMatrix, DVector};
use util::assert_approx_matrix_eq;

fn interval_system(mesh: &Mesh) -> GlobalSystem {
    let dof_map = DofMap::new(mesh, 1).unwrap();
    GlobalAssembler::from_mesh_and_dofs(mesh, &dof_map)
        .unwrap()
        .assemble(&ConstantCoefficients::new(1.0, 0.0))
        .unwrap()
}

#[test]
fn constraint_set_rejects_different_values() {
    let mut constraints = ConstraintSet::new();
    constraints.insert(3, 1.0).unwrap();
    constraints.insert(3, 1.0).unwrap();
    assert_eq!(constraints.len(), 1);
    assert!(matches!(
        constraints.insert(3, 2.0),
        Err(Error::ConflictingConstraint { dof: 3, .. })
    ));
    assert_eq!(constraints.get(3), Some(1.0));
}

#[test]
fn apply_with_unit_scaling_eliminates_constrained_dofs() {
    let mesh = create_unit_interval_mesh(2);
    let system = interval_system(&mesh);
    let constraints: ConstraintSet = [(0, 1.0), (2, 3.0)].into_iter().collect();

    let constrained = apply_with_scaling(system, &constraints, DiagonalScaling::Unit).unwrap();

    #[rustfmt::skip]
    let expected_matrix = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 4.0, 0.0,
        0.0, 0.0, 1.0,
    ]);
    assert_approx_matrix_eq!(&DMatrix::from(constrained.matrix()), &expected_matrix, abstol = 1e-12);
    assert_approx_matrix_eq!(constrained.rhs(), &DVector::from_column_slice(&[1.0, 8.0, 3.0]), abstol = 1e-12);
    assert_eq!(constrained.constraints(), &constraints);
}

#[test]
fn apply_with_matrix_scale_uses_mean_diagonal() {
    let mesh = create_unit_interval_mesh(2);
    let system = interval_system(&mesh);
    let constraints: ConstraintSet = [(0, 1.0), (2, 3.0)].into_iter().collect();

    let constrained = apply(system, &constraints).unwrap();
    let scale = 8.0 / 3.0;
    let matrix = DMatrix::from(constrained.matrix());
    assert_approx_matrix_eq!(
        matrix.diagonal(),
        DVector::from_column_slice(&[scale, 4.0, scale]),
        abstol = 1e-12
    );
    assert_approx_matrix_eq!(
        constrained.rhs(),
        &DVector::from_column_slice(&[scale, 8.0, 3.0 * scale]),
        abstol = 1e-12
    );
}

#[test]
fn elimination_preserves_symmetry() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(4);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let system = GlobalAssembler::from_mesh_and_dofs(&mesh, &dof_map)
        .unwrap()
        .assemble(&ConstantCoefficients::new(1.0, 1.0))
        .unwrap();
    let conditions = [DirichletCondition::on_facets(LEFT, 1.0), DirichletCondition::on_facets(TOP, 1.0)];
    let constraints = resolve_constraints(&mesh, &dof_map, &conditions).unwrap();

    let constrained = apply(system, &constraints).unwrap();
    let matrix = DMatrix::from(constrained.matrix());
    assert_approx_matrix_eq!(&matrix, &matrix.transpose(), abstol = 1e-14);
    for (dof, _) in constraints.iter() {
        for j in 0..matrix.ncols() {
            if j != dof {
                assert_eq!(matrix[(dof, j)], 0.0);
                assert_eq!(matrix[(j, dof)], 0.0);
            }
        }
    }
}

#[test]
fn out_of_range_constraint_is_an_error() {
    let mesh = create_unit_interval_mesh(2);
    let system = interval_system(&mesh);
    let constraints: ConstraintSet = [(5, 0.0)].into_iter().collect();
    assert_eq!(
        apply(system, &constraints).unwrap_err(),
        Error::InvalidConstraint { dof: 5, num_dofs: 3 }
    );
}

#[test]
fn facet_conditions_include_edge_dofs() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let conditions = [DirichletCondition::on_facets(
        BOTTOM,
        BoundaryValue::function(|x| 2.0 * x[0]),
    )];
    let constraints = resolve_constraints(&mesh, &dof_map, &conditions).unwrap();

    // Three vertices and two edge midpoints on the bottom side
    assert_eq!(constraints.len(), 5);
    for (dof, value) in constraints.iter() {
        let x = dof_map.dof_position(&mesh, dof);
        assert_eq!(x[1], 0.0);
        assert_eq!(value, 2.0 * x[0]);
    }
}

#[test]
fn node_conditions_only_constrain_vertex_dofs() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let constraints = resolve_constraints(&mesh, &dof_map, &[DirichletCondition::on_nodes(BOTTOM, 0.0)]).unwrap();
    assert_eq!(constraints.len(), 3);
}

#[test]
fn element_conditions_constrain_all_element_dofs() {
    let mesh = create_unit_interval_mesh(3);
    let groups = mesh.physical_groups().clone().with_element_tags(vec![0, 9, 0]);
    let mesh = mesh.with_physical_groups(groups).unwrap();
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let constraints = resolve_constraints(&mesh, &dof_map, &[DirichletCondition::on_elements(9, 4.0)]).unwrap();
    let dofs: Vec<usize> = constraints.iter().map(|(dof, _)| dof).collect();
    let mut expected = dof_map.element_dofs(1).to_vec();
    expected.sort_unstable();
    assert_eq!(dofs, expected);
}

#[test]
fn equal_values_do_not_conflict() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    let conditions = [DirichletCondition::on_facets(LEFT, 1.0), DirichletCondition::on_facets(BOTTOM, 1.0)];
    let constraints = resolve_constraints(&mesh, &dof_map, &conditions).unwrap();
    assert_eq!(constraints.len(), 5);
    assert!(constraints.iter().all(|(_, value)| value == 1.0));
}

#[test]
fn different_values_without_priority_conflict() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    let conditions = [DirichletCondition::on_facets(LEFT, 1.0), DirichletCondition::on_facets(BOTTOM, 2.0)];
    let corner_dof = dof_map.vertex_dof(0).unwrap();

    assert_eq!(
        resolve_constraints(&mesh, &dof_map, &conditions).unwrap_err(),
        Error::ConflictingConstraint {
            dof: corner_dof,
            first: ConstraintClaim {
                tag: Some(LEFT),
                value: 1.0,
                priority: None
            },
            second: ConstraintClaim {
                tag: Some(BOTTOM),
                value: 2.0,
                priority: None
            },
        }
    );

    // A single priority is not enough to decide
    let conditions = [
        DirichletCondition::on_facets(LEFT, 1.0).with_priority(1),
        DirichletCondition::on_facets(BOTTOM, 2.0),
    ];
    assert!(matches!(
        resolve_constraints(&mesh, &dof_map, &conditions),
        Err(Error::ConflictingConstraint { .. })
    ));

    // Neither are equal priorities
    let conditions = [
        DirichletCondition::on_facets(LEFT, 1.0).with_priority(1),
        DirichletCondition::on_facets(BOTTOM, 2.0).with_priority(1),
    ];
    assert!(matches!(
        resolve_constraints(&mesh, &dof_map, &conditions),
        Err(Error::ConflictingConstraint { .. })
    ));
}

#[test]
fn higher_priority_wins() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    let corner_dof = dof_map.vertex_dof(0).unwrap();
    for (left_priority, bottom_priority, expected) in [(2, 1, 1.0), (1, 2, 2.0)] {
        let conditions = [
            DirichletCondition::on_facets(LEFT, 1.0).with_priority(left_priority),
            DirichletCondition::on_facets(BOTTOM, 2.0).with_priority(bottom_priority),
        ];
        let constraints = resolve_constraints(&mesh, &dof_map, &conditions).unwrap();
        assert_eq!(constraints.get(corner_dof), Some(expected));
        assert_eq!(constraints.len(), 5);
    }
}

#[test]
fn resolution_does_not_depend_on_condition_order() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    let corner_dof = dof_map.vertex_dof(0).unwrap();
    let left = DirichletCondition::on_facets(LEFT, 1.0);
    let bottom_strong = DirichletCondition::on_facets(BOTTOM, 1.0).with_priority(5);
    let bottom_weak = DirichletCondition::on_facets(BOTTOM, 2.0).with_priority(3);

    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let conditions = [left.clone(), bottom_strong.clone(), bottom_weak.clone()];
    for order in orders {
        let permuted: Vec<_> = order.iter().map(|&i| conditions[i].clone()).collect();
        let constraints = resolve_constraints(&mesh, &dof_map, &permuted).unwrap();
        assert_eq!(constraints.get(corner_dof), Some(1.0), "order {:?}", order);
        assert_eq!(constraints.len(), 5);
        assert!(constraints.iter().all(|(_, value)| value == 1.0));
    }

    // An unprioritized claim with a different value is never overruled
    let conditions = [left, bottom_strong, DirichletCondition::on_facets(RIGHT, 3.0)];
    let right_bottom_dof = dof_map.vertex_dof(2).unwrap();
    for order in orders {
        let permuted: Vec<_> = order.iter().map(|&i| conditions[i].clone()).collect();
        match resolve_constraints(&mesh, &dof_map, &permuted) {
            Err(Error::ConflictingConstraint { dof, first, second }) => {
                assert_eq!(dof, right_bottom_dof);
                assert_eq!(first.tag, Some(BOTTOM));
                assert_eq!(second.tag, Some(RIGHT));
            }
            other => panic!("expected a conflict for order {:?}, got {:?}", order, other),
        }
    }
}

#[test]
fn unknown_group_is_an_error() {
    let mesh = create_unit_interval_mesh(2);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    for condition in [
        DirichletCondition::on_nodes(42, 0.0),
        DirichletCondition::on_facets(42, 0.0),
        DirichletCondition::on_elements(42, 0.0),
    ] {
        assert_eq!(
            resolve_constraints(&mesh, &dof_map, &[condition]).unwrap_err(),
            Error::UnknownPhysicalGroup { tag: 42 }
        );
    }
}

#[test]
fn interval_end_groups_can_be_constrained_by_nodes() {
    let mesh = create_unit_interval_mesh(4);
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    let conditions = [DirichletCondition::on_nodes(LEFT, 0.0), DirichletCondition::on_nodes(RIGHT, 1.0)];
    let constraints = resolve_constraints(&mesh, &dof_map, &conditions).unwrap();
    assert_eq!(constraints.iter().collect::<Vec<_>>(), vec![(0, 0.0), (4, 1.0)]);
}

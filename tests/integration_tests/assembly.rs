use meshfem::assembly::global::{AssemblyConfig, GlobalAssembler};
use meshfem::assembly::local::ConstantCoefficients;
use meshfem::dof::DofMap;
use meshfem::mesh::procedural::{create_unit_cube_uniform_tet_mesh_3d, create_unit_square_uniform_tri_mesh_2d};
use meshfem::mesh::Mesh;
use meshfem::nalgebra::DMatrix;
use util::assert_approx_matrix_eq;

/// The same mesh with its elements in reversed order.
fn reverse_elements(mesh: &Mesh) -> Mesh {
    let cells: Vec<Vec<usize>> = mesh.elements().rev().map(|element| element.to_vec()).collect();
    let vertices: Vec<Vec<f64>> = mesh
        .vertices()
        .column_iter()
        .map(|x| x.iter().copied().collect())
        .collect();
    Mesh::try_from_vertices_and_cells(mesh.shape(), &vertices, &cells).unwrap()
}

#[test]
fn element_order_does_not_change_linear_system() {
    let coefficients = ConstantCoefficients::new(2.0, 1.0).with_reaction(0.5);
    for mesh in [create_unit_square_uniform_tri_mesh_2d(5), create_unit_cube_uniform_tet_mesh_3d(2)] {
        let reversed = reverse_elements(&mesh);
        // Vertex DOFs only depend on vertex indices, so both systems share the numbering
        let dof_map = DofMap::new(&mesh, 1).unwrap();
        let reversed_dof_map = DofMap::new(&reversed, 1).unwrap();

        let system = GlobalAssembler::from_mesh_and_dofs(&mesh, &dof_map)
            .unwrap()
            .assemble(&coefficients)
            .unwrap();
        let reversed_system = GlobalAssembler::from_mesh_and_dofs(&reversed, &reversed_dof_map)
            .unwrap()
            .with_config(AssemblyConfig::parallel().with_chunk_size(3))
            .assemble(&coefficients)
            .unwrap();

        assert_eq!(system.pattern(), reversed_system.pattern());
        assert_approx_matrix_eq!(
            &DMatrix::from(&system.to_csr()),
            &DMatrix::from(&reversed_system.to_csr()),
            abstol = 1e-12
        );
        assert_approx_matrix_eq!(system.rhs(), reversed_system.rhs(), abstol = 1e-14);
    }
}

#[test]
fn quadratic_tetrahedral_system_is_symmetric() {
    let mesh = create_unit_cube_uniform_tet_mesh_3d(2);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let system = GlobalAssembler::from_mesh_and_dofs(&mesh, &dof_map)
        .unwrap()
        .with_config(AssemblyConfig::parallel())
        .assemble(&ConstantCoefficients::new(1.0, 1.0))
        .unwrap();

    let matrix = DMatrix::from(&system.to_csr());
    assert_eq!(matrix.nrows(), dof_map.num_dofs());
    assert_approx_matrix_eq!(&matrix, &matrix.transpose(), abstol = 1e-12);

    // The load of a unit source integrates to the domain volume
    assert!((system.rhs().sum() - 1.0).abs() <= 1e-12);
}

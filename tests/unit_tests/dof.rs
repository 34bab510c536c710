use meshfem::dof::{DofMap, DofNode};
use meshfem::element::ElementShape;
use meshfem::mesh::procedural::{create_unit_cube_uniform_tet_mesh_3d, create_unit_interval_mesh};
use meshfem::mesh::Mesh;
use meshfem::Error;

fn two_triangles() -> Mesh {
    let vertices = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let cells = [[0, 1, 2], [0, 2, 3]];
    Mesh::try_from_vertices_and_cells(ElementShape::Triangle, &vertices, &cells).unwrap()
}

#[test]
fn linear_dofs_follow_vertices() {
    let mesh = two_triangles();
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    assert_eq!(dof_map.num_dofs(), 4);
    assert_eq!(dof_map.dofs_per_element(), 3);
    assert_eq!(dof_map.element_dofs(0), &[0, 1, 2]);
    assert_eq!(dof_map.element_dofs(1), &[0, 2, 3]);
    assert_eq!(dof_map.edge_dof(0, 1), None);
    assert_eq!(dof_map.facet_dofs(&[3, 0]), vec![3, 0]);
}

#[test]
fn unreferenced_vertices_get_no_dof() {
    let vertices = [[0.0], [7.0], [1.0], [2.0]];
    let cells = [[0, 2], [2, 3]];
    let mesh = Mesh::try_from_vertices_and_cells(ElementShape::Segment, &vertices, &cells).unwrap();
    let dof_map = DofMap::new(&mesh, 1).unwrap();
    assert_eq!(dof_map.num_dofs(), 3);
    assert_eq!(dof_map.vertex_dof(1), None);
    assert_eq!(dof_map.vertex_dof(3), Some(2));
    assert_eq!(dof_map.element_dofs(1), &[1, 2]);
}

#[test]
fn quadratic_triangle_edges_are_numbered_in_order_of_appearance() {
    let mesh = two_triangles();
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    assert_eq!(dof_map.num_dofs(), 9);
    assert_eq!(dof_map.element_dofs(0), &[0, 1, 2, 4, 5, 6]);
    assert_eq!(dof_map.element_dofs(1), &[0, 2, 3, 6, 7, 8]);
    assert_eq!(dof_map.edge_dof(2, 0), Some(6));
    assert_eq!(dof_map.edge_dof(0, 2), Some(6));
    assert_eq!(dof_map.dof_node(7), DofNode::Edge(2, 3));
    assert_eq!(dof_map.facet_dofs(&[0, 1]), vec![0, 1, 4]);
    assert_eq!(dof_map.dof_position(&mesh, 5), vec![1.0, 0.5]);
}

#[test]
fn quadratic_tetrahedra_share_edges() {
    let mesh = create_unit_cube_uniform_tet_mesh_3d(1);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    // 8 vertices, 12 cube edges, 6 face diagonals and one body diagonal
    assert_eq!(dof_map.num_dofs(), 8 + 19);
    assert_eq!(dof_map.dofs_per_element(), 10);

    let coordinates = dof_map.dof_coordinates(&mesh);
    assert_eq!(coordinates.shape(), (3, 27));
    // The body diagonal from (0, 0, 0) to (1, 1, 1) is shared by all six tetrahedra
    let center_dofs: Vec<usize> = (0..27)
        .filter(|&dof| coordinates.column(dof).iter().all(|&x| x == 0.5))
        .collect();
    assert_eq!(center_dofs.len(), 1);
    for e in 0..mesh.num_elements() {
        assert!(dof_map.element_dofs(e).contains(&center_dofs[0]));
    }
}

#[test]
fn interpolation_evaluates_at_nodes() {
    let mesh = create_unit_interval_mesh(2);
    let dof_map = DofMap::new(&mesh, 2).unwrap();
    let values = dof_map.interpolate(&mesh, |x| x[0] * x[0]);
    assert_eq!(values, vec![0.0, 0.25, 1.0, 0.0625, 0.5625]);
}

#[test]
fn unsupported_order_is_an_error() {
    let mesh = two_triangles();
    assert_eq!(
        DofMap::new(&mesh, 3).unwrap_err(),
        Error::UnsupportedOrderOrShape {
            shape: ElementShape::Triangle,
            order: 3
        }
    );
}

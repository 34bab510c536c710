//! Structured meshes of intervals, rectangles and boxes.
//!
//! The generated meshes carry node and facet groups for each side of the domain, tagged with
//! [`LEFT`]/[`RIGHT`] (x), [`BOTTOM`]/[`TOP`] (y) and [`FRONT`]/[`BACK`] (z). All elements
//! keep the default element tag.
use crate::element::ElementShape;
use crate::mesh::{Mesh, PhysicalGroups, PhysicalTag};
use nalgebra::DMatrix;

/// Side `x = x_min`.
pub const LEFT: PhysicalTag = 1;
/// Side `x = x_max`.
pub const RIGHT: PhysicalTag = 2;
/// Side `y = y_min`.
pub const BOTTOM: PhysicalTag = 3;
/// Side `y = y_max`.
pub const TOP: PhysicalTag = 4;
/// Side `z = z_min`.
pub const FRONT: PhysicalTag = 5;
/// Side `z = z_max`.
pub const BACK: PhysicalTag = 6;

pub fn create_unit_interval_mesh(num_cells: usize) -> Mesh {
    create_interval_mesh(0.0, 1.0, num_cells)
}

/// Uniform mesh of `[a, b]` with `num_cells` segments, oriented from left to right.
pub fn create_interval_mesh(a: f64, b: f64, num_cells: usize) -> Mesh {
    assert!(a < b, "interval must be non-empty");
    assert!(num_cells > 0, "interval mesh needs at least one cell");
    let h = (b - a) / num_cells as f64;
    let vertices = DMatrix::from_fn(1, num_cells + 1, |_, i| {
        if i == num_cells {
            b
        } else {
            a + i as f64 * h
        }
    });
    let connectivity = (0..num_cells).flat_map(|i| [i, i + 1]).collect();
    let mesh = Mesh::try_new(ElementShape::Segment, vertices, connectivity).expect("generated mesh is valid");
    with_box_side_groups(mesh, &[a], &[b])
}

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> Mesh {
    create_rectangular_uniform_tri_mesh_2d([0.0, 0.0], [1.0, 1.0], [cells_per_dim, cells_per_dim])
}

/// Uniform triangle mesh of the rectangle `[lower, upper]`, each grid cell split into two
/// counter-clockwise triangles along its diagonal.
pub fn create_rectangular_uniform_tri_mesh_2d(lower: [f64; 2], upper: [f64; 2], cells: [usize; 2]) -> Mesh {
    let [nx, ny] = cells;
    let vertices = grid_vertices(&lower, &upper, &cells);
    let to_global_vertex_index = |i: usize, j: usize| (nx + 1) * j + i;

    let mut connectivity = Vec::with_capacity(6 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let a = to_global_vertex_index(i, j);
            let b = to_global_vertex_index(i + 1, j);
            let c = to_global_vertex_index(i + 1, j + 1);
            let d = to_global_vertex_index(i, j + 1);
            connectivity.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }

    let mesh = Mesh::try_new(ElementShape::Triangle, vertices, connectivity).expect("generated mesh is valid");
    with_box_side_groups(mesh, &lower, &upper)
}

pub fn create_unit_cube_uniform_tet_mesh_3d(cells_per_dim: usize) -> Mesh {
    create_box_uniform_tet_mesh_3d([0.0; 3], [1.0; 3], [cells_per_dim; 3])
}

/// Uniform tetrahedral mesh of the box `[lower, upper]`.
///
/// Every grid cell is split into six positively oriented tetrahedra sharing the diagonal from
/// its lowest to its highest corner (Kuhn subdivision), which makes the mesh conforming.
pub fn create_box_uniform_tet_mesh_3d(lower: [f64; 3], upper: [f64; 3], cells: [usize; 3]) -> Mesh {
    let [nx, ny, nz] = cells;
    let vertices = grid_vertices(&lower, &upper, &cells);
    let to_global_vertex_index = |i: usize, j: usize, k: usize| ((ny + 1) * k + j) * (nx + 1) + i;

    // Axis permutations with their parity; odd permutations need two vertices swapped
    const PERMUTATIONS: [([usize; 3], bool); 6] = [
        ([0, 1, 2], false),
        ([0, 2, 1], true),
        ([1, 0, 2], true),
        ([1, 2, 0], false),
        ([2, 0, 1], false),
        ([2, 1, 0], true),
    ];

    let mut connectivity = Vec::with_capacity(24 * nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for (permutation, odd) in PERMUTATIONS {
                    let mut offset = [0usize; 3];
                    let mut path = [0usize; 4];
                    path[0] = to_global_vertex_index(i, j, k);
                    for (step, &axis) in permutation.iter().enumerate() {
                        offset[axis] = 1;
                        path[step + 1] = to_global_vertex_index(i + offset[0], j + offset[1], k + offset[2]);
                    }
                    if odd {
                        path.swap(2, 3);
                    }
                    connectivity.extend_from_slice(&path);
                }
            }
        }
    }

    let mesh = Mesh::try_new(ElementShape::Tetrahedron, vertices, connectivity).expect("generated mesh is valid");
    with_box_side_groups(mesh, &lower, &upper)
}

/// Vertices of a uniform grid, ordered with the x index running fastest.
fn grid_vertices(lower: &[f64], upper: &[f64], cells: &[usize]) -> DMatrix<f64> {
    let d = lower.len();
    let counts: Vec<usize> = cells.iter().map(|n| n + 1).collect();
    let num_vertices = counts.iter().product();
    DMatrix::from_fn(d, num_vertices, |axis, vertex| {
        let stride: usize = counts[..axis].iter().product();
        let index = (vertex / stride) % counts[axis];
        if index == cells[axis] {
            upper[axis]
        } else {
            lower[axis] + (upper[axis] - lower[axis]) * index as f64 / cells[axis] as f64
        }
    })
}

/// Adds a node group and a facet group for every side of the axis-aligned box `[lower, upper]`.
fn with_box_side_groups(mesh: Mesh, lower: &[f64], upper: &[f64]) -> Mesh {
    let side_tags = [(LEFT, RIGHT), (BOTTOM, TOP), (FRONT, BACK)];
    let on_side = |v: usize, axis: usize, value: f64| {
        let tol = 1e-12 * (upper[axis] - lower[axis]);
        (mesh.vertex(v)[axis] - value).abs() <= tol
    };

    let boundary_facets = mesh.find_boundary_facets();
    let mut groups = PhysicalGroups::new();
    for axis in 0..lower.len() {
        let (lower_tag, upper_tag) = side_tags[axis];
        for (tag, value) in [(lower_tag, lower[axis]), (upper_tag, upper[axis])] {
            groups.add_nodes(tag, (0..mesh.num_vertices()).filter(|&v| on_side(v, axis, value)));
            for (facet, _) in &boundary_facets {
                if facet.iter().all(|&v| on_side(v, axis, value)) {
                    groups.add_facet(tag, facet.clone());
                }
            }
        }
    }

    mesh.with_physical_groups(groups)
        .expect("side groups refer to existing vertices")
}

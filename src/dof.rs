//! Numbering of the degrees of freedom of continuous Lagrange spaces.
use crate::element::ElementType;
use crate::error::Result;
use crate::mesh::Mesh;
use log::{debug, warn};
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;

/// The mesh entity a DOF is attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DofNode {
    Vertex(usize),
    /// Midpoint of the edge between two vertices, stored with the smaller index first.
    Edge(usize, usize),
}

/// Mapping from elements to the global DOFs of a continuous Lagrange space of order 1 or 2.
///
/// Vertex DOFs come first, numbered by increasing vertex index over the vertices referenced by
/// at least one element. For order 2, one DOF per unique edge follows, numbered in order of first
/// appearance when traversing the elements and their local edges. The local DOFs of an element
/// are its corner vertices in connectivity order followed by its local edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMap {
    element_type: ElementType,
    num_dofs: usize,
    element_dofs: Vec<usize>,
    vertex_dofs: Vec<Option<usize>>,
    edge_dofs: FxHashMap<(usize, usize), usize>,
    dof_nodes: Vec<DofNode>,
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

impl DofMap {
    pub fn new(mesh: &Mesh, order: usize) -> Result<Self> {
        let element_type = ElementType::new(mesh.shape(), order)?;

        let mut vertex_dofs = vec![None; mesh.num_vertices()];
        for element in mesh.elements() {
            for &v in element {
                vertex_dofs[v] = Some(0);
            }
        }
        let mut dof_nodes = Vec::with_capacity(mesh.num_vertices());
        for (v, dof) in vertex_dofs.iter_mut().enumerate() {
            if dof.is_some() {
                *dof = Some(dof_nodes.len());
                dof_nodes.push(DofNode::Vertex(v));
            }
        }
        if dof_nodes.len() < mesh.num_vertices() {
            warn!(
                "{} of {} mesh vertices are not referenced by any element and receive no DOF",
                mesh.num_vertices() - dof_nodes.len(),
                mesh.num_vertices()
            );
        }

        let local_edges = mesh.shape().local_edges();
        let mut edge_dofs = FxHashMap::default();
        let mut element_dofs = Vec::with_capacity(element_type.num_nodes() * mesh.num_elements());
        for element in mesh.elements() {
            element_dofs.extend(
                element
                    .iter()
                    .map(|&v| vertex_dofs[v].expect("referenced vertices have DOFs")),
            );
            if order == 2 {
                for &[a, b] in local_edges {
                    let key = edge_key(element[a], element[b]);
                    let next_dof = dof_nodes.len();
                    let dof = *edge_dofs.entry(key).or_insert_with(|| {
                        dof_nodes.push(DofNode::Edge(key.0, key.1));
                        next_dof
                    });
                    element_dofs.push(dof);
                }
            }
        }

        debug!(
            "Numbered {} DOFs for {} elements of order {}",
            dof_nodes.len(),
            mesh.num_elements(),
            order
        );

        Ok(Self {
            element_type,
            num_dofs: dof_nodes.len(),
            element_dofs,
            vertex_dofs,
            edge_dofs,
            dof_nodes,
        })
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn order(&self) -> usize {
        self.element_type.order()
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn dofs_per_element(&self) -> usize {
        self.element_type.num_nodes()
    }

    pub fn num_elements(&self) -> usize {
        self.element_dofs.len() / self.dofs_per_element()
    }

    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        let n = self.dofs_per_element();
        &self.element_dofs[n * element_index..n * (element_index + 1)]
    }

    /// DOF of a vertex, or `None` if no element references the vertex.
    pub fn vertex_dof(&self, vertex_index: usize) -> Option<usize> {
        self.vertex_dofs.get(vertex_index).copied().flatten()
    }

    /// DOF of the edge between two vertices (in either order), for order 2 spaces.
    pub fn edge_dof(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_dofs.get(&edge_key(a, b)).copied()
    }

    pub fn dof_node(&self, dof: usize) -> DofNode {
        self.dof_nodes[dof]
    }

    /// All DOFs on a facet given by its corner vertices: the vertex DOFs followed by the DOFs
    /// of the edges between them.
    pub fn facet_dofs(&self, facet: &[usize]) -> Vec<usize> {
        let mut dofs: Vec<usize> = facet.iter().filter_map(|&v| self.vertex_dof(v)).collect();
        if self.order() == 2 {
            for (i, &a) in facet.iter().enumerate() {
                for &b in &facet[i + 1..] {
                    dofs.extend(self.edge_dof(a, b));
                }
            }
        }
        dofs
    }

    /// Position of the Lagrange node of a DOF.
    pub fn dof_position(&self, mesh: &Mesh, dof: usize) -> Vec<f64> {
        match self.dof_nodes[dof] {
            DofNode::Vertex(v) => mesh.vertex(v).iter().copied().collect(),
            DofNode::Edge(a, b) => mesh
                .vertex(a)
                .iter()
                .zip(mesh.vertex(b).iter())
                .map(|(x_a, x_b)| 0.5 * (x_a + x_b))
                .collect(),
        }
    }

    /// Positions of all Lagrange nodes as a `d x num_dofs` matrix.
    pub fn dof_coordinates(&self, mesh: &Mesh) -> DMatrix<f64> {
        let mut coordinates = DMatrix::zeros(mesh.geometry_dim(), self.num_dofs);
        for dof in 0..self.num_dofs {
            coordinates
                .column_mut(dof)
                .copy_from_slice(&self.dof_position(mesh, dof));
        }
        coordinates
    }

    /// Evaluates `f` at every Lagrange node, which interpolates `f` into the space.
    pub fn interpolate(&self, mesh: &Mesh, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
        (0..self.num_dofs)
            .map(|dof| f(&self.dof_position(mesh, dof)))
            .collect()
    }
}

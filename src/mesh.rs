//! Simplicial meshes with Gmsh-style physical groups.
use crate::element::ElementShape;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVectorView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::slice::ChunksExact;

pub mod procedural;

/// Identifier of a physical group, as in Gmsh.
pub type PhysicalTag = i32;

/// Tag of elements that do not belong to any physical group.
pub const DEFAULT_ELEMENT_TAG: PhysicalTag = 0;

/// Named subsets of a mesh: element regions, node sets and boundary facets.
///
/// A facet is given by the corner vertices of an entity of dimension `d - 1`
/// (a point, an edge or a triangle).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalGroups {
    element_tags: Vec<PhysicalTag>,
    node_groups: BTreeMap<PhysicalTag, Vec<usize>>,
    facet_groups: BTreeMap<PhysicalTag, Vec<Vec<usize>>>,
}

impl PhysicalGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tag per element. An empty list means every element has [`DEFAULT_ELEMENT_TAG`].
    pub fn with_element_tags(self, element_tags: Vec<PhysicalTag>) -> Self {
        Self { element_tags, ..self }
    }

    pub fn with_node_group(mut self, tag: PhysicalTag, nodes: impl IntoIterator<Item = usize>) -> Self {
        self.add_nodes(tag, nodes);
        self
    }

    pub fn with_facet_group(mut self, tag: PhysicalTag, facets: impl IntoIterator<Item = Vec<usize>>) -> Self {
        for facet in facets {
            self.add_facet(tag, facet);
        }
        self
    }

    pub fn add_nodes(&mut self, tag: PhysicalTag, nodes: impl IntoIterator<Item = usize>) {
        self.node_groups.entry(tag).or_default().extend(nodes);
    }

    pub fn add_facet(&mut self, tag: PhysicalTag, facet: Vec<usize>) {
        self.facet_groups.entry(tag).or_default().push(facet);
    }

    pub fn element_tags(&self) -> &[PhysicalTag] {
        &self.element_tags
    }

    pub fn node_group(&self, tag: PhysicalTag) -> Option<&[usize]> {
        self.node_groups.get(&tag).map(Vec::as_slice)
    }

    pub fn facet_group(&self, tag: PhysicalTag) -> Option<&[Vec<usize>]> {
        self.facet_groups.get(&tag).map(Vec::as_slice)
    }

    pub fn node_group_tags(&self) -> impl '_ + Iterator<Item = PhysicalTag> {
        self.node_groups.keys().copied()
    }

    pub fn facet_group_tags(&self) -> impl '_ + Iterator<Item = PhysicalTag> {
        self.facet_groups.keys().copied()
    }
}

/// An index-based conforming simplicial mesh.
///
/// Vertex coordinates are stored column-wise in a `d x n` matrix, where `d` is the reference
/// dimension of the element shape. Element winding is not checked here; inverted elements are
/// reported when they are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    shape: ElementShape,
    vertices: DMatrix<f64>,
    connectivity: Vec<usize>,
    groups: PhysicalGroups,
}

impl Mesh {
    /// Constructs a mesh from vertex columns and flattened corner connectivity.
    pub fn try_new(shape: ElementShape, vertices: DMatrix<f64>, connectivity: Vec<usize>) -> Result<Self> {
        let d = shape.reference_dim();
        if vertices.nrows() != d {
            return Err(Error::InvalidMesh(format!(
                "{:?} elements need {}-dimensional vertices, got {} coordinates per vertex",
                shape,
                d,
                vertices.nrows()
            )));
        }
        if let Some(index) = vertices.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidMesh(format!(
                "vertex {} has a non-finite coordinate",
                index / d
            )));
        }
        let nv = shape.num_vertices();
        if connectivity.len() % nv != 0 {
            return Err(Error::InvalidMesh(format!(
                "connectivity length {} is not a multiple of {} vertices per element",
                connectivity.len(),
                nv
            )));
        }
        let num_vertices = vertices.ncols();
        if let Some(position) = connectivity.iter().position(|&v| v >= num_vertices) {
            return Err(Error::InvalidMesh(format!(
                "element {} refers to vertex {}, but the mesh only has {} vertices",
                position / nv,
                connectivity[position],
                num_vertices
            )));
        }

        Ok(Self {
            shape,
            vertices,
            connectivity,
            groups: PhysicalGroups::default(),
        })
    }

    pub fn try_from_vertices_and_cells<P, C>(shape: ElementShape, vertices: &[P], cells: &[C]) -> Result<Self>
    where
        P: AsRef<[f64]>,
        C: AsRef<[usize]>,
    {
        let d = shape.reference_dim();
        let mut coordinates = Vec::with_capacity(d * vertices.len());
        for (i, vertex) in vertices.iter().enumerate() {
            let vertex = vertex.as_ref();
            if vertex.len() != d {
                return Err(Error::InvalidMesh(format!(
                    "vertex {} has {} coordinates, expected {}",
                    i,
                    vertex.len(),
                    d
                )));
            }
            coordinates.extend_from_slice(vertex);
        }

        let mut connectivity = Vec::with_capacity(shape.num_vertices() * cells.len());
        for (e, cell) in cells.iter().enumerate() {
            let cell = cell.as_ref();
            if cell.len() != shape.num_vertices() {
                return Err(Error::InvalidMesh(format!(
                    "element {} has {} vertices, but {:?} elements have {}",
                    e,
                    cell.len(),
                    shape,
                    shape.num_vertices()
                )));
            }
            connectivity.extend_from_slice(cell);
        }

        Self::try_new(
            shape,
            DMatrix::from_vec(d, vertices.len(), coordinates),
            connectivity,
        )
    }

    /// Attaches physical groups after checking that they refer to existing entities.
    pub fn with_physical_groups(mut self, groups: PhysicalGroups) -> Result<Self> {
        let num_elements = self.num_elements();
        if !groups.element_tags.is_empty() && groups.element_tags.len() != num_elements {
            return Err(Error::InvalidMesh(format!(
                "{} element tags given for {} elements",
                groups.element_tags.len(),
                num_elements
            )));
        }
        for (tag, nodes) in &groups.node_groups {
            if let Some(&v) = nodes.iter().find(|&&v| v >= self.num_vertices()) {
                return Err(Error::InvalidMesh(format!(
                    "node group {} refers to non-existent vertex {}",
                    tag, v
                )));
            }
        }
        for (tag, facets) in &groups.facet_groups {
            for facet in facets {
                if facet.len() != self.shape.num_facet_vertices() {
                    return Err(Error::InvalidMesh(format!(
                        "facet group {} contains a facet with {} vertices, expected {}",
                        tag,
                        facet.len(),
                        self.shape.num_facet_vertices()
                    )));
                }
                if let Some(&v) = facet.iter().find(|&&v| v >= self.num_vertices()) {
                    return Err(Error::InvalidMesh(format!(
                        "facet group {} refers to non-existent vertex {}",
                        tag, v
                    )));
                }
            }
        }
        self.groups = groups;
        Ok(self)
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn geometry_dim(&self) -> usize {
        self.vertices.nrows()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.ncols()
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len() / self.shape.num_vertices()
    }

    pub fn vertices(&self) -> &DMatrix<f64> {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> DVectorView<'_, f64> {
        self.vertices.column(index)
    }

    pub fn element_vertices(&self, element_index: usize) -> &[usize] {
        let nv = self.shape.num_vertices();
        &self.connectivity[nv * element_index..nv * (element_index + 1)]
    }

    pub fn elements(&self) -> ChunksExact<'_, usize> {
        self.connectivity.chunks_exact(self.shape.num_vertices())
    }

    pub fn physical_groups(&self) -> &PhysicalGroups {
        &self.groups
    }

    pub fn element_tag(&self, element_index: usize) -> PhysicalTag {
        self.groups
            .element_tags
            .get(element_index)
            .copied()
            .unwrap_or(DEFAULT_ELEMENT_TAG)
    }

    /// Finds facets that belong to exactly one element, along with that element's index.
    ///
    /// The facet vertices are sorted. The result is sorted by facet.
    pub fn find_boundary_facets(&self) -> Vec<(Vec<usize>, usize)> {
        // BTreeMap keeps the result deterministic
        let mut facet_counts: BTreeMap<Vec<usize>, (usize, usize)> = BTreeMap::new();
        for (element_index, element) in self.elements().enumerate() {
            for omitted in 0..element.len() {
                let mut facet: Vec<usize> = element
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != omitted)
                    .map(|(_, &v)| v)
                    .collect();
                facet.sort_unstable();
                facet_counts
                    .entry(facet)
                    .and_modify(|(_, count)| *count += 1)
                    .or_insert((element_index, 1));
            }
        }

        facet_counts
            .into_iter()
            .filter(|(_, (_, count))| *count == 1)
            .map(|(facet, (element_index, _))| (facet, element_index))
            .collect()
    }

    /// Returns a sorted list of vertices that belong to a boundary facet.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .find_boundary_facets()
            .into_iter()
            .flat_map(|(facet, _)| facet)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Sorted list of vertices that are not referenced by any element.
    pub fn find_unreferenced_vertices(&self) -> Vec<usize> {
        let mut referenced = vec![false; self.num_vertices()];
        for &v in &self.connectivity {
            referenced[v] = true;
        }
        referenced
            .iter()
            .enumerate()
            .filter(|(_, &is_referenced)| !is_referenced)
            .map(|(v, _)| v)
            .collect()
    }
}

//! Loading of simplicial meshes with physical groups from Gmsh MSH 4.1 data.
use crate::element::ElementShape;
use crate::mesh::{Mesh, PhysicalGroups, PhysicalTag, DEFAULT_ELEMENT_TAG};
use eyre::{eyre, Context};
use log::{debug, warn};
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Loads a [`Mesh`] of the given shape from a Gmsh MSH file at the given path.
pub fn load_msh_from_file<P: AsRef<Path>>(file_path: P, shape: ElementShape) -> eyre::Result<Mesh> {
    let msh_bytes = std::fs::read(file_path).wrap_err("failed to read file")?;
    load_msh_from_bytes(&msh_bytes, shape).wrap_err("failed to load mesh from msh file")
}

/// Loads a [`Mesh`] by parsing the given bytes as a Gmsh MSH file.
///
/// Element blocks of the linear element type of `shape` become the mesh elements, tagged with
/// the first physical tag of their entity (or [`DEFAULT_ELEMENT_TAG`]). Blocks of the facet
/// type on entities of dimension `d - 1` become facet groups, and point blocks become node
/// groups, one group per physical tag of the entity. Other blocks are skipped.
pub fn load_msh_from_bytes(bytes: &[u8], shape: ElementShape) -> eyre::Result<Mesh> {
    let mut msh_file = mshio::parse_msh_bytes(bytes).map_err(|e| eyre!("failed to parse msh file: {}", e))?;

    let msh_nodes = msh_file
        .data
        .nodes
        .take()
        .ok_or(eyre!("MSH file does not contain nodes"))?;
    let msh_elements = msh_file
        .data
        .elements
        .take()
        .ok_or(eyre!("MSH file does not contain elements"))?;

    // Physical tags of each (entity dimension, entity tag)
    let mut entity_physical_tags: FxHashMap<(i32, i32), Vec<PhysicalTag>> = FxHashMap::default();
    if let Some(entities) = msh_file.data.entities.take() {
        for point in &entities.points {
            entity_physical_tags.insert((0, point.tag), point.physical_tags.clone());
        }
        for curve in &entities.curves {
            entity_physical_tags.insert((1, curve.tag), curve.physical_tags.clone());
        }
        for surface in &entities.surfaces {
            entity_physical_tags.insert((2, surface.tag), surface.physical_tags.clone());
        }
        for volume in &entities.volumes {
            entity_physical_tags.insert((3, volume.tag), volume.physical_tags.clone());
        }
    } else {
        debug!("MSH file has no entities section, all elements get the default tag");
    }

    let d = shape.reference_dim();
    let mut coordinates = Vec::new();
    for node_block in &msh_nodes.node_blocks {
        // Ensure that node tags are consecutive
        if node_block.node_tags.is_some() {
            return Err(eyre!("node block tags are not consecutive in msh file"));
        }
        for node in &node_block.nodes {
            coordinates.extend_from_slice(&[node.x, node.y, node.z][..d]);
        }
    }
    let num_vertices = coordinates.len() / d;

    let element_type = linear_msh_element_type(shape);
    let facet_type = linear_msh_element_type_of_dim(d - 1);
    let element_dim = i32::try_from(d)?;

    let mut connectivity = Vec::new();
    let mut element_tags = Vec::new();
    let mut groups = PhysicalGroups::new();
    for element_block in &msh_elements.element_blocks {
        let block_dim = element_block.entity_dim;
        let block_tags = physical_tags_of(&entity_physical_tags, block_dim, element_block.entity_tag);

        if block_dim == element_dim && element_block.element_type == element_type {
            let tag = block_tags.first().copied().unwrap_or(DEFAULT_ELEMENT_TAG);
            for element in &element_block.elements {
                connectivity.extend(vertex_indices(&element.nodes, shape.num_vertices())?);
                element_tags.push(tag);
            }
            continue;
        }

        let is_facet_block = block_dim == element_dim - 1 && element_block.element_type == facet_type;
        let is_point_block = block_dim == 0 && element_block.element_type == mshio::ElementType::Pnt;
        if !is_facet_block && !is_point_block {
            warn!(
                "Skipping MSH element block of type {:?} on entity of dimension {}",
                element_block.element_type, block_dim
            );
            continue;
        }
        if block_tags.is_empty() {
            debug!(
                "Skipping MSH element block on entity ({}, {}) without physical tags",
                block_dim, element_block.entity_tag
            );
            continue;
        }

        for element in &element_block.elements {
            if is_facet_block {
                let facet = vertex_indices(&element.nodes, shape.num_facet_vertices())?;
                for &tag in block_tags {
                    groups.add_facet(tag, facet.clone());
                }
            }
            if is_point_block {
                let node = vertex_indices(&element.nodes, 1)?;
                for &tag in block_tags {
                    groups.add_nodes(tag, node.iter().copied());
                }
            }
        }
    }

    if connectivity.is_empty() {
        return Err(eyre!(
            "MSH file does not contain an element block of the requested type ({:?} of dim {})",
            element_type,
            d
        ));
    }

    let vertices = DMatrix::from_vec(d, num_vertices, coordinates);
    let mesh = Mesh::try_new(shape, vertices, connectivity)?;
    let mesh = mesh.with_physical_groups(groups.with_element_tags(element_tags))?;
    debug!(
        "Loaded MSH mesh with {} vertices and {} elements",
        mesh.num_vertices(),
        mesh.num_elements()
    );
    Ok(mesh)
}

fn physical_tags_of(
    entity_physical_tags: &FxHashMap<(i32, i32), Vec<PhysicalTag>>,
    dim: i32,
    tag: i32,
) -> &[PhysicalTag] {
    entity_physical_tags
        .get(&(dim, tag))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn linear_msh_element_type(shape: ElementShape) -> mshio::ElementType {
    linear_msh_element_type_of_dim(shape.reference_dim())
}

fn linear_msh_element_type_of_dim(dim: usize) -> mshio::ElementType {
    match dim {
        0 => mshio::ElementType::Pnt,
        1 => mshio::ElementType::Lin2,
        2 => mshio::ElementType::Tri3,
        _ => mshio::ElementType::Tet4,
    }
}

/// Converts the first `count` 1-based MSH node tags to vertex indices.
fn vertex_indices(node_tags: &[u64], count: usize) -> eyre::Result<Vec<usize>> {
    if node_tags.len() < count {
        return Err(eyre!("not enough nodes to initialize connectivity"));
    }
    node_tags[..count]
        .iter()
        .map(|&tag| {
            usize::try_from(tag)
                .ok()
                .and_then(|tag| tag.checked_sub(1))
                .ok_or_else(|| eyre!("invalid node tag {} in msh file", tag))
        })
        .collect()
}

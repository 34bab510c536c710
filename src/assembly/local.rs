//! Element evaluation of the local stiffness/reaction matrix and load vector.
use crate::dof::DofMap;
use crate::element::ReferenceTable;
use crate::error::{Error, Result};
use crate::mesh::{Mesh, PhysicalTag};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Element-to-node connectivity as seen by the assemblers.
pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    /// Total number of nodes, i.e. the dimension of the assembled system.
    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

impl ElementConnectivityAssembler for DofMap {
    fn num_elements(&self) -> usize {
        DofMap::num_elements(self)
    }

    fn num_nodes(&self) -> usize {
        self.num_dofs()
    }

    fn element_node_count(&self, _element_index: usize) -> usize {
        self.dofs_per_element()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.element_dofs(element_index));
    }
}

/// Piecewise-constant coefficients of `-div(ν ∇u) + r u = f`, looked up by element tag.
pub trait Coefficients: Sync {
    /// Diffusion coefficient `ν`.
    fn diffusion(&self, tag: PhysicalTag) -> f64;

    /// Reaction coefficient `r`.
    fn reaction(&self, _tag: PhysicalTag) -> f64 {
        0.0
    }

    /// Source term `f`.
    fn source(&self, tag: PhysicalTag) -> f64;
}

/// Coefficients that are the same on every element.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConstantCoefficients {
    pub diffusion: f64,
    pub reaction: f64,
    pub source: f64,
}

impl ConstantCoefficients {
    pub fn new(diffusion: f64, source: f64) -> Self {
        Self {
            diffusion,
            reaction: 0.0,
            source,
        }
    }

    pub fn with_reaction(self, reaction: f64) -> Self {
        Self { reaction, ..self }
    }
}

impl Coefficients for ConstantCoefficients {
    fn diffusion(&self, _tag: PhysicalTag) -> f64 {
        self.diffusion
    }

    fn reaction(&self, _tag: PhysicalTag) -> f64 {
        self.reaction
    }

    fn source(&self, _tag: PhysicalTag) -> f64 {
        self.source
    }
}

fn no_reaction(_tag: PhysicalTag) -> f64 {
    0.0
}

/// Coefficients backed by closures over the element tag.
#[derive(Debug, Clone, Copy)]
pub struct FnCoefficients<M, S, R> {
    material: M,
    source: S,
    reaction: R,
}

/// Adapts a material callback (diffusion coefficient per tag) and a source callback into
/// [`Coefficients`] without reaction term.
pub fn coefficients_from_fn<M, S>(material: M, source: S) -> FnCoefficients<M, S, fn(PhysicalTag) -> f64>
where
    M: Fn(PhysicalTag) -> f64 + Sync,
    S: Fn(PhysicalTag) -> f64 + Sync,
{
    FnCoefficients {
        material,
        source,
        reaction: no_reaction,
    }
}

impl<M, S, R> FnCoefficients<M, S, R> {
    pub fn with_reaction<R2>(self, reaction: R2) -> FnCoefficients<M, S, R2>
    where
        R2: Fn(PhysicalTag) -> f64 + Sync,
    {
        FnCoefficients {
            material: self.material,
            source: self.source,
            reaction,
        }
    }
}

impl<M, S, R> Coefficients for FnCoefficients<M, S, R>
where
    M: Fn(PhysicalTag) -> f64 + Sync,
    S: Fn(PhysicalTag) -> f64 + Sync,
    R: Fn(PhysicalTag) -> f64 + Sync,
{
    fn diffusion(&self, tag: PhysicalTag) -> f64 {
        (self.material)(tag)
    }

    fn reaction(&self, tag: PhysicalTag) -> f64 {
        (self.reaction)(tag)
    }

    fn source(&self, tag: PhysicalTag) -> f64 {
        (self.source)(tag)
    }
}

/// Only the reaction term, with `r` given by a density per tag. Assembles mass matrices.
pub(crate) struct MassCoefficients<F>(pub F);

impl<F: Fn(PhysicalTag) -> f64 + Sync> Coefficients for MassCoefficients<F> {
    fn diffusion(&self, _tag: PhysicalTag) -> f64 {
        0.0
    }

    fn reaction(&self, tag: PhysicalTag) -> f64 {
        (self.0)(tag)
    }

    fn source(&self, _tag: PhysicalTag) -> f64 {
        0.0
    }
}

/// Affine geometry map of a simplex element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry {
    vertex_coords: DMatrix<f64>,
    jacobian: DMatrix<f64>,
    inverse_transpose: DMatrix<f64>,
    determinant: f64,
}

impl Default for ElementGeometry {
    fn default() -> Self {
        Self {
            vertex_coords: DMatrix::zeros(0, 0),
            jacobian: DMatrix::zeros(0, 0),
            inverse_transpose: DMatrix::zeros(0, 0),
            determinant: 0.0,
        }
    }
}

impl ElementGeometry {
    /// Corner coordinates, one column per vertex.
    pub fn vertex_coords(&self) -> &DMatrix<f64> {
        &self.vertex_coords
    }

    /// `J = ∂x/∂ξ`, constant over the element.
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    /// `J^{-T}`, which maps reference gradients to physical gradients.
    pub fn inverse_transpose(&self) -> &DMatrix<f64> {
        &self.inverse_transpose
    }

    pub fn determinant(&self) -> f64 {
        self.determinant
    }
}

/// Caller-owned buffers for one element: the local matrix and vector plus scratch space.
///
/// Reused across elements so that evaluation does not allocate once the buffers have grown.
#[derive(Debug, Clone)]
pub struct LocalSystem {
    matrix: DMatrix<f64>,
    vector: DVector<f64>,
    geometry: ElementGeometry,
    physical_gradients: DMatrix<f64>,
}

impl Default for LocalSystem {
    fn default() -> Self {
        Self {
            matrix: DMatrix::zeros(0, 0),
            vector: DVector::zeros(0),
            geometry: ElementGeometry::default(),
            physical_gradients: DMatrix::zeros(0, 0),
        }
    }
}

impl LocalSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn vector(&self) -> &DVector<f64> {
        &self.vector
    }

    pub fn geometry(&self) -> &ElementGeometry {
        &self.geometry
    }

    fn reset(&mut self, num_nodes: usize, dim: usize) {
        self.matrix.resize_mut(num_nodes, num_nodes, 0.0);
        self.matrix.fill(0.0);
        self.vector.resize_vertically_mut(num_nodes, 0.0);
        self.vector.fill(0.0);
        self.physical_gradients.resize_mut(dim, num_nodes, 0.0);
    }
}

/// Computes element matrices and vectors for the elements of a mesh.
#[derive(Debug, Clone)]
pub struct ElementEvaluator<'a> {
    mesh: &'a Mesh,
    dof_map: &'a DofMap,
    table: Arc<ReferenceTable>,
}

impl<'a> ElementEvaluator<'a> {
    /// # Panics
    ///
    /// Panics if the table, the DOF map and the mesh disagree on the element type or the number
    /// of elements.
    pub fn new(mesh: &'a Mesh, dof_map: &'a DofMap, table: Arc<ReferenceTable>) -> Self {
        assert_eq!(
            table.element_type(),
            dof_map.element_type(),
            "reference table and DOF map must use the same element type"
        );
        assert_eq!(
            mesh.shape(),
            dof_map.element_type().shape(),
            "mesh and DOF map must use the same element shape"
        );
        assert_eq!(
            mesh.num_elements(),
            dof_map.num_elements(),
            "DOF map must be built from the same mesh"
        );
        Self { mesh, dof_map, table }
    }

    /// Evaluator using the shared reference table of default quadrature strength.
    pub fn with_default_quadrature(mesh: &'a Mesh, dof_map: &'a DofMap) -> Result<Self> {
        let table = ReferenceTable::with_default_strength(dof_map.element_type())?;
        Ok(Self::new(mesh, dof_map, table))
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn dof_map(&self) -> &'a DofMap {
        self.dof_map
    }

    pub fn table(&self) -> &Arc<ReferenceTable> {
        &self.table
    }

    pub fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    pub fn dofs_per_element(&self) -> usize {
        self.table.num_nodes()
    }

    pub fn element_dofs(&self, element_index: usize) -> &'a [usize] {
        self.dof_map.element_dofs(element_index)
    }

    /// Computes the affine map of an element into `geometry`.
    ///
    /// Fails with [`Error::InvertedElement`] if the Jacobian determinant is not positive and
    /// finite.
    pub fn populate_geometry(&self, element_index: usize, geometry: &mut ElementGeometry) -> Result<()> {
        let d = self.mesh.geometry_dim();
        let vertices = self.mesh.element_vertices(element_index);
        let geometry_gradients = self.table.geometry_gradients();

        geometry.vertex_coords.resize_mut(d, vertices.len(), 0.0);
        for (a, &v) in vertices.iter().enumerate() {
            geometry.vertex_coords.column_mut(a).copy_from(&self.mesh.vertex(v));
        }

        // J_ik = Σ_a x_a[i] ∂λ_a/∂ξ_k
        geometry.jacobian.resize_mut(d, d, 0.0);
        for i in 0..d {
            for k in 0..d {
                geometry.jacobian[(i, k)] = (0..vertices.len())
                    .map(|a| geometry.vertex_coords[(i, a)] * geometry_gradients[(k, a)])
                    .sum();
            }
        }

        let determinant = geometry.jacobian.determinant();
        geometry.determinant = determinant;
        let inverted = Error::InvertedElement {
            element_index,
            determinant,
        };
        if !(determinant > 0.0 && determinant.is_finite()) {
            return Err(inverted);
        }

        geometry.inverse_transpose.resize_mut(d, d, 0.0);
        geometry.inverse_transpose.copy_from(&geometry.jacobian);
        if !geometry.inverse_transpose.try_inverse_mut() {
            return Err(inverted);
        }
        geometry.inverse_transpose.transpose_mut();
        Ok(())
    }

    /// Evaluates the local matrix `∫ ν ∇φ_i·∇φ_j + r φ_i φ_j` and the local load `∫ f φ_i` of an
    /// element into `local`, in the element's local DOF order.
    pub fn evaluate(&self, element_index: usize, coefficients: &dyn Coefficients, local: &mut LocalSystem) -> Result<()> {
        let table = &*self.table;
        local.reset(table.num_nodes(), table.reference_dim());
        let LocalSystem {
            matrix,
            vector,
            geometry,
            physical_gradients,
        } = local;
        self.populate_geometry(element_index, geometry)?;

        let tag = self.mesh.element_tag(element_index);
        let diffusion = coefficients.diffusion(tag);
        let reaction = coefficients.reaction(tag);
        let source = coefficients.source(tag);
        let determinant = geometry.determinant;

        for (q, &w) in table.weights().iter().enumerate() {
            let weight = w * determinant;
            let phi = table.basis_values(q);
            if diffusion != 0.0 {
                physical_gradients.gemm(1.0, &geometry.inverse_transpose, table.basis_gradients(q), 0.0);
                matrix.gemm_tr(weight * diffusion, &*physical_gradients, &*physical_gradients, 1.0);
            }
            if reaction != 0.0 {
                matrix.ger(weight * reaction, &phi, &phi, 1.0);
            }
            if source != 0.0 {
                vector.axpy(weight * source, &phi, 1.0);
            }
        }
        Ok(())
    }

    /// Evaluates the local mass matrix `∫ ρ φ_i φ_j` with density `ρ` per element tag.
    pub fn evaluate_mass(
        &self,
        element_index: usize,
        density: impl Fn(PhysicalTag) -> f64 + Sync,
        local: &mut LocalSystem,
    ) -> Result<()> {
        self.evaluate(element_index, &MassCoefficients(density), local)
    }
}

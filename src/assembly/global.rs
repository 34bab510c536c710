//! Sparsity pattern construction and global assembly into a shared CSR pattern.
use crate::assembly::local::{Coefficients, ElementConnectivityAssembler, ElementEvaluator, LocalSystem, MassCoefficients};
use crate::dof::DofMap;
use crate::element::ReferenceTable;
use crate::error::Result;
use crate::mesh::{Mesh, PhysicalTag};
use log::{debug, info};
use nalgebra::{DMatrixView, DVector, DVectorView};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use thread_local::ThreadLocal;

/// Builds the sparsity pattern of all element-local node pairs.
pub fn build_pattern(element_assembler: &dyn ElementConnectivityAssembler) -> SparsityPattern {
    // Collecting into a BTreeSet stores each matrix entry exactly once, which keeps memory
    // usage low when many elements share nodes
    let mut matrix_entries = BTreeSet::new();
    let mut element_global_nodes = Vec::new();
    for i in 0..element_assembler.num_elements() {
        element_global_nodes.resize(element_assembler.element_node_count(i), usize::MAX);
        element_assembler.populate_element_nodes(&mut element_global_nodes, i);

        for &node_i in &element_global_nodes {
            for &node_j in &element_global_nodes {
                matrix_entries.insert((node_i, node_j));
            }
        }
    }

    let num_rows = element_assembler.num_nodes();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            // Loop to correctly handle consecutive empty rows
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }

    while offsets.len() < (num_rows + 1) {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .expect("offsets and indices built from sorted unique entries are valid")
}

/// Parallel variant of [`build_pattern`] that sorts and deduplicates all entries instead of
/// collecting them in a set. Produces the same pattern.
pub fn par_build_pattern(element_assembler: &(dyn Sync + ElementConnectivityAssembler)) -> SparsityPattern {
    let num_total_entries = (0..element_assembler.num_elements())
        .into_par_iter()
        .with_min_len(50)
        .map(|element_idx| element_assembler.element_node_count(element_idx).pow(2))
        .sum();

    let mut coordinates = Vec::with_capacity(num_total_entries);
    let mut index_workspace = Vec::new();
    for element_idx in 0..element_assembler.num_elements() {
        index_workspace.resize(element_assembler.element_node_count(element_idx), 0);
        element_assembler.populate_element_nodes(&mut index_workspace, element_idx);

        for &node_i in &index_workspace {
            for &node_j in &index_workspace {
                coordinates.push((node_i, node_j));
            }
        }
    }

    coordinates.par_sort_unstable();

    let num_rows = element_assembler.num_nodes();
    let mut row_offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::new();
    row_offsets.push(0);

    let mut current_row = 0;
    let mut prev_col = None;
    for (i, j) in coordinates {
        assert!(i < num_rows, "Coordinates must be in bounds");

        while i > current_row {
            row_offsets.push(column_indices.len());
            current_row += 1;
            prev_col = None;
        }

        if Some(j) != prev_col {
            column_indices.push(j);
            prev_col = Some(j);
        }
    }

    while row_offsets.len() < num_rows + 1 {
        row_offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, row_offsets, column_indices)
        .expect("offsets and indices built from sorted unique entries are valid")
}

/// An assembled (unconstrained) linear system `A x = b` over a shared sparsity pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
    pattern: Arc<SparsityPattern>,
    values: Vec<f64>,
    rhs: DVector<f64>,
}

impl GlobalSystem {
    fn zeros(pattern: Arc<SparsityPattern>) -> Self {
        let values = vec![0.0; pattern.nnz()];
        let rhs = DVector::zeros(pattern.major_dim());
        Self { pattern, values, rhs }
    }

    fn reset(&mut self) {
        self.values.fill(0.0);
        self.rhs.fill(0.0);
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn num_dofs(&self) -> usize {
        self.pattern.major_dim()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Matrix values in the order of the pattern's column indices.
    pub fn matrix_values(&self) -> &[f64] {
        &self.values
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Matrix entry `(i, j)`, or `None` if it is outside the pattern.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        let offsets = self.pattern.major_offsets();
        let begin = offsets[i];
        let columns = &self.pattern.minor_indices()[begin..offsets[i + 1]];
        columns
            .binary_search(&j)
            .ok()
            .map(|local_idx| self.values[begin + local_idx])
    }

    /// A copy of the matrix as a CSR matrix.
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        CsrMatrix::try_from_pattern_and_values(SparsityPattern::clone(&self.pattern), self.values.clone())
            .expect("values match the pattern")
    }

    pub(crate) fn into_parts(self) -> (Arc<SparsityPattern>, Vec<f64>, DVector<f64>) {
        (self.pattern, self.values, self.rhs)
    }

    /// Scatter-adds an element matrix and vector given in local DOF order.
    fn add_element_contribution(
        &mut self,
        element_dofs: &[usize],
        sorted_permutation: &mut Vec<usize>,
        element_matrix: DMatrixView<f64>,
        element_vector: DVectorView<f64>,
    ) {
        sorted_permutation.clear();
        sorted_permutation.extend(0..element_dofs.len());
        sorted_permutation.sort_unstable_by_key(|&i| element_dofs[i]);

        let offsets = self.pattern.major_offsets();
        let column_indices = self.pattern.minor_indices();
        for (local_row, &global_row) in element_dofs.iter().enumerate() {
            self.rhs[global_row] += element_vector[local_row];
            let row_range = offsets[global_row]..offsets[global_row + 1];
            add_element_row_to_csr_row(
                &column_indices[row_range.clone()],
                &mut self.values[row_range],
                element_dofs,
                sorted_permutation,
                &element_matrix,
                local_row,
            );
        }
    }
}

/// Adds row `local_row` of the element matrix to a CSR row.
///
/// `sorted_permutation` lists the local indices of the element DOFs such that the corresponding
/// global indices are sorted, which allows a single forward pass over the sorted CSR columns.
fn add_element_row_to_csr_row(
    csr_columns: &[usize],
    csr_values: &mut [f64],
    element_dofs: &[usize],
    sorted_permutation: &[usize],
    element_matrix: &DMatrixView<f64>,
    local_row: usize,
) {
    assert_eq!(element_dofs.len(), sorted_permutation.len());
    let mut csr_col_idx_iter = csr_columns.iter().copied().enumerate();

    for &local_col in sorted_permutation {
        let global_col = element_dofs[local_col];
        let (local_csr_col_idx, _) = csr_col_idx_iter
            .find(|&(_, csr_col)| csr_col == global_col)
            .expect("Could not find column index associated with DOF in CSR row");
        csr_values[local_csr_col_idx] += element_matrix[(local_row, local_col)];
    }
}

/// Settings for [`GlobalAssembler`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Evaluate elements on the rayon thread pool.
    pub parallel: bool,
    /// Number of consecutive elements evaluated by one parallel task.
    pub chunk_size: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 256,
        }
    }
}

impl AssemblyConfig {
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }
}

#[derive(Debug, Default)]
struct AssemblerWorkspace {
    local: LocalSystem,
    sorted_permutation: Vec<usize>,
}

/// Local results of a contiguous range of elements, stored back to back.
struct ChunkContributions {
    matrices: Vec<f64>,
    vectors: Vec<f64>,
}

/// Assembles global systems over a fixed sparsity pattern.
///
/// Parallel assembly evaluates fixed chunks of elements concurrently and then merges them into
/// the global system in element order, so its result is bitwise identical to serial assembly.
#[derive(Debug)]
pub struct GlobalAssembler<'a> {
    evaluator: ElementEvaluator<'a>,
    pattern: Arc<SparsityPattern>,
    config: AssemblyConfig,
    workspace: RefCell<AssemblerWorkspace>,
    thread_workspaces: ThreadLocal<RefCell<LocalSystem>>,
}

impl<'a> GlobalAssembler<'a> {
    /// # Panics
    ///
    /// Panics if the pattern dimensions do not match the number of DOFs, or if the mesh, DOF map
    /// and table are inconsistent (see [`ElementEvaluator::new`]).
    pub fn new(mesh: &'a Mesh, dof_map: &'a DofMap, table: Arc<ReferenceTable>, pattern: Arc<SparsityPattern>) -> Self {
        Self::from_evaluator(ElementEvaluator::new(mesh, dof_map, table), pattern)
    }

    pub fn from_evaluator(evaluator: ElementEvaluator<'a>, pattern: Arc<SparsityPattern>) -> Self {
        let num_dofs = evaluator.dof_map().num_dofs();
        assert_eq!(pattern.major_dim(), num_dofs, "pattern must have one row per DOF");
        assert_eq!(pattern.minor_dim(), num_dofs, "pattern must have one column per DOF");
        Self {
            evaluator,
            pattern,
            config: AssemblyConfig::default(),
            workspace: RefCell::default(),
            thread_workspaces: ThreadLocal::new(),
        }
    }

    /// Assembler with the default quadrature and a freshly built pattern.
    pub fn from_mesh_and_dofs(mesh: &'a Mesh, dof_map: &'a DofMap) -> Result<Self> {
        let evaluator = ElementEvaluator::with_default_quadrature(mesh, dof_map)?;
        let pattern = Arc::new(build_pattern(dof_map));
        Ok(Self::from_evaluator(evaluator, pattern))
    }

    pub fn with_config(self, config: AssemblyConfig) -> Self {
        Self { config, ..self }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn evaluator(&self) -> &ElementEvaluator<'a> {
        &self.evaluator
    }

    /// Assembles a new system. Any element error aborts assembly.
    pub fn assemble(&self, coefficients: &dyn Coefficients) -> Result<GlobalSystem> {
        let mut system = GlobalSystem::zeros(Arc::clone(&self.pattern));
        self.assemble_into(&mut system, coefficients)?;
        Ok(system)
    }

    /// Re-assembles into the storage of a previously assembled system with new coefficients.
    ///
    /// # Panics
    ///
    /// Panics if the system was assembled over a different pattern.
    pub fn reassemble(&self, mut system: GlobalSystem, coefficients: &dyn Coefficients) -> Result<GlobalSystem> {
        assert!(
            Arc::ptr_eq(&system.pattern, &self.pattern) || system.pattern == self.pattern,
            "system must have been assembled over the same sparsity pattern"
        );
        system.reset();
        self.assemble_into(&mut system, coefficients)?;
        Ok(system)
    }

    /// Assembles the mass matrix `∫ ρ φ_i φ_j` with density `ρ` per element tag.
    pub fn assemble_mass(&self, density: impl Fn(PhysicalTag) -> f64 + Sync) -> Result<CsrMatrix<f64>> {
        Ok(self.assemble(&MassCoefficients(density))?.to_csr())
    }

    fn assemble_into(&self, system: &mut GlobalSystem, coefficients: &dyn Coefficients) -> Result<()> {
        let start = Instant::now();
        if self.config.parallel {
            self.assemble_parallel_into(system, coefficients)?;
        } else {
            self.assemble_serial_into(system, coefficients)?;
        }
        info!(
            "Assembled {} elements into system with {} DOFs and {} nonzeros in {:.2?} ({})",
            self.evaluator.num_elements(),
            system.num_dofs(),
            system.nnz(),
            start.elapsed(),
            if self.config.parallel { "parallel" } else { "serial" }
        );
        Ok(())
    }

    fn assemble_serial_into(&self, system: &mut GlobalSystem, coefficients: &dyn Coefficients) -> Result<()> {
        let ws = &mut *self.workspace.borrow_mut();
        for element_index in 0..self.evaluator.num_elements() {
            self.evaluator.evaluate(element_index, coefficients, &mut ws.local)?;
            system.add_element_contribution(
                self.evaluator.element_dofs(element_index),
                &mut ws.sorted_permutation,
                ws.local.matrix().columns(0, ws.local.matrix().ncols()),
                ws.local.vector().rows(0, ws.local.vector().nrows()),
            );
        }
        Ok(())
    }

    fn assemble_parallel_into(&self, system: &mut GlobalSystem, coefficients: &dyn Coefficients) -> Result<()> {
        let num_elements = self.evaluator.num_elements();
        let n = self.evaluator.dofs_per_element();
        let chunk_size = self.config.chunk_size.max(1);
        let evaluator = &self.evaluator;
        let thread_workspaces = &self.thread_workspaces;

        let chunk_starts: Vec<usize> = (0..num_elements).step_by(chunk_size).collect();
        // Bounds the memory held by evaluated but not yet merged chunks
        let batch_size = 4 * rayon::current_num_threads().max(1);
        debug!(
            "Parallel assembly of {} chunks of up to {} elements",
            chunk_starts.len(),
            chunk_size
        );

        let ws = &mut *self.workspace.borrow_mut();
        for batch in chunk_starts.chunks(batch_size) {
            let contributions: Vec<Result<ChunkContributions>> = batch
                .par_iter()
                .map(|&chunk_start| {
                    let chunk_end = (chunk_start + chunk_size).min(num_elements);
                    let mut local = thread_workspaces.get_or_default().borrow_mut();
                    let mut chunk = ChunkContributions {
                        matrices: Vec::with_capacity((chunk_end - chunk_start) * n * n),
                        vectors: Vec::with_capacity((chunk_end - chunk_start) * n),
                    };
                    for element_index in chunk_start..chunk_end {
                        evaluator.evaluate(element_index, coefficients, &mut local)?;
                        chunk.matrices.extend_from_slice(local.matrix().as_slice());
                        chunk.vectors.extend_from_slice(local.vector().as_slice());
                    }
                    Ok(chunk)
                })
                .collect();

            // Merge in element order; the first failing chunk decides the reported error
            for (&chunk_start, chunk) in batch.iter().zip(contributions) {
                let chunk = chunk?;
                let chunk_end = (chunk_start + chunk_size).min(num_elements);
                for (k, element_index) in (chunk_start..chunk_end).enumerate() {
                    let element_matrix = DMatrixView::from_slice(&chunk.matrices[k * n * n..(k + 1) * n * n], n, n);
                    let element_vector = DVectorView::from_slice(&chunk.vectors[k * n..(k + 1) * n], n);
                    system.add_element_contribution(
                        evaluator.element_dofs(element_index),
                        &mut ws.sorted_permutation,
                        element_matrix,
                        element_vector,
                    );
                }
            }
        }
        Ok(())
    }
}

//! Assemble-and-solve driver for stationary problems `-div(ν ∇u) + r u = f` with Dirichlet
//! conditions.
use crate::assembly::global::{build_pattern, par_build_pattern, AssemblyConfig, GlobalAssembler};
use crate::assembly::local::Coefficients;
use crate::constraints::{apply_with_scaling, resolve_constraints, ConstraintSet, DiagonalScaling, DirichletCondition};
use crate::dof::DofMap;
use crate::element::{ElementType, ReferenceTable};
use crate::error::Result;
use crate::field::FieldReconstructor;
use crate::mesh::Mesh;
use crate::solver::{LinearSolver, SolutionVector, SolverConfig};
use log::info;
use nalgebra_sparse::pattern::SparsityPattern;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Discretization and solver settings. Every field has a default, so partial JSON documents
/// deserialize.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    /// Polynomial order of the Lagrange elements.
    pub order: usize,
    /// Quadrature strength, `2 * order` if not given.
    pub quadrature_strength: Option<usize>,
    pub assembly: AssemblyConfig,
    pub diagonal_scaling: DiagonalScaling,
    pub solver: SolverConfig,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            order: 1,
            quadrature_strength: None,
            assembly: AssemblyConfig::default(),
            diagonal_scaling: DiagonalScaling::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl ProblemConfig {
    pub fn with_order(self, order: usize) -> Self {
        Self { order, ..self }
    }

    pub fn with_quadrature_strength(self, strength: usize) -> Self {
        Self {
            quadrature_strength: Some(strength),
            ..self
        }
    }

    pub fn with_assembly(self, assembly: AssemblyConfig) -> Self {
        Self { assembly, ..self }
    }

    pub fn with_solver(self, solver: impl Into<SolverConfig>) -> Self {
        Self {
            solver: solver.into(),
            ..self
        }
    }

    pub fn with_diagonal_scaling(self, diagonal_scaling: DiagonalScaling) -> Self {
        Self {
            diagonal_scaling,
            ..self
        }
    }
}

/// A stationary problem on a mesh, before any topology-dependent data has been built.
#[derive(Debug, Clone)]
pub struct StationaryProblem<'a> {
    mesh: &'a Mesh,
    config: ProblemConfig,
    conditions: Vec<DirichletCondition>,
}

impl<'a> StationaryProblem<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            config: ProblemConfig::default(),
            conditions: Vec::new(),
        }
    }

    pub fn with_config(self, config: ProblemConfig) -> Self {
        Self { config, ..self }
    }

    pub fn with_dirichlet(mut self, condition: DirichletCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    /// Builds the DOF map, the reference table, the sparsity pattern and the constraint set.
    ///
    /// The result can solve the problem for any number of coefficient sets.
    pub fn prepare(&self) -> Result<PreparedProblem<'a>> {
        let start = Instant::now();
        let dof_map = DofMap::new(self.mesh, self.config.order)?;
        let element_type = ElementType::new(self.mesh.shape(), self.config.order)?;
        let strength = self
            .config
            .quadrature_strength
            .unwrap_or_else(|| element_type.default_quadrature_strength());
        let table = ReferenceTable::get(element_type, strength)?;
        let pattern = if self.config.assembly.parallel {
            par_build_pattern(&dof_map)
        } else {
            build_pattern(&dof_map)
        };
        let constraints = resolve_constraints(self.mesh, &dof_map, &self.conditions)?;

        info!(
            "Prepared problem with {} DOFs, {} nonzeros and {} constrained DOFs in {:.2?}",
            dof_map.num_dofs(),
            pattern.nnz(),
            constraints.len(),
            start.elapsed()
        );
        Ok(PreparedProblem {
            mesh: self.mesh,
            dof_map,
            table,
            pattern: Arc::new(pattern),
            constraints,
            config: self.config,
        })
    }

    pub fn solve(&self, coefficients: &dyn Coefficients) -> Result<SolutionVector> {
        self.prepare()?.solve(coefficients)
    }
}

/// A problem with its DOF map, sparsity pattern and constraints built.
#[derive(Debug, Clone)]
pub struct PreparedProblem<'a> {
    mesh: &'a Mesh,
    dof_map: DofMap,
    table: Arc<ReferenceTable>,
    pattern: Arc<SparsityPattern>,
    constraints: ConstraintSet,
    config: ProblemConfig,
}

impl<'a> PreparedProblem<'a> {
    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dof_map
    }

    pub fn table(&self) -> &Arc<ReferenceTable> {
        &self.table
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn assembler(&self) -> GlobalAssembler<'_> {
        GlobalAssembler::new(
            self.mesh,
            &self.dof_map,
            Arc::clone(&self.table),
            Arc::clone(&self.pattern),
        )
        .with_config(self.config.assembly)
    }

    pub fn field_reconstructor(&self) -> FieldReconstructor<'_> {
        FieldReconstructor::new(self.mesh, &self.dof_map, Arc::clone(&self.table))
    }

    /// Assembles, constrains and solves the system for the given coefficients.
    pub fn solve(&self, coefficients: &dyn Coefficients) -> Result<SolutionVector> {
        let system = self.assembler().assemble(coefficients)?;
        let constrained = apply_with_scaling(system, &self.constraints, self.config.diagonal_scaling)?;
        self.config.solver.solve(&constrained)
    }
}

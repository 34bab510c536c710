//! Dirichlet boundary conditions: resolution into per-DOF values and elimination from an
//! assembled system.
use crate::assembly::global::GlobalSystem;
use crate::dof::DofMap;
use crate::error::{Error, Result};
use crate::mesh::{Mesh, PhysicalTag};
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Prescribed values per DOF. Each DOF has at most one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    values: BTreeMap<usize, f64>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prescribes `value` for `dof`.
    ///
    /// Inserting the same value twice is allowed, a different value is a
    /// [`Error::ConflictingConstraint`].
    pub fn insert(&mut self, dof: usize, value: f64) -> Result<()> {
        match self.values.entry(dof) {
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
            Entry::Occupied(entry) if *entry.get() == value => Ok(()),
            Entry::Occupied(entry) => Err(Error::ConflictingConstraint {
                dof,
                first: ConstraintClaim::untagged(*entry.get()),
                second: ConstraintClaim::untagged(value),
            }),
        }
    }

    pub fn get(&self, dof: usize) -> Option<f64> {
        self.values.get(&dof).copied()
    }

    pub fn contains(&self, dof: usize) -> bool {
        self.values.contains_key(&dof)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Constrained DOFs and their values, ordered by DOF.
    pub fn iter(&self) -> impl '_ + Iterator<Item = (usize, f64)> {
        self.values.iter().map(|(&dof, &value)| (dof, value))
    }
}

impl FromIterator<(usize, f64)> for ConstraintSet {
    /// Later entries replace earlier entries for the same DOF.
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Who prescribed a value for a DOF. Reported in [`Error::ConflictingConstraint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintClaim {
    /// Physical group of the condition, or `None` for values inserted directly.
    pub tag: Option<PhysicalTag>,
    pub value: f64,
    pub priority: Option<i32>,
}

impl ConstraintClaim {
    fn untagged(value: f64) -> Self {
        Self {
            tag: None,
            value,
            priority: None,
        }
    }
}

impl Display for ConstraintClaim {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "value {}", self.value)?;
        if let Some(tag) = self.tag {
            write!(f, " from group {}", tag)?;
        }
        if let Some(priority) = self.priority {
            write!(f, " (priority {})", priority)?;
        }
        Ok(())
    }
}

/// Value of a Dirichlet condition: a constant, or a function of the position of the DOF's
/// Lagrange node.
#[derive(Clone)]
pub enum BoundaryValue {
    Constant(f64),
    Function(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
}

impl BoundaryValue {
    pub fn function(f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Function(f) => f(x),
        }
    }
}

impl Debug for BoundaryValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<f64> for BoundaryValue {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

/// The part of a physical group a condition applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstrainedEntities {
    /// Vertex DOFs of a node group.
    Nodes,
    /// All DOFs on the facets of a facet group, including edge DOFs for quadratic elements.
    Facets,
    /// All DOFs of the elements with the given element tag.
    Elements,
}

/// A Dirichlet condition `u = g` on one physical group.
#[derive(Debug, Clone)]
pub struct DirichletCondition {
    pub tag: PhysicalTag,
    pub entities: ConstrainedEntities,
    pub value: BoundaryValue,
    pub priority: Option<i32>,
}

impl DirichletCondition {
    pub fn new(tag: PhysicalTag, entities: ConstrainedEntities, value: impl Into<BoundaryValue>) -> Self {
        Self {
            tag,
            entities,
            value: value.into(),
            priority: None,
        }
    }

    pub fn on_nodes(tag: PhysicalTag, value: impl Into<BoundaryValue>) -> Self {
        Self::new(tag, ConstrainedEntities::Nodes, value)
    }

    pub fn on_facets(tag: PhysicalTag, value: impl Into<BoundaryValue>) -> Self {
        Self::new(tag, ConstrainedEntities::Facets, value)
    }

    pub fn on_elements(tag: PhysicalTag, value: impl Into<BoundaryValue>) -> Self {
        Self::new(tag, ConstrainedEntities::Elements, value)
    }

    /// When two conditions prescribe different values, the one with the higher priority wins.
    pub fn with_priority(self, priority: i32) -> Self {
        Self {
            priority: Some(priority),
            ..self
        }
    }

    /// The DOFs this condition applies to, possibly with duplicates.
    fn collect_dofs(&self, mesh: &Mesh, dof_map: &DofMap) -> Result<Vec<usize>> {
        let groups = mesh.physical_groups();
        let unknown = || Error::UnknownPhysicalGroup { tag: self.tag };
        match self.entities {
            ConstrainedEntities::Nodes => {
                let nodes = groups.node_group(self.tag).ok_or_else(unknown)?;
                Ok(nodes.iter().filter_map(|&v| dof_map.vertex_dof(v)).collect())
            }
            ConstrainedEntities::Facets => {
                let facets = groups.facet_group(self.tag).ok_or_else(unknown)?;
                Ok(facets
                    .iter()
                    .flat_map(|facet| dof_map.facet_dofs(facet))
                    .collect())
            }
            ConstrainedEntities::Elements => {
                let elements: Vec<usize> = (0..mesh.num_elements())
                    .filter(|&e| mesh.element_tag(e) == self.tag)
                    .collect();
                if elements.is_empty() {
                    return Err(unknown());
                }
                Ok(elements
                    .into_iter()
                    .flat_map(|e| dof_map.element_dofs(e).iter().copied())
                    .collect())
            }
        }
    }
}

/// Evaluates all conditions at their DOFs and merges them into one [`ConstraintSet`].
///
/// All claims on a DOF are gathered before deciding, so the result does not depend on the order
/// of `conditions`. The claim with the highest priority wins, where a claim without priority ranks
/// below every prioritized one. Claims with a value other than the winner's are overruled only if
/// they carry a strictly lower priority. Otherwise the DOF is a [`Error::ConflictingConstraint`].
pub fn resolve_constraints(mesh: &Mesh, dof_map: &DofMap, conditions: &[DirichletCondition]) -> Result<ConstraintSet> {
    let mut claims: BTreeMap<usize, Vec<ConstraintClaim>> = BTreeMap::new();
    for condition in conditions {
        for dof in condition.collect_dofs(mesh, dof_map)? {
            claims.entry(dof).or_default().push(ConstraintClaim {
                tag: Some(condition.tag),
                value: condition.value.evaluate(&dof_map.dof_position(mesh, dof)),
                priority: condition.priority,
            });
        }
    }

    let mut constraints = ConstraintSet::new();
    for (dof, dof_claims) in &claims {
        let winner = decide_claims(*dof, dof_claims)?;
        constraints.insert(*dof, winner.value)?;
    }

    debug!(
        "Resolved {} Dirichlet conditions into {} constrained DOFs",
        conditions.len(),
        constraints.len()
    );
    Ok(constraints)
}

fn decide_claims(dof: usize, claims: &[ConstraintClaim]) -> Result<ConstraintClaim> {
    // Option orders None below any Some
    let winner = claims
        .iter()
        .copied()
        .reduce(|best, claim| if claim.priority > best.priority { claim } else { best })
        .expect("every constrained DOF has at least one claim");
    let overruled = |claim: &ConstraintClaim| match (claim.priority, winner.priority) {
        (Some(p_claim), Some(p_winner)) => p_claim < p_winner,
        _ => false,
    };
    match claims
        .iter()
        .find(|claim| claim.value != winner.value && !overruled(claim))
    {
        Some(&offending) => Err(Error::ConflictingConstraint {
            dof,
            first: winner,
            second: offending,
        }),
        None => Ok(winner),
    }
}

/// The value placed on the diagonal of constrained rows.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalScaling {
    Unit,
    /// Mean absolute value of the nonzero diagonal entries of the unconstrained matrix.
    #[default]
    MatrixScale,
}

impl DiagonalScaling {
    fn scale(&self, matrix: &CsrMatrix<f64>) -> f64 {
        match self {
            Self::Unit => 1.0,
            Self::MatrixScale => {
                let (sum, count) = (0..matrix.nrows())
                    .filter_map(|i| diagonal_entry(matrix, i))
                    .filter(|&a_ii| a_ii != 0.0)
                    .fold((0.0, 0usize), |(sum, count), a_ii| (sum + a_ii.abs(), count + 1));
                if count > 0 {
                    sum / count as f64
                } else {
                    1.0
                }
            }
        }
    }
}

fn diagonal_entry(matrix: &CsrMatrix<f64>, i: usize) -> Option<f64> {
    let row = matrix.row(i);
    row.col_indices()
        .binary_search(&i)
        .ok()
        .map(|local_idx| row.values()[local_idx])
}

/// A system with Dirichlet values eliminated, ready to be solved.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSystem {
    matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
    constraints: ConstraintSet,
}

impl ConstrainedSystem {
    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn num_dofs(&self) -> usize {
        self.rhs.len()
    }

    pub fn into_parts(self) -> (CsrMatrix<f64>, DVector<f64>, ConstraintSet) {
        (self.matrix, self.rhs, self.constraints)
    }
}

/// Eliminates the constraints from the system with [`DiagonalScaling::MatrixScale`].
pub fn apply(system: GlobalSystem, constraints: &ConstraintSet) -> Result<ConstrainedSystem> {
    apply_with_scaling(system, constraints, DiagonalScaling::default())
}

/// Eliminates the constraints by symmetric row/column elimination.
///
/// For every unconstrained row `i`, `b_i -= A_ic g_c` for each constrained DOF `c`. Constrained
/// rows and columns are then zeroed, with `s` on the diagonal and `s g_c` in the right-hand side.
pub fn apply_with_scaling(
    system: GlobalSystem,
    constraints: &ConstraintSet,
    scaling: DiagonalScaling,
) -> Result<ConstrainedSystem> {
    let num_dofs = system.num_dofs();
    if let Some((dof, _)) = constraints.iter().find(|&(dof, _)| dof >= num_dofs) {
        return Err(Error::InvalidConstraint { dof, num_dofs });
    }

    let (pattern, values, mut rhs) = system.into_parts();
    let pattern = Arc::try_unwrap(pattern).unwrap_or_else(|shared| SparsityPattern::clone(&shared));
    let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, values).expect("values match the pattern");
    let scale = scaling.scale(&matrix);

    let mut prescribed = vec![None; num_dofs];
    for (dof, value) in constraints.iter() {
        prescribed[dof] = Some(value);
    }

    // The pattern is structurally symmetric, so visiting constrained rows tells us which
    // unconstrained rows have entries in constrained columns
    let mut rows_to_visit = vec![false; num_dofs];
    for (dof, value) in constraints.iter() {
        let mut row = matrix.row_mut(dof);
        let (cols, values) = row.cols_and_values_mut();
        for (&col, val) in cols.iter().zip(values) {
            if col == dof {
                *val = scale;
            } else {
                *val = 0.0;
                rows_to_visit[col] = true;
            }
        }
        rhs[dof] = scale * value;
    }

    for row_index in (0..num_dofs).filter(|&i| rows_to_visit[i] && prescribed[i].is_none()) {
        let mut row = matrix.row_mut(row_index);
        let (cols, values) = row.cols_and_values_mut();
        for (&col, val) in cols.iter().zip(values) {
            if let Some(g) = prescribed[col] {
                rhs[row_index] -= *val * g;
                *val = 0.0;
            }
        }
    }

    debug!(
        "Eliminated {} constrained DOFs of {} (diagonal scale {:e})",
        constraints.len(),
        num_dofs,
        scale
    );

    Ok(ConstrainedSystem {
        matrix,
        rhs,
        constraints: constraints.clone(),
    })
}

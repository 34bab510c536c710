//! Per-element post-processing of solutions: gradients and fluxes.
use crate::assembly::local::{Coefficients, ElementEvaluator, ElementGeometry};
use crate::dof::DofMap;
use crate::element::ReferenceTable;
use crate::error::Result;
use crate::mesh::Mesh;
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;

/// A vector quantity reduced to a single value per element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementField {
    pub element_index: usize,
    pub value: DVector<f64>,
}

/// Computes element-averaged gradients and fluxes of a solution.
#[derive(Debug, Clone)]
pub struct FieldReconstructor<'a> {
    evaluator: ElementEvaluator<'a>,
}

impl<'a> FieldReconstructor<'a> {
    pub fn new(mesh: &'a Mesh, dof_map: &'a DofMap, table: Arc<ReferenceTable>) -> Self {
        Self {
            evaluator: ElementEvaluator::new(mesh, dof_map, table),
        }
    }

    pub fn with_default_quadrature(mesh: &'a Mesh, dof_map: &'a DofMap) -> Result<Self> {
        Ok(Self {
            evaluator: ElementEvaluator::with_default_quadrature(mesh, dof_map)?,
        })
    }

    pub fn from_evaluator(evaluator: ElementEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    /// Element-averaged `∇u`.
    ///
    /// # Panics
    ///
    /// Panics if the solution does not have one value per DOF.
    pub fn gradients<'b>(&'b self, solution: &'b [f64]) -> ElementFields<'b> {
        ElementFields::new(&self.evaluator, solution, FieldKind::Gradient)
    }

    /// Element-averaged `-∇u`, e.g. the electric field for a potential `u`.
    pub fn negative_gradients<'b>(&'b self, solution: &'b [f64]) -> ElementFields<'b> {
        ElementFields::new(&self.evaluator, solution, FieldKind::NegativeGradient)
    }

    /// Element-averaged flux `-ν ∇u` with the diffusion coefficient of each element's tag.
    pub fn fluxes<'b>(&'b self, solution: &'b [f64], coefficients: &'b dyn Coefficients) -> ElementFields<'b> {
        ElementFields::new(&self.evaluator, solution, FieldKind::Flux(coefficients))
    }
}

#[derive(Clone, Copy)]
enum FieldKind<'b> {
    Gradient,
    NegativeGradient,
    Flux(&'b dyn Coefficients),
}

#[derive(Clone)]
struct FieldWorkspace {
    geometry: ElementGeometry,
    local_values: DVector<f64>,
    reference_gradient: DVector<f64>,
    gradient: DVector<f64>,
}

/// Lazy iterator over the fields of all elements, in element order.
///
/// Evaluation of an element fails if the element is inverted.
#[derive(Clone)]
pub struct ElementFields<'b> {
    evaluator: &'b ElementEvaluator<'b>,
    solution: &'b [f64],
    kind: FieldKind<'b>,
    elements: Range<usize>,
    workspace: FieldWorkspace,
}

impl<'b> Debug for ElementFields<'b> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementFields")
            .field("elements", &self.elements)
            .finish_non_exhaustive()
    }
}

impl<'b> ElementFields<'b> {
    fn new(evaluator: &'b ElementEvaluator<'b>, solution: &'b [f64], kind: FieldKind<'b>) -> Self {
        assert_eq!(
            solution.len(),
            evaluator.dof_map().num_dofs(),
            "solution must have one value per DOF"
        );
        let d = evaluator.table().reference_dim();
        Self {
            evaluator,
            solution,
            kind,
            elements: 0..evaluator.num_elements(),
            workspace: FieldWorkspace {
                geometry: ElementGeometry::default(),
                local_values: DVector::zeros(evaluator.dofs_per_element()),
                reference_gradient: DVector::zeros(d),
                gradient: DVector::zeros(d),
            },
        }
    }

    fn evaluate(&mut self, element_index: usize) -> Result<ElementField> {
        let evaluator = self.evaluator;
        let table = evaluator.table();
        let FieldWorkspace {
            geometry,
            local_values,
            reference_gradient,
            gradient,
        } = &mut self.workspace;
        evaluator.populate_geometry(element_index, geometry)?;

        for (u_local, &dof) in local_values.iter_mut().zip(evaluator.element_dofs(element_index)) {
            *u_local = self.solution[dof];
        }

        // The Jacobian is constant, so the |J| w weighted average only needs the weights
        let mut value = DVector::zeros(gradient.len());
        let mut total_weight = 0.0;
        for (q, &w) in table.weights().iter().enumerate() {
            reference_gradient.gemv(1.0, table.basis_gradients(q), &*local_values, 0.0);
            gradient.gemv(1.0, geometry.inverse_transpose(), &*reference_gradient, 0.0);
            value.axpy(w, &*gradient, 1.0);
            total_weight += w;
        }
        value /= total_weight;

        match self.kind {
            FieldKind::Gradient => {}
            FieldKind::NegativeGradient => value.neg_mut(),
            FieldKind::Flux(coefficients) => {
                let diffusion = coefficients.diffusion(evaluator.mesh().element_tag(element_index));
                value *= -diffusion;
            }
        }

        Ok(ElementField { element_index, value })
    }

    /// Collects the remaining fields into a `d x num_elements` matrix, one column per element.
    pub fn collect_matrix(self) -> Result<DMatrix<f64>> {
        let d = self.workspace.gradient.len();
        let mut matrix = DMatrix::zeros(d, self.len());
        for (mut column, field) in izip!(matrix.column_iter_mut(), self) {
            column.copy_from(&field?.value);
        }
        Ok(matrix)
    }
}

impl<'b> Iterator for ElementFields<'b> {
    type Item = Result<ElementField>;

    fn next(&mut self) -> Option<Self::Item> {
        let element_index = self.elements.next()?;
        Some(self.evaluate(element_index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.elements.size_hint()
    }
}

impl<'b> ExactSizeIterator for ElementFields<'b> {}

impl<'b> FusedIterator for ElementFields<'b> {}

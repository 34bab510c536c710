use super::{ElementType, ReferenceFiniteElement};
use crate::error::Result;
use crate::quadrature::{reference_rule, QuadratureRule};
use log::debug;
use nalgebra::{DMatrix, DVectorView};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type TableKey = (ElementType, usize);

static REFERENCE_TABLES: Lazy<RwLock<FxHashMap<TableKey, Arc<ReferenceTable>>>> = Lazy::new(Default::default);

/// Basis values and reference gradients of an element type tabulated at the points of a
/// reference quadrature rule.
#[derive(Debug)]
pub struct ReferenceTable {
    element_type: ElementType,
    quadrature: QuadratureRule,
    /// `num_nodes x num_points`, one column per quadrature point.
    basis_values: DMatrix<f64>,
    /// One `reference_dim x num_nodes` matrix per quadrature point.
    basis_gradients: Vec<DMatrix<f64>>,
    /// Reference gradients of the linear corner basis, which define the affine geometry map.
    geometry_gradients: DMatrix<f64>,
}

impl ReferenceTable {
    /// Returns the shared table for the given element type and quadrature strength, computing
    /// it on first use.
    pub fn get(element_type: ElementType, strength: usize) -> Result<Arc<Self>> {
        let key = (element_type, strength);
        if let Some(table) = REFERENCE_TABLES.read().get(&key) {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(Self::compute(element_type, strength)?);
        let mut tables = REFERENCE_TABLES.write();
        Ok(Arc::clone(tables.entry(key).or_insert(table)))
    }

    /// Shared table using [`ElementType::default_quadrature_strength`].
    pub fn with_default_strength(element_type: ElementType) -> Result<Arc<Self>> {
        Self::get(element_type, element_type.default_quadrature_strength())
    }

    /// Computes a table without consulting or populating the shared cache.
    pub fn compute(element_type: ElementType, strength: usize) -> Result<Self> {
        let element = element_type.reference_element()?;
        let quadrature = reference_rule(element_type.shape(), strength)?;
        let d = element.reference_dim();
        let n = element.num_nodes();

        let mut basis_values = DMatrix::zeros(n, quadrature.num_points());
        let mut basis_gradients = Vec::with_capacity(quadrature.num_points());
        let mut phi = vec![0.0; n];
        for (q, xi) in quadrature.points().enumerate() {
            element.populate_basis(&mut phi, xi);
            basis_values.column_mut(q).copy_from_slice(&phi);
            let mut gradients = DMatrix::zeros(d, n);
            element.populate_basis_gradients((&mut gradients).into(), xi);
            basis_gradients.push(gradients);
        }

        let linear = ElementType::new(element_type.shape(), 1)?.reference_element()?;
        let mut geometry_gradients = DMatrix::zeros(d, linear.num_nodes());
        let centroid = vec![1.0 / (d + 1) as f64; d];
        linear.populate_basis_gradients((&mut geometry_gradients).into(), &centroid);

        debug!(
            "Tabulated {:?} of order {} at {} quadrature points (strength {})",
            element_type.shape(),
            element_type.order(),
            quadrature.num_points(),
            strength
        );

        Ok(Self {
            element_type,
            quadrature,
            basis_values,
            basis_gradients,
            geometry_gradients,
        })
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn reference_element(&self) -> &'static dyn ReferenceFiniteElement {
        self.element_type
            .reference_element()
            .expect("tables are only constructed for supported element types")
    }

    pub fn quadrature(&self) -> &QuadratureRule {
        &self.quadrature
    }

    pub fn num_points(&self) -> usize {
        self.quadrature.num_points()
    }

    pub fn num_nodes(&self) -> usize {
        self.basis_values.nrows()
    }

    pub fn reference_dim(&self) -> usize {
        self.geometry_gradients.nrows()
    }

    pub fn weights(&self) -> &[f64] {
        self.quadrature.weights()
    }

    /// Values of all basis functions at quadrature point `q`.
    pub fn basis_values(&self, q: usize) -> DVectorView<'_, f64> {
        self.basis_values.column(q)
    }

    /// Reference gradients of all basis functions at quadrature point `q`, one column per node.
    pub fn basis_gradients(&self, q: usize) -> &DMatrix<f64> {
        &self.basis_gradients[q]
    }

    pub fn geometry_gradients(&self) -> &DMatrix<f64> {
        &self.geometry_gradients
    }
}

//! Quadrature rules on the reference simplices.
//!
//! The reference domains are the interval `[0, 1]`, the triangle with vertices
//! `(0,0), (1,0), (0,1)` and the tetrahedron with vertices `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
//! A rule of strength `k` integrates every polynomial of total degree at most `k` exactly.
use crate::element::ElementShape;
use crate::error::{Error, Result};
use std::slice::ChunksExact;

mod simplex;
pub mod univariate;

/// The highest strength for which [`reference_rule`] produces a rule.
pub const MAX_STRENGTH: usize = 12;

/// A quadrature rule on a reference domain.
///
/// Points are stored contiguously, `reference_dim` coordinates per point.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    shape: ElementShape,
    strength: usize,
    weights: Vec<f64>,
    points: Vec<f64>,
}

impl QuadratureRule {
    /// # Panics
    ///
    /// Panics if the number of point coordinates does not match the number of weights.
    pub fn from_parts(shape: ElementShape, strength: usize, weights: Vec<f64>, points: Vec<f64>) -> Self {
        assert_eq!(
            weights.len() * shape.reference_dim(),
            points.len(),
            "every weight must have exactly one point"
        );
        Self {
            shape,
            strength,
            weights,
            points,
        }
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn reference_dim(&self) -> usize {
        self.shape.reference_dim()
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn point(&self, index: usize) -> &[f64] {
        let d = self.reference_dim();
        &self.points[d * index..d * (index + 1)]
    }

    pub fn points(&self) -> ChunksExact<'_, f64> {
        self.points.chunks_exact(self.reference_dim())
    }

    /// Approximates the integral of `f` over the reference domain.
    pub fn integrate(&self, f: impl Fn(&[f64]) -> f64) -> f64 {
        self.weights
            .iter()
            .zip(self.points())
            .map(|(w, xi)| w * f(xi))
            .sum()
    }
}

/// Returns a rule on the reference domain of `shape` that is exact for polynomials of total
/// degree up to `strength`.
///
/// Strength `0` is treated as strength `1`.
pub fn reference_rule(shape: ElementShape, strength: usize) -> Result<QuadratureRule> {
    if strength > MAX_STRENGTH {
        return Err(Error::UnsupportedQuadrature { shape, strength });
    }

    let (weights, points) = match shape {
        ElementShape::Segment => univariate::gauss_legendre_01(univariate::num_points_for_degree(strength)),
        ElementShape::Triangle => simplex::triangle_rule(strength),
        ElementShape::Tetrahedron => simplex::tetrahedron_rule(strength),
    };
    Ok(QuadratureRule::from_parts(shape, strength, weights, points))
}

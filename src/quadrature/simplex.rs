//! Quadrature rules for the reference triangle `(0,0), (1,0), (0,1)` and the reference
//! tetrahedron `(0,0,0), (1,0,0), (0,1,0), (0,0,1)`.
//!
//! Low strengths use symmetric rules with few points. Higher strengths fall back to collapsed
//! (conical product) Gauss–Legendre rules, which exist for any strength at the cost of more points.
//!
//! Sources of the tabulated constants, with weights scaled to the reference volume:
//!
//! - Triangle, strength 2: the three-point interior rule of Strang and Fix, *An Analysis of the
//!   Finite Element Method* (1973).
//! - Triangle, strengths 3 and 4: the six-point rule of D. A. Dunavant, *High degree efficient
//!   symmetrical Gaussian quadrature rules for the triangle*, IJNME 21 (1985).
//! - Triangle, strength 5: J. Radon, *Zur mechanischen Kubatur*, Monatsh. Math. 52 (1948), as
//!   tabulated in A. H. Stroud, *Approximate Calculation of Multiple Integrals* (1971), T2:5-1.
//! - Tetrahedron, strength 2: the four-point rule of P. Keast, *Moderate-degree tetrahedral
//!   quadrature formulas*, CMAME 55 (1986).
//! - Everything else: Stroud's conical product rules (1971, section 2.4), built here from
//!   Gauss–Legendre points on `[0, 1]` and the Duffy collapse of the unit square or cube.
use super::univariate::{gauss_legendre_01, num_points_for_degree};

/// Flattened `(weights, points)` pair, `points` holding `dim` coordinates per point.
pub type FlatRule = (Vec<f64>, Vec<f64>);

pub fn triangle_rule(strength: usize) -> FlatRule {
    let mut rule = (Vec::new(), Vec::new());
    match strength {
        0 | 1 => push_triangle_point(&mut rule, 0.5, [1.0 / 3.0, 1.0 / 3.0]),
        2 => push_triangle_orbit(&mut rule, 1.0 / 6.0, 1.0 / 6.0),
        3 | 4 => {
            // Dunavant, degree 4
            push_triangle_orbit(&mut rule, 0.445948490915965, 0.5 * 0.223381589678011);
            push_triangle_orbit(&mut rule, 0.091576213509771, 0.5 * 0.109951743655322);
        }
        5 => {
            // Radon's 7-point rule
            let sqrt15 = 15.0_f64.sqrt();
            push_triangle_point(&mut rule, 0.5 * 0.225, [1.0 / 3.0, 1.0 / 3.0]);
            push_triangle_orbit(&mut rule, (6.0 + sqrt15) / 21.0, 0.5 * (155.0 + sqrt15) / 1200.0);
            push_triangle_orbit(&mut rule, (6.0 - sqrt15) / 21.0, 0.5 * (155.0 - sqrt15) / 1200.0);
        }
        _ => return collapsed_triangle_rule(strength),
    }
    rule
}

pub fn tetrahedron_rule(strength: usize) -> FlatRule {
    let mut rule = (Vec::new(), Vec::new());
    match strength {
        0 | 1 => push_point(&mut rule, 1.0 / 6.0, &[0.25, 0.25, 0.25]),
        2 => {
            let sqrt5 = 5.0_f64.sqrt();
            let a = (5.0 - sqrt5) / 20.0;
            let b = (5.0 + 3.0 * sqrt5) / 20.0;
            for point in [[a, a, a], [b, a, a], [a, b, a], [a, a, b]] {
                push_point(&mut rule, 1.0 / 24.0, &point);
            }
        }
        _ => return collapsed_tetrahedron_rule(strength),
    }
    rule
}

fn push_point((weights, points): &mut FlatRule, weight: f64, point: &[f64]) {
    weights.push(weight);
    points.extend_from_slice(point);
}

fn push_triangle_point(rule: &mut FlatRule, weight: f64, point: [f64; 2]) {
    push_point(rule, weight, &point);
}

/// The three points `(a, a), (1 - 2a, a), (a, 1 - 2a)` with equal weight.
fn push_triangle_orbit(rule: &mut FlatRule, a: f64, weight: f64) {
    let b = 1.0 - 2.0 * a;
    push_triangle_point(rule, weight, [a, a]);
    push_triangle_point(rule, weight, [b, a]);
    push_triangle_point(rule, weight, [a, b]);
}

/// Maps `[0,1]^2` onto the triangle through `x = u, y = v (1 - u)`.
///
/// A polynomial of total degree `p` becomes degree `p + 1` in `u` (including the Jacobian `1 - u`)
/// and degree `p` in `v`.
fn collapsed_triangle_rule(strength: usize) -> FlatRule {
    let (wu, u) = gauss_legendre_01(num_points_for_degree(strength + 1));
    let (wv, v) = gauss_legendre_01(num_points_for_degree(strength));
    let mut rule = (Vec::new(), Vec::new());
    for (wu, u) in wu.iter().zip(&u) {
        for (wv, v) in wv.iter().zip(&v) {
            push_point(&mut rule, wu * wv * (1.0 - u), &[*u, v * (1.0 - u)]);
        }
    }
    rule
}

/// Maps `[0,1]^3` onto the tetrahedron through `x = u, y = v (1 - u), z = w (1 - u) (1 - v)`
/// with Jacobian `(1 - u)^2 (1 - v)`.
fn collapsed_tetrahedron_rule(strength: usize) -> FlatRule {
    let (wu, u) = gauss_legendre_01(num_points_for_degree(strength + 2));
    let (wv, v) = gauss_legendre_01(num_points_for_degree(strength + 1));
    let (ww, w) = gauss_legendre_01(num_points_for_degree(strength));
    let mut rule = (Vec::new(), Vec::new());
    for (wu, u) in wu.iter().zip(&u) {
        for (wv, v) in wv.iter().zip(&v) {
            for (ww, w) in ww.iter().zip(&w) {
                let weight = wu * wv * ww * (1.0 - u).powi(2) * (1.0 - v);
                push_point(&mut rule, weight, &[*u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)]);
            }
        }
    }
    rule
}

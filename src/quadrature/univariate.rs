//! Gauss–Legendre rules on the reference interval `[0, 1]`.
use std::f64::consts::PI;

/// Values of the Legendre polynomials `P_n` and `P_{n-1}` at `x`.
#[derive(Debug)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    p1: f64,
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }
        Self { n, x, p1, p2 }
    }

    /// Only valid in the open interval (-1, 1).
    fn derivative(&self) -> f64 {
        let n = self.n as f64;
        n * (self.x * self.p1 - self.p2) / (self.x * self.x - 1.0)
    }
}

const MAX_NEWTON_ITERATIONS: usize = 100;

/// Gauss–Legendre rule with `num_points` points on `[0, 1]`, returned as `(weights, points)`.
///
/// Integrates polynomials of degree up to `2 num_points - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_legendre_01(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let m = (n + 1) / 2;
    let mut roots = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // Newton iteration from the classical asymptotic guess; the remaining roots follow by symmetry
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut recurrence = LegendreRecurrence::evaluate(n, x);
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let dx = -recurrence.p1 / recurrence.derivative();
            x += dx;
            recurrence = LegendreRecurrence::evaluate(n, x);
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let dp = recurrence.derivative();
        roots.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in m..n {
        let mirror_idx = n - i - 1;
        roots.push(-roots[mirror_idx]);
        weights.push(weights[mirror_idx]);
    }

    // [-1, 1] -> [0, 1]
    let points = roots.iter().map(|x| 0.5 * (x + 1.0)).collect();
    let weights = weights.iter().map(|w| 0.5 * w).collect();
    (weights, points)
}

/// Number of Gauss points required to integrate univariate polynomials of the given degree.
pub fn num_points_for_degree(degree: usize) -> usize {
    degree / 2 + 1
}

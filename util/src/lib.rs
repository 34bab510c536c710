//! Assertion macros shared by the workspace test suites.

/// Approximate equality of two `nalgebra` matrices (or vectors) in the max norm.
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Approximate equality of two scalars.
#[macro_export]
macro_rules! assert_approx_scalar_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: f64 = $x;
        let y: f64 = $y;
        let absdiff = (x - y).abs();
        if !(absdiff <= $tol) {
            panic!(
                "assert_approx_scalar_eq!({}, {}) failed: |{} - {}| = {:e} > {:e}",
                stringify!($x),
                stringify!($y),
                x,
                y,
                absdiff,
                $tol
            );
        }
    }};
}

//! Solves `-u'' = 1` on the unit interval with `u(0) = u(1) = 0` and compares the
//! result with the exact solution `x (1 - x) / 2`.
use meshfem::assembly::local::ConstantCoefficients;
use meshfem::constraints::DirichletCondition;
use meshfem::mesh::procedural::{create_unit_interval_mesh, LEFT, RIGHT};
use meshfem::problem::{ProblemConfig, StationaryProblem};

fn main() -> eyre::Result<()> {
    let u_exact = |x: &[f64]| x[0] * (1.0 - x[0]) / 2.0;

    for order in [1, 2] {
        for num_cells in [4, 8, 16, 32] {
            let mesh = create_unit_interval_mesh(num_cells);
            let prepared = StationaryProblem::new(&mesh)
                .with_config(ProblemConfig::default().with_order(order))
                .with_dirichlet(DirichletCondition::on_nodes(LEFT, 0.0))
                .with_dirichlet(DirichletCondition::on_nodes(RIGHT, 0.0))
                .prepare()?;
            let solution = prepared.solve(&ConstantCoefficients::new(1.0, 1.0))?;

            let expected = prepared.dof_map().interpolate(&mesh, u_exact);
            let max_error = solution
                .as_slice()
                .iter()
                .zip(&expected)
                .map(|(u, u_exact)| (u - u_exact).abs())
                .fold(0.0, f64::max);
            println!(
                "P{} with {:>3} cells: {:>4} DOFs, max nodal error {:.3e}",
                order,
                num_cells,
                solution.len(),
                max_error
            );
        }
    }

    Ok(())
}

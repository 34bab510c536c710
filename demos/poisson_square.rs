//! Heat conduction in the unit square, hot on the left side and cold on the right.
//!
//! Usage: `poisson_square [config.json] [mesh.msh]`. Without a mesh file, a structured mesh is
//! generated; a Gmsh mesh must use the physical tags 1 (left side) and 2 (right side).
use eyre::WrapErr;
use meshfem::assembly::local::ConstantCoefficients;
use meshfem::constraints::DirichletCondition;
use meshfem::element::ElementShape;
use meshfem::io::msh::load_msh_from_file;
use meshfem::mesh::procedural::{create_unit_square_uniform_tri_mesh_2d, LEFT, RIGHT};
use meshfem::problem::{ProblemConfig, StationaryProblem};
use std::env;
use std::fs;

fn main() -> eyre::Result<()> {
    let mut args = env::args().skip(1);
    let config: ProblemConfig = match args.next() {
        Some(path) => {
            let json = fs::read_to_string(&path).wrap_err_with(|| format!("failed to read config {}", path))?;
            serde_json::from_str(&json).wrap_err("invalid problem configuration")?
        }
        None => ProblemConfig::default(),
    };
    let mesh = match args.next() {
        Some(path) => load_msh_from_file(&path, ElementShape::Triangle)?,
        None => create_unit_square_uniform_tri_mesh_2d(32),
    };
    println!(
        "Mesh with {} vertices and {} triangles, configuration {:?}",
        mesh.num_vertices(),
        mesh.num_elements(),
        config
    );

    let prepared = StationaryProblem::new(&mesh)
        .with_config(config)
        .with_dirichlet(DirichletCondition::on_facets(LEFT, 1.0))
        .with_dirichlet(DirichletCondition::on_facets(RIGHT, 0.0))
        .prepare()?;
    let coefficients = ConstantCoefficients::new(0.5, 0.0);
    let solution = prepared.solve(&coefficients)?;
    println!(
        "Solved for {} DOFs ({} constrained), {} iterations, relative residual {:.3e}",
        solution.len(),
        prepared.constraints().len(),
        solution.statistics().iterations,
        solution.statistics().residual
    );

    let fluxes = prepared
        .field_reconstructor()
        .fluxes(solution.as_slice(), &coefficients)
        .collect_matrix()?;
    let mean_flux = fluxes.column_mean();
    println!("Mean heat flux: ({:.4}, {:.4})", mean_flux[0], mean_flux[1]);

    Ok(())
}

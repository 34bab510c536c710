use meshfem::assembly::global::AssemblyConfig;
use meshfem::assembly::local::ConstantCoefficients;
use meshfem::constraints::{BoundaryValue, DirichletCondition};
use meshfem::element::ElementShape;
use meshfem::io::msh::load_msh_from_bytes;
use meshfem::mesh::procedural::{
    create_unit_cube_uniform_tet_mesh_3d, create_unit_interval_mesh, create_unit_square_uniform_tri_mesh_2d, BACK,
    BOTTOM, FRONT, LEFT, RIGHT, TOP,
};
use meshfem::mesh::Mesh;
use meshfem::problem::{ProblemConfig, StationaryProblem};
use meshfem::solver::ConjugateGradientSolver;
use meshfem::Error;
use util::assert_approx_matrix_eq;

/// Maximum nodal error of the solution of a problem against `u_exact`.
fn max_nodal_error(
    mesh: &Mesh,
    config: ProblemConfig,
    conditions: Vec<DirichletCondition>,
    coefficients: &ConstantCoefficients,
    u_exact: impl Fn(&[f64]) -> f64,
) -> f64 {
    let problem = conditions
        .into_iter()
        .fold(StationaryProblem::new(mesh).with_config(config), |problem, condition| {
            problem.with_dirichlet(condition)
        });
    let prepared = problem.prepare().unwrap();
    let solution = prepared.solve(coefficients).unwrap();
    let expected = prepared.dof_map().interpolate(mesh, u_exact);
    solution
        .as_slice()
        .iter()
        .zip(&expected)
        .map(|(u, u_exact)| (u - u_exact).abs())
        .fold(0.0, f64::max)
}

fn all_sides(dim: usize, value: BoundaryValue) -> Vec<DirichletCondition> {
    [LEFT, RIGHT, BOTTOM, TOP, FRONT, BACK][..2 * dim]
        .iter()
        .map(|&tag| DirichletCondition::on_facets(tag, value.clone()))
        .collect()
}

#[test]
fn interval_ramp_is_reproduced_at_nodes() {
    let mesh = create_unit_interval_mesh(10);
    for order in [1, 2] {
        let conditions = vec![
            DirichletCondition::on_nodes(LEFT, 0.0),
            DirichletCondition::on_nodes(RIGHT, 1.0),
        ];
        let error = max_nodal_error(
            &mesh,
            ProblemConfig::default().with_order(order),
            conditions,
            &ConstantCoefficients::new(1.0, 0.0),
            |x| x[0],
        );
        assert!(error <= 1e-10, "order {}: nodal error {:e}", order, error);
    }
}

#[test]
fn interval_constant_load_matches_parabola_at_nodes() {
    let mesh = create_unit_interval_mesh(16);
    for order in [1, 2] {
        let error = max_nodal_error(
            &mesh,
            ProblemConfig::default().with_order(order),
            all_sides(1, 0.0.into()),
            &ConstantCoefficients::new(1.0, 1.0),
            |x| x[0] * (1.0 - x[0]) / 2.0,
        );
        assert!(error <= 1e-12, "order {}: nodal error {:e}", order, error);
    }
}

#[test]
fn reaction_with_matching_source_gives_constant_solution() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(6);
    let error = max_nodal_error(
        &mesh,
        ProblemConfig::default(),
        all_sides(2, 3.0.into()),
        &ConstantCoefficients::new(1.0, 6.0).with_reaction(2.0),
        |_| 3.0,
    );
    assert!(error <= 1e-12, "nodal error {:e}", error);
}

#[test]
fn quadratic_manufactured_solution_in_2d() {
    // u = x² + y² satisfies -Δu = -4
    let u_exact = |x: &[f64]| x[0] * x[0] + x[1] * x[1];
    let coefficients = ConstantCoefficients::new(1.0, -4.0);
    let boundary = || all_sides(2, BoundaryValue::function(u_exact));

    // Quadratic elements reproduce the solution exactly
    let mesh = create_unit_square_uniform_tri_mesh_2d(4);
    let error = max_nodal_error(
        &mesh,
        ProblemConfig::default().with_order(2),
        boundary(),
        &coefficients,
        u_exact,
    );
    assert!(error <= 1e-10, "P2 nodal error {:e}", error);

    // Linear elements converge at second order
    let errors: Vec<f64> = [8, 16]
        .into_iter()
        .map(|n| {
            let mesh = create_unit_square_uniform_tri_mesh_2d(n);
            max_nodal_error(&mesh, ProblemConfig::default(), boundary(), &coefficients, u_exact)
        })
        .collect();
    assert!(errors[1] < errors[0] / 3.0, "P1 errors {:?}", errors);
}

#[test]
fn quadratic_manufactured_solution_in_3d() {
    // u = x² + y² + z² satisfies -Δu = -6
    let u_exact = |x: &[f64]| x.iter().map(|x_k| x_k * x_k).sum::<f64>();
    let mesh = create_unit_cube_uniform_tet_mesh_3d(2);
    let error = max_nodal_error(
        &mesh,
        ProblemConfig::default().with_order(2),
        all_sides(3, BoundaryValue::function(u_exact)),
        &ConstantCoefficients::new(1.0, -6.0),
        u_exact,
    );
    assert!(error <= 1e-10, "P2 nodal error {:e}", error);

    let u_linear = |x: &[f64]| x[0] + 2.0 * x[1] - x[2];
    let mesh = create_unit_cube_uniform_tet_mesh_3d(3);
    let error = max_nodal_error(
        &mesh,
        ProblemConfig::default(),
        all_sides(3, BoundaryValue::function(u_linear)),
        &ConstantCoefficients::new(2.0, 0.0),
        u_linear,
    );
    assert!(error <= 1e-10, "P1 nodal error {:e}", error);
}

#[test]
fn parallel_cg_matches_serial_direct() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(10);
    let coefficients = ConstantCoefficients::new(1.5, 1.0).with_reaction(0.5);
    let solve = |config: ProblemConfig| {
        StationaryProblem::new(&mesh)
            .with_config(config)
            .with_dirichlet(DirichletCondition::on_facets(LEFT, 1.0))
            .with_dirichlet(DirichletCondition::on_facets(RIGHT, 0.0))
            .solve(&coefficients)
            .unwrap()
    };

    let direct = solve(ProblemConfig::default().with_order(2));
    let cg = solve(
        ProblemConfig::default()
            .with_order(2)
            .with_assembly(AssemblyConfig::parallel().with_chunk_size(16))
            .with_solver(ConjugateGradientSolver::default().with_relative_tolerance(1e-12)),
    );
    assert_approx_matrix_eq!(direct.values(), cg.values(), abstol = 1e-9);
}

#[test]
fn conflicting_conditions_abort_preparation() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(2);
    let result = StationaryProblem::new(&mesh)
        .with_dirichlet(DirichletCondition::on_facets(LEFT, 0.0))
        .with_dirichlet(DirichletCondition::on_facets(TOP, 1.0))
        .solve(&ConstantCoefficients::new(1.0, 0.0));
    assert!(matches!(result, Err(Error::ConflictingConstraint { .. })));

    // Resolving the corner by priority makes the problem solvable
    let solution = StationaryProblem::new(&mesh)
        .with_dirichlet(DirichletCondition::on_facets(LEFT, 0.0).with_priority(1))
        .with_dirichlet(DirichletCondition::on_facets(TOP, 1.0).with_priority(2))
        .solve(&ConstantCoefficients::new(1.0, 0.0))
        .unwrap();
    // The top-left corner is vertex (0, 2) of the 3 x 3 vertex grid
    assert_eq!(solution.value(6), 1.0);
    assert_eq!(solution.value(0), 0.0);
}

#[test]
fn problem_without_dirichlet_conditions_is_singular() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(4);
    for source in [1.0, 0.0] {
        let coefficients = ConstantCoefficients::new(1.0, source);
        let direct = StationaryProblem::new(&mesh).solve(&coefficients);
        assert!(matches!(direct, Err(Error::SingularSystem { .. })), "{:?}", direct);

        let cg = StationaryProblem::new(&mesh)
            .with_config(ProblemConfig::default().with_solver(ConjugateGradientSolver::default()))
            .solve(&coefficients);
        assert!(matches!(cg, Err(Error::SingularSystem { .. })), "{:?}", cg);
    }
}

#[test]
fn msh_mesh_can_be_solved() {
    let msh = "\
$MeshFormat
4.1 0 8
$EndMeshFormat
$Entities
2 1 0 0
1 0 0 0 1 1
2 1 0 0 1 2
1 0 0 0 1 0 0 1 10 2 1 -2
$EndEntities
$Nodes
1 3 1 3
1 1 0 3
1
2
3
0 0 0
1 0 0
0.5 0 0
$EndNodes
$Elements
3 4 1 4
0 1 15 1
1 1
0 2 15 1
2 2
1 1 1 2
3 1 3
4 3 2
$EndElements
";
    let mesh = load_msh_from_bytes(msh.as_bytes(), ElementShape::Segment).unwrap();
    let solution = StationaryProblem::new(&mesh)
        .with_dirichlet(DirichletCondition::on_nodes(1, 2.0))
        .with_dirichlet(DirichletCondition::on_nodes(2, 4.0))
        .solve(&ConstantCoefficients::new(1.0, 0.0))
        .unwrap();
    assert!((solution.value(2) - 3.0).abs() <= 1e-12);
}

use std::path::Path;
use std::process::ExitCode;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nlfem_solver::config::from_json_file;
use nlfem_solver::{
    BarConfig, BarMesh, FemMesh, IncrementConfig, LinearSolverConfig, NonlinearOptions,
    SolveSummary, SolverError, StaticSolver, StepSnapshot, make_linear_solver,
};

/// A bar model with its solver settings and increment stages.
///
/// The first stage configures the solver, later stages are run as
/// continuations of the converged state.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProblemFile {
    mesh: BarConfig,
    #[serde(default)]
    nonlinear: NonlinearOptions,
    #[serde(default)]
    linear_solver: LinearSolverConfig,
    increments: Vec<IncrementConfig>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    stages: Vec<SolveSummary>,
    snapshots: &'a [StepSnapshot],
}

fn usage() {
    eprintln!("usage:");
    eprintln!("  nlfem-solver solve <problem.json>");
    eprintln!("  nlfem-solver check <problem.json>");
}

fn load_problem(path: &Path) -> nlfem_solver::Result<ProblemFile> {
    let problem: ProblemFile = from_json_file(path)?;
    if problem.increments.is_empty() {
        return Err(SolverError::Config(
            "problem file lists no increment stages".into(),
        ));
    }
    Ok(problem)
}

/// Validate a problem without assembling anything
fn check_file(path: &Path) -> nlfem_solver::Result<()> {
    let problem = load_problem(path)?;
    let mesh = BarMesh::from_config(&problem.mesh)?;

    let mut previous_target = 0.0;
    for (stage, increments) in problem.increments.iter().enumerate() {
        increments
            .validate()
            .map_err(|msg| SolverError::Config(format!("stage {stage}: {msg}")))?;
        if increments.final_factor < previous_target {
            return Err(SolverError::Config(format!(
                "stage {stage}: target {} is behind the previous stage target {previous_target}",
                increments.final_factor
            )));
        }
        previous_target = increments.final_factor;
    }

    println!("nodes: {}", mesh.active_dofs());
    println!("regions: {}", mesh.meshes().len());
    println!("dirichlet_groups: {}", mesh.dirichlet_boundaries().len());
    println!("stages: {}", problem.increments.len());
    Ok(())
}

fn solve_file(path: &Path) -> nlfem_solver::Result<()> {
    let problem = load_problem(path)?;
    let mut mesh = BarMesh::from_config(&problem.mesh)?;
    let mut stages = problem.increments.into_iter();
    let first = stages
        .next()
        .ok_or_else(|| SolverError::Config("problem file lists no increment stages".into()))?;

    let mut summaries = Vec::new();
    {
        let mut solver = StaticSolver::new(
            &mut mesh,
            problem.nonlinear,
            first,
            make_linear_solver(&problem.linear_solver),
        )?;
        summaries.push(solver.solve()?);

        for (stage, increments) in stages.enumerate() {
            info!(stage = stage + 1, target = increments.final_factor, "continuation");
            solver.continuation(increments)?;
            summaries.push(solver.solve()?);
        }
    }

    let report = Report {
        stages: summaries,
        snapshots: mesh.snapshots(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("solve") if args.len() == 3 => match solve_file(Path::new(&args[2])) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("solve_error: {err}");
                ExitCode::from(1)
            }
        },
        Some("check") if args.len() == 3 => match check_file(Path::new(&args[2])) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("check_error: {err}");
                ExitCode::from(1)
            }
        },
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}

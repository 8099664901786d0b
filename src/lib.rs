pub mod config;
pub mod models;
pub mod parse;
pub mod problem;
pub mod report;
pub mod solution;
pub mod solvers;

use std::path::Path;

use derive_more::{Display, From};
use log::{info, warn};

pub use config::Config;
use models::rebalancing::{ModelError, RebalancingError, RebalancingModel};
use parse::InputPaths;
use problem::{DataInconsistencyError, Problem};
use solution::Outcome;
use solvers::{MilpSolver, SolveStatus, SolverError};

#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "invalid input: {}", _0)]
    Data(DataInconsistencyError),
    #[display(fmt = "invalid model: {}", _0)]
    Model(ModelError),
    #[display(fmt = "{}", _0)]
    Solver(SolverError),
    #[display(fmt = "I/O error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "CSV error: {}", _0)]
    Csv(csv::Error),
    #[display(fmt = "JSON error: {}", _0)]
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

impl From<RebalancingError> for Error {
    fn from(err: RebalancingError) -> Self {
        match err {
            RebalancingError::Model(e) => Error::Model(e),
            RebalancingError::Solver(e) => Error::Solver(e),
            RebalancingError::Io(e) => Error::Io(e),
        }
    }
}

/// Builds and solves the rebalancing model for `problem`, and interprets the result.
///
/// Infeasibility is not an error: it is returned as [`Outcome::Unsolved`]. When `model_path` is
/// given, the model is written there in LP format before solving.
pub fn optimize(
    problem: &Problem,
    solver: &dyn MilpSolver,
    model_path: Option<&Path>,
) -> Result<Outcome, Error> {
    let limits = problem.config().limits();
    let result = RebalancingModel::solve(problem, solver, &limits, model_path)?;
    let outcome = Outcome::new(problem, &result);

    match &outcome {
        Outcome::Solved(plan) => {
            if let SolveStatus::BestEffort { gap } = plan.status() {
                warn!("the plan is not proven optimal (gap: {:?})", gap);
            }
            for violation in plan.check(problem) {
                warn!("solution violates the model: {}", violation);
            }
        }
        Outcome::Unsolved { status, .. } => info!("no plan available: {}", status),
    }

    Ok(outcome)
}

/// Reads the inputs at `paths`, then builds, solves and interprets a single planning run.
pub fn run(
    paths: &InputPaths,
    config: Config,
    solver: &dyn MilpSolver,
    model_path: Option<&Path>,
) -> Result<(Problem, Outcome), Error> {
    let inputs = parse::read_inputs(paths)?;
    let problem = Problem::new(inputs, config)?;
    info!(
        "Planning {} outlets over {} periods",
        problem.outlet_count(),
        problem.timesteps()
    );
    let outcome = optimize(&problem, solver, model_path)?;
    Ok((problem, outcome))
}

//! The boundary to the mixed-integer solving oracle.
//!
//! A [`MilpSolver`] receives a fully built [`Model`] and reports back one of the statuses in
//! [`SolveStatus`]. Infeasibility is a status, not an error: [`SolverError`] is reserved for the
//! backend itself failing.

#[cfg(feature = "gurobi")]
pub mod gurobi;
pub mod microlp;

use std::{ops::Index, str::FromStr, time::Duration};

use derive_more::Display;
use serde::Serialize;

use crate::models::milp::{Model, Var};

/// Optional limits on a single solve
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveLimits {
    /// Wall-clock limit
    pub time_limit: Option<Duration>,
    /// Relative optimality gap at which the search may stop
    pub mip_gap: Option<f64>,
}

impl SolveLimits {
    pub fn is_unlimited(&self) -> bool {
        self.time_limit.is_none() && self.mip_gap.is_none()
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Serialize)]
pub enum SolveStatus {
    /// Proven optimal
    #[display(fmt = "optimal")]
    Optimal,
    /// A limit was hit; the incumbent is feasible but not proven optimal
    #[display(fmt = "best found, not proven optimal")]
    BestEffort { gap: Option<f64> },
    /// The model has no feasible solution
    #[display(fmt = "infeasible")]
    Infeasible,
    /// No solution is available, e.g. a limit was hit before any incumbent was found
    #[display(fmt = "no solution")]
    NoSolution,
}

/// Gaps at or below this count as proven optimal
pub const PROVEN_GAP: f64 = 1e-9;

impl SolveStatus {
    /// Status of a search the backend reports as finished. A backend told to stop at a
    /// relative gap may call that optimal, but only a closed gap is proven.
    pub fn finished_with_gap(gap: f64) -> SolveStatus {
        if gap > PROVEN_GAP {
            SolveStatus::BestEffort { gap: Some(gap) }
        } else {
            SolveStatus::Optimal
        }
    }

    /// Whether the status comes with a variable assignment
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::BestEffort { .. })
    }
}

/// Values of every variable in a model, indexed by variable
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    values: Vec<f64>,
}

impl Assignment {
    pub fn new(values: Vec<f64>) -> Assignment {
        Assignment { values }
    }

    pub fn value(&self, var: Var) -> f64 {
        self.values[var.index()]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Index<Var> for Assignment {
    type Output = f64;

    fn index(&self, var: Var) -> &Self::Output {
        &self.values[var.index()]
    }
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Present exactly when `status.has_solution()`
    pub assignment: Option<Assignment>,
    pub objective: Option<f64>,
    pub runtime: Duration,
}

impl SolveOutcome {
    pub fn without_solution(status: SolveStatus, runtime: Duration) -> SolveOutcome {
        SolveOutcome {
            status,
            assignment: None,
            objective: None,
            runtime,
        }
    }
}

#[derive(Debug, Display)]
pub enum SolverError {
    #[display(fmt = "{} failed: {}", solver, message)]
    Backend {
        solver: &'static str,
        message: String,
    },
    #[display(
        fmt = "{} returned {} values for a model with {} variables",
        solver,
        actual,
        expected
    )]
    IncompleteAssignment {
        solver: &'static str,
        expected: usize,
        actual: usize,
    },
    #[cfg(feature = "gurobi")]
    #[display(fmt = "gurobi error: {}", _0)]
    Gurobi(grb::Error),
}

impl std::error::Error for SolverError {}

#[cfg(feature = "gurobi")]
impl From<grb::Error> for SolverError {
    fn from(err: grb::Error) -> Self {
        SolverError::Gurobi(err)
    }
}

/// A mixed-integer linear solving oracle.
pub trait MilpSolver {
    /// A short name for logging
    fn name(&self) -> &'static str;

    /// Solves `model` to optimality, or until one of `limits` is hit.
    fn solve(&self, model: &Model, limits: &SolveLimits) -> Result<SolveOutcome, SolverError>;
}

/// The backends available in this build
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    #[display(fmt = "microlp")]
    MicroLp,
    #[cfg(feature = "gurobi")]
    #[display(fmt = "gurobi")]
    Gurobi,
}

impl Backend {
    pub fn solver(&self) -> Box<dyn MilpSolver> {
        match self {
            Backend::MicroLp => Box::new(microlp::MicroLp),
            #[cfg(feature = "gurobi")]
            Backend::Gurobi => Box::new(gurobi::Gurobi::default()),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::MicroLp
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "microlp" => Ok(Backend::MicroLp),
            #[cfg(feature = "gurobi")]
            "gurobi" => Ok(Backend::Gurobi),
            other => Err(format!("unknown or disabled solver backend: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_solved_statuses_carry_solutions() {
        assert!(SolveStatus::Optimal.has_solution());
        assert!(SolveStatus::BestEffort { gap: Some(0.1) }.has_solution());
        assert!(!SolveStatus::Infeasible.has_solution());
        assert!(!SolveStatus::NoSolution.has_solution());
        assert_ne!(SolveStatus::Optimal, SolveStatus::BestEffort { gap: None });
    }

    #[test]
    fn open_gap_is_not_proven_optimal() {
        assert_eq!(SolveStatus::finished_with_gap(0.0), SolveStatus::Optimal);
        assert_eq!(SolveStatus::finished_with_gap(1e-12), SolveStatus::Optimal);
        assert_eq!(
            SolveStatus::finished_with_gap(0.04),
            SolveStatus::BestEffort { gap: Some(0.04) }
        );
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("MicroLP".parse::<Backend>(), Ok(Backend::MicroLp));
        assert!("cplex".parse::<Backend>().is_err());
    }
}

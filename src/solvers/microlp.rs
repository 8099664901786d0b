use std::time::Instant;

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use log::{debug, info, warn};

use super::{Assignment, MilpSolver, SolveLimits, SolveOutcome, SolveStatus, SolverError};
use crate::models::milp::{LinExpr, Model, Sense, VarType};

/// Pure Rust branch and bound through `good_lp`'s `microlp` backend.
///
/// Has no notion of time limits or gaps: every solve runs to proven optimality.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLp;

fn expression(expr: &LinExpr, vars: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.offset());
    for (var, coeff) in expr.terms() {
        out += coeff * vars[var.index()];
    }
    out
}

impl MilpSolver for MicroLp {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &Model, limits: &SolveLimits) -> Result<SolveOutcome, SolverError> {
        if !limits.is_unlimited() {
            warn!("microlp does not support solve limits, ignoring {:?}", limits);
        }

        info!(
            "Solving {} with microlp: {} variables, {} constraints",
            model.name(),
            model.vars().len(),
            model.constrs().len()
        );
        let start = Instant::now();

        let mut problem_vars = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .vars()
            .iter()
            .map(|v| {
                let mut def = variable().name(v.name.clone());
                def = match v.vtype {
                    VarType::Binary => def.binary(),
                    VarType::Integer => def.integer(),
                    VarType::Continuous => def,
                };
                if v.lb.is_finite() {
                    def = def.min(v.lb);
                }
                if v.ub.is_finite() {
                    def = def.max(v.ub);
                }
                problem_vars.add(def)
            })
            .collect();

        let mut problem = problem_vars
            .minimise(expression(model.objective(), &vars))
            .using(microlp);

        for c in model.constrs() {
            let lhs = expression(&c.constraint.lhs, &vars);
            let rhs = c.constraint.rhs;
            problem = problem.with(match c.constraint.sense {
                Sense::Less => constraint::leq(lhs, rhs),
                Sense::Greater => constraint::geq(lhs, rhs),
                Sense::Equal => constraint::eq(lhs, rhs),
            });
        }

        let outcome = match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = vars.iter().map(|v| solution.value(*v)).collect();
                let objective = model.objective().eval(&values);
                SolveOutcome {
                    status: SolveStatus::Optimal,
                    assignment: Some(Assignment::new(values)),
                    objective: Some(objective),
                    runtime: start.elapsed(),
                }
            }
            Err(ResolutionError::Infeasible) => {
                SolveOutcome::without_solution(SolveStatus::Infeasible, start.elapsed())
            }
            Err(ResolutionError::Unbounded) => {
                SolveOutcome::without_solution(SolveStatus::NoSolution, start.elapsed())
            }
            Err(err) => {
                return Err(SolverError::Backend {
                    solver: self.name(),
                    message: err.to_string(),
                })
            }
        };

        debug!(
            "microlp finished after {:.3}s with status {}",
            outcome.runtime.as_secs_f64(),
            outcome.status
        );
        Ok(outcome)
    }
}

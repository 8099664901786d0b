use std::time::Duration;

use grb::{
    attr, c, expr::LinExpr as GrbLinExpr, param, Constr, Model as GrbModel, ModelSense, Status,
    Var, VarType as GrbVarType,
};
use log::{debug, info, warn};

use super::{Assignment, MilpSolver, SolveLimits, SolveOutcome, SolveStatus, SolverError};
use crate::models::milp::{LinExpr, Model, Sense, VarType};

/// Gurobi through the `grb` bindings.
#[derive(Debug, Clone, Default)]
pub struct Gurobi {
    /// Whether Gurobi may write its own log to the console
    pub output: bool,
    /// Thread limit, 0 lets Gurobi decide
    pub threads: i32,
}

fn expression(expr: &LinExpr, vars: &[Var]) -> GrbLinExpr {
    let mut out = GrbLinExpr::new();
    for (var, coeff) in expr.terms() {
        out.add_term(coeff, vars[var.index()]);
    }
    out.add_constant(expr.offset());
    out
}

impl Gurobi {
    fn build(
        &self,
        instance: &Model,
        limits: &SolveLimits,
    ) -> grb::Result<(GrbModel, Vec<Var>, Vec<Constr>)> {
        let mut model = GrbModel::new(instance.name())?;
        model.set_param(param::OutputFlag, self.output as i32)?;
        model.set_param(param::Threads, self.threads)?;
        if let Some(limit) = limits.time_limit {
            model.set_param(param::TimeLimit, limit.as_secs_f64())?;
        }
        if let Some(gap) = limits.mip_gap {
            model.set_param(param::MIPGap, gap)?;
        }

        let mut vars = Vec::with_capacity(instance.vars().len());
        for v in instance.vars() {
            let vtype = match v.vtype {
                VarType::Binary => GrbVarType::Binary,
                VarType::Integer => GrbVarType::Integer,
                VarType::Continuous => GrbVarType::Continuous,
            };
            vars.push(model.add_var(&v.name, vtype, 0.0, v.lb, v.ub, std::iter::empty())?);
        }
        model.update()?;

        let mut constrs = Vec::with_capacity(instance.constrs().len());
        for constr in instance.constrs() {
            let lhs = expression(&constr.constraint.lhs, &vars);
            let rhs = constr.constraint.rhs;
            let added = match constr.constraint.sense {
                Sense::Less => model.add_constr(&constr.name, c!(lhs <= rhs))?,
                Sense::Greater => model.add_constr(&constr.name, c!(lhs >= rhs))?,
                Sense::Equal => model.add_constr(&constr.name, c!(lhs == rhs))?,
            };
            constrs.push(added);
        }

        model.set_objective(expression(instance.objective(), &vars), ModelSense::Minimize)?;
        model.update()?;

        Ok((model, vars, constrs))
    }

    /// Computes an irreducible infeasible subsystem and logs the constraint families involved.
    fn log_iis(instance: &Model, model: &mut GrbModel, constrs: &[Constr]) -> grb::Result<()> {
        model.compute_iis()?;
        for (constr, data) in constrs.iter().zip(instance.constrs()) {
            if model.get_obj_attr(attr::IISConstr, constr)? != 0 {
                warn!("constraint {} ({}) is part of the IIS", data.name, data.tag);
            }
        }
        Ok(())
    }

    fn assignment(model: &GrbModel, vars: &[Var]) -> grb::Result<Assignment> {
        let values = vars
            .iter()
            .map(|v| model.get_obj_attr(attr::X, v))
            .collect::<grb::Result<Vec<f64>>>()?;
        Ok(Assignment::new(values))
    }
}

impl MilpSolver for Gurobi {
    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn solve(&self, instance: &Model, limits: &SolveLimits) -> Result<SolveOutcome, SolverError> {
        info!(
            "Solving {} with gurobi: {} variables, {} constraints",
            instance.name(),
            instance.vars().len(),
            instance.constrs().len()
        );

        let (mut model, vars, constrs) = self.build(instance, limits)?;
        model.optimize()?;

        let runtime = Duration::from_secs_f64(model.get_attr(attr::Runtime)?);
        let status = model.status()?;
        let solutions = model.get_attr(attr::SolCount)?;
        debug!("gurobi status {:?} with {} solutions", status, solutions);

        let outcome = match status {
            Status::Optimal => {
                // Gurobi calls a search optimal once it is within MIPGap, default 1e-4
                let status = model
                    .get_attr(attr::MIPGap)
                    .map(SolveStatus::finished_with_gap)
                    .unwrap_or(SolveStatus::Optimal);
                SolveOutcome {
                    status,
                    assignment: Some(Self::assignment(&model, &vars)?),
                    objective: Some(model.get_attr(attr::ObjVal)?),
                    runtime,
                }
            }
            Status::Infeasible | Status::InfOrUnbd => {
                if let Err(err) = Self::log_iis(instance, &mut model, &constrs) {
                    warn!("could not compute an IIS: {}", err);
                }
                SolveOutcome::without_solution(SolveStatus::Infeasible, runtime)
            }
            Status::TimeLimit
            | Status::SolutionLimit
            | Status::NodeLimit
            | Status::IterationLimit
            | Status::Interrupted
            | Status::SubOptimal
                if solutions > 0 =>
            {
                let gap = model.get_attr(attr::MIPGap).ok();
                warn!("gurobi stopped early ({:?}), gap {:?}", status, gap);
                SolveOutcome {
                    status: SolveStatus::BestEffort { gap },
                    assignment: Some(Self::assignment(&model, &vars)?),
                    objective: Some(model.get_attr(attr::ObjVal)?),
                    runtime,
                }
            }
            _ => SolveOutcome::without_solution(SolveStatus::NoSolution, runtime),
        };

        Ok(outcome)
    }
}

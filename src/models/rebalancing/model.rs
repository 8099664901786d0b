use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{info, trace};

use super::sets_and_parameters::{ModelError, Parameters, Sets};
use crate::models::milp::{ge, le, LinExpr, LinSum, Model, Var};
use crate::models::utils::{AddVars, ConvertVars};
use crate::problem::{Arc, Problem, Vertex};
use crate::solvers::{MilpSolver, SolveLimits, SolveStatus, SolverError};

/// Constraint families, used as tags so that the family of an offending constraint can be
/// identified on infeasibility.
pub mod tags {
    pub const IN_TRANSIT_LOWER: &str = "from_warehouse_t0_greater";
    pub const IN_TRANSIT_UPPER: &str = "from_warehouse_t0_smaller";
    pub const DEMAND: &str = "demand";
    pub const STOCK_LOWER: &str = "stock_greater";
    pub const STOCK_UPPER: &str = "stock_lesser";
    pub const MOQ: &str = "moq";
    pub const ARC_SELECTION: &str = "arc_selection";
}

pub struct Variables {
    /// quantity shipped on each arc
    pub w: HashMap<Arc, Var>,
    /// 1 if the arc carries flow, 0 otherwise
    pub y: HashMap<Arc, Var>,
    /// lost sales at each vertex
    pub l: HashMap<Vertex, Var>,
    /// stock carried from each vertex into the next period
    pub s: HashMap<Vertex, Var>,
}

pub struct RebalancingModel {}

#[allow(non_snake_case)]
impl RebalancingModel {
    /// builds the rebalancing model
    pub fn build(sets: &Sets, parameters: &Parameters) -> (Model, Variables) {
        info!(
            "Building rebalancing model for {} outlets over {} periods",
            sets.O.len(),
            sets.T.len()
        );

        let mut model = Model::new("rebalancing");

        let vars = Self::build_variables(&mut model, sets);
        let objective = Self::build_objective(sets, parameters, &vars);
        model.set_objective(objective);
        Self::build_constraints(&mut model, sets, parameters, &vars);

        info!(
            "Successfully built rebalancing model: {} variables, {} constraints",
            model.vars().len(),
            model.constrs().len()
        );
        (model, vars)
    }

    /// Creates a flow quantity and an arc selection indicator for every arc, and a lost sales and
    /// a stock quantity for every vertex.
    pub fn build_variables(model: &mut Model, sets: &Sets) -> Variables {
        // quantity transported on arc (t, i, j)
        let w = sets.A.integer(model, "arc_quantity");
        // 1 if arc (t, i, j) is used
        let y = sets.A.binary(model, "arc_select");
        // demand at (t, i) that is not served
        let l = sets.V.integer(model, "lost_sales");
        // stock left at (t, i) after serving demand
        let s = sets.V.integer(model, "stock");

        Variables { w, y, l, s }
    }

    /// transport + lost sales + holding. The arc selection indicators carry no weight.
    pub fn build_objective(sets: &Sets, parameters: &Parameters, vars: &Variables) -> LinExpr {
        let transport = sets
            .A
            .iter()
            .map(|a| parameters.C[a] * vars.w[a])
            .lin_sum();

        let lost_sales = sets
            .V
            .iter()
            .map(|v| parameters.U * vars.l[v])
            .lin_sum();

        let holding = sets
            .V
            .iter()
            .map(|v| parameters.K[v.time] * vars.s[v])
            .lin_sum();

        transport + lost_sales + holding
    }

    /// Stock available at a vertex before serving demand: carried stock (or starting stock in
    /// period 0) plus inbound minus outbound flow.
    fn available(sets: &Sets, parameters: &Parameters, vars: &Variables, v: &Vertex) -> LinExpr {
        let previous = match *v.time {
            0 => LinExpr::constant(parameters.S_0[v.node]),
            t => LinExpr::from(vars.s[&Vertex::new((t - 1).into(), v.node)]),
        };
        let inbound = sets.inbound(v).iter().map(|a| vars.w[a]).lin_sum();
        let outbound = sets.outbound(v).iter().map(|a| vars.w[a]).lin_sum();

        previous + inbound - outbound
    }

    pub fn build_constraints(
        model: &mut Model,
        sets: &Sets,
        parameters: &Parameters,
        vars: &Variables,
    ) {
        let w = &vars.w;
        let y = &vars.y;
        let l = &vars.l;
        let s = &vars.s;

        // the replenishment arriving in period 0 was ordered in an earlier cycle
        for a in sets.A_w.iter().filter(|a| *a.time == 0) {
            let R = parameters.R[a.to];
            model.add_constr(
                tags::IN_TRANSIT_LOWER,
                format!("{}_{}", tags::IN_TRANSIT_LOWER, a),
                ge(w[a], R),
            );
            model.add_constr(
                tags::IN_TRANSIT_UPPER,
                format!("{}_{}", tags::IN_TRANSIT_UPPER, a),
                le(w[a], R),
            );
        }

        for v in &sets.V {
            let available = Self::available(sets, parameters, vars, v);
            let D = parameters.D[v];
            trace!("balance at {}: {:?}", v, available);

            // demand is either served or lost
            model.add_constr(
                tags::DEMAND,
                format!("{}_{}", tags::DEMAND, v),
                ge(available.clone(), D - l[v]),
            );

            // whatever is left is carried into the next period
            let left = available - D + l[v];
            model.add_constr(
                tags::STOCK_LOWER,
                format!("{}_{}", tags::STOCK_LOWER, v),
                ge(s[v], left.clone()),
            );
            model.add_constr(
                tags::STOCK_UPPER,
                format!("{}_{}", tags::STOCK_UPPER, v),
                le(s[v], left),
            );
        }

        // nonzero shipments from the warehouse must be at least the MOQ, and a selected
        // warehouse arc carries at least one unit even when the MOQ is zero
        let least = parameters.Q.max(1.0);
        for a in &sets.A_w {
            model.add_constr(
                tags::MOQ,
                format!("{}_{}", tags::MOQ, a),
                ge(w[a], least * y[a]),
            );
        }

        // flow is only allowed on selected arcs
        for a in &sets.A {
            model.add_constr(
                tags::ARC_SELECTION,
                format!("{}_{}", tags::ARC_SELECTION, a),
                le(w[a], parameters.M * y[a]),
            );
        }
    }

    /// Builds and solves the model for `problem`, optionally writing it to `model_path` first.
    pub fn solve(
        problem: &Problem,
        solver: &dyn MilpSolver,
        limits: &SolveLimits,
        model_path: Option<&Path>,
    ) -> Result<RebalancingResult, RebalancingError> {
        let sets = Sets::new(problem);
        let parameters = Parameters::new(problem, &sets)?;
        let (model, vars) = Self::build(&sets, &parameters);

        if let Some(path) = model_path {
            model.write(path)?;
            info!("Wrote model to {}", path.display());
        }

        let outcome = solver.solve(&model, limits)?;
        info!(
            "{} finished with status: {} ({:.2}s)",
            solver.name(),
            outcome.status,
            outcome.runtime.as_secs_f64()
        );

        let values = match &outcome.assignment {
            Some(assignment) => {
                let expected = model.vars().len();
                if assignment.values().len() != expected {
                    return Err(SolverError::IncompleteAssignment {
                        solver: solver.name(),
                        expected,
                        actual: assignment.values().len(),
                    }
                    .into());
                }
                Some(Values {
                    w: vars.w.convert(assignment),
                    y: vars.y.convert(assignment),
                    l: vars.l.convert(assignment),
                    s: vars.s.convert(assignment),
                })
            }
            None => None,
        };

        let objective = outcome
            .objective
            .or_else(|| outcome.assignment.as_ref().map(|a| model.objective().eval(a.values())));

        Ok(RebalancingResult {
            status: outcome.status,
            objective,
            runtime: outcome.runtime,
            values,
            sets,
            parameters,
        })
    }
}

#[derive(Debug, derive_more::Display, derive_more::From)]
pub enum RebalancingError {
    #[display(fmt = "{}", _0)]
    Model(ModelError),
    #[display(fmt = "{}", _0)]
    Solver(SolverError),
    #[display(fmt = "failed to write model: {}", _0)]
    Io(std::io::Error),
}

impl std::error::Error for RebalancingError {}

/// Solved values of the model variables
#[derive(Debug, Clone)]
pub struct Values {
    pub w: HashMap<Arc, f64>,
    pub y: HashMap<Arc, f64>,
    pub l: HashMap<Vertex, f64>,
    pub s: HashMap<Vertex, f64>,
}

#[derive(Debug)]
pub struct RebalancingResult {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub runtime: Duration,
    /// Present exactly when the status carries a solution
    pub values: Option<Values>,
    pub sets: Sets,
    pub parameters: Parameters,
}

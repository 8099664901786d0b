use std::{collections::HashMap, time::Duration};

use derive_more::Display;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    models::rebalancing::model::{RebalancingResult, Values},
    models::rebalancing::sets_and_parameters::Parameters,
    problem::{Arc, Cost, NodeIndex, Problem, Quantity, TimeIndex, Vertex},
    solvers::SolveStatus,
};

/// Relative tolerance between the recomputed plan cost and the solver objective
const COST_TOLERANCE: f64 = 1e-6;

/// The solved flow on a single arc
#[derive(Debug, Clone, Serialize)]
pub struct ArcFlow {
    pub arc: Arc,
    /// Label of the origin
    pub from: String,
    /// Label of the destination
    pub to: String,
    /// Units shipped, rounded to the nearest whole unit
    pub quantity: i64,
    /// Whether the arc selection indicator is set
    pub used: bool,
    /// Cost per unit shipped
    pub unit_cost: Cost,
}

impl ArcFlow {
    pub fn cost(&self) -> Cost {
        self.quantity as f64 * self.unit_cost
    }
}

/// The solved state of an outlet at the end of a period
#[derive(Debug, Clone, Serialize)]
pub struct VertexState {
    pub vertex: Vertex,
    pub outlet: String,
    pub demand: Quantity,
    pub lost_sales: i64,
    /// Stock carried into the next period
    pub stock: i64,
    /// Cost per unit of stock carried out of this period
    pub holding_cost: Cost,
}

/// Cost incurred in a single period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodCost {
    pub transport: Cost,
    pub lost_sales: Cost,
    pub holding: Cost,
}

impl PeriodCost {
    pub fn total(&self) -> Cost {
        self.transport + self.lost_sales + self.holding
    }
}

/// An invariant that the solved plan does not satisfy
#[derive(Debug, Display, Clone, PartialEq, Serialize)]
pub enum Violation {
    #[display(
        fmt = "stock at {} is {} but the flow balance gives {}",
        vertex,
        stock,
        expected
    )]
    Conservation {
        vertex: Vertex,
        stock: i64,
        expected: i64,
    },
    #[display(fmt = "arc {} carries {} units but its selection is {}", arc, quantity, used)]
    Selection { arc: Arc, quantity: i64, used: bool },
    #[display(fmt = "arc {} carries {} units, below the MOQ of {}", arc, quantity, moq)]
    MinimumOrder { arc: Arc, quantity: i64, moq: i64 },
    #[display(fmt = "{} at {} is negative ({})", what, at, value)]
    Negative {
        what: &'static str,
        at: String,
        value: i64,
    },
    #[display(
        fmt = "arc {} carries {} units but {} are in transit",
        arc,
        quantity,
        expected
    )]
    InTransit {
        arc: Arc,
        quantity: i64,
        expected: i64,
    },
}

/// A solved plan: shipments, lost sales and carried stock for every period of the horizon,
/// together with its cost.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    status: SolveStatus,
    /// The objective value reported by the solver
    objective: f64,
    runtime: f64,
    moq: i64,
    /// Flow on every arc, in enumeration order
    flows: Vec<ArcFlow>,
    /// State of every outlet in every period, ordered by period, then outlet
    vertices: Vec<VertexState>,
    /// Cost per period
    periods: Vec<PeriodCost>,
    outlets: Vec<NodeIndex>,
}

/// The result of a single planning run
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The solver returned an assignment, proven optimal or not
    Solved(Plan),
    /// The solver returned no assignment
    Unsolved {
        status: SolveStatus,
        runtime: Duration,
    },
}

impl Outcome {
    pub fn new(problem: &Problem, result: &RebalancingResult) -> Outcome {
        match &result.values {
            Some(values) => Outcome::Solved(Plan::new(problem, result, values)),
            None => Outcome::Unsolved {
                status: result.status,
                runtime: result.runtime,
            },
        }
    }

    pub fn status(&self) -> SolveStatus {
        match self {
            Outcome::Solved(plan) => plan.status,
            Outcome::Unsolved { status, .. } => *status,
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            Outcome::Solved(plan) => Some(plan),
            Outcome::Unsolved { .. } => None,
        }
    }
}

fn whole(value: f64) -> i64 {
    value.round() as i64
}

impl Plan {
    fn new(problem: &Problem, result: &RebalancingResult, values: &Values) -> Plan {
        let sets = &result.sets;
        let parameters: &Parameters = &result.parameters;

        let flows: Vec<ArcFlow> = sets
            .A
            .iter()
            .map(|a| ArcFlow {
                arc: *a,
                from: problem.name(a.from).to_string(),
                to: problem.name(a.to).to_string(),
                quantity: whole(values.w[a]),
                used: values.y[a] > 0.5,
                unit_cost: parameters.C[a],
            })
            .collect();

        let vertices: Vec<VertexState> = sets
            .V
            .iter()
            .map(|v| VertexState {
                vertex: *v,
                outlet: problem.name(v.node).to_string(),
                demand: problem.demand(v.time, v.node),
                lost_sales: whole(values.l[v]),
                stock: whole(values.s[v]),
                holding_cost: parameters.K[v.time],
            })
            .collect();

        let mut periods = vec![PeriodCost::default(); sets.T.len()];
        for flow in &flows {
            periods[*flow.arc.time].transport += flow.cost();
        }
        for state in &vertices {
            let period = &mut periods[*state.vertex.time];
            period.lost_sales += state.lost_sales as f64 * parameters.U;
            period.holding += state.stock as f64 * state.holding_cost;
        }

        let plan = Plan {
            status: result.status,
            objective: result.objective.unwrap_or_default(),
            runtime: result.runtime.as_secs_f64(),
            moq: parameters.Q as i64,
            flows,
            vertices,
            periods,
            outlets: sets.O.clone(),
        };

        let total = plan.total_cost();
        let scale = plan.objective.abs().max(1.0);
        if (total - plan.objective).abs() > COST_TOLERANCE * scale {
            warn!(
                "plan cost {} differs from the solver objective {}",
                total, plan.objective
            );
        }
        debug!(
            "interpreted plan: {} shipments, cost {:.2} (period 0: {:.2})",
            plan.shipments().count(),
            total,
            plan.first_period_cost()
        );

        plan
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// The objective value reported by the solver
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Solver wall-clock time
    pub fn runtime(&self) -> Duration {
        Duration::from_secs_f64(self.runtime)
    }

    /// The flow on every arc, including those that carry nothing
    pub fn flows(&self) -> &[ArcFlow] {
        &self.flows
    }

    /// Arcs with strictly positive flow
    pub fn shipments(&self) -> impl Iterator<Item = &ArcFlow> + '_ {
        self.flows.iter().filter(|f| f.quantity > 0)
    }

    pub fn vertices(&self) -> &[VertexState] {
        &self.vertices
    }

    /// Outlets and periods with strictly positive lost sales
    pub fn lost_sales(&self) -> impl Iterator<Item = &VertexState> + '_ {
        self.vertices.iter().filter(|v| v.lost_sales > 0)
    }

    pub fn has_lost_sales(&self) -> bool {
        self.lost_sales().next().is_some()
    }

    /// Cost per period
    pub fn period_costs(&self) -> &[PeriodCost] {
        &self.periods
    }

    /// Cost over the full horizon
    pub fn total_cost(&self) -> Cost {
        self.periods.iter().map(PeriodCost::total).sum()
    }

    /// Cost of period 0, the only period whose decisions are committed
    pub fn first_period_cost(&self) -> Cost {
        self.periods.first().map(PeriodCost::total).unwrap_or_default()
    }

    /// The flow on every arc, in enumeration order
    pub fn flow_values(&self) -> Vec<i64> {
        self.flows.iter().map(|f| f.quantity).collect()
    }

    /// The warehouse shipments planned for period 1, per outlet. These become the in-transit
    /// quantities of the next cycle. All zero when the horizon has a single period.
    pub fn replenishment_next(&self) -> Vec<i64> {
        let shipped: HashMap<NodeIndex, i64> = self
            .flows
            .iter()
            .filter(|f| *f.arc.time == 1 && f.arc.from_warehouse())
            .map(|f| (f.arc.to, f.quantity))
            .collect();
        self.outlets
            .iter()
            .map(|o| shipped.get(o).copied().unwrap_or(0))
            .collect()
    }

    /// Stock carried out of period 0, per outlet. This becomes the starting stock of the next
    /// cycle.
    pub fn stock_after_first_period(&self) -> Vec<i64> {
        self.vertices
            .iter()
            .filter(|v| *v.vertex.time == 0)
            .map(|v| v.stock)
            .collect()
    }

    /// Checks the plan against the invariants of the model: flow conservation, MOQ and arc
    /// selection, non-negativity, and the pinned period-0 warehouse flows.
    pub fn check(&self, problem: &Problem) -> Vec<Violation> {
        let mut violations = Vec::new();

        for flow in &self.flows {
            let arc = flow.arc;
            if flow.quantity < 0 {
                violations.push(Violation::Negative {
                    what: "flow",
                    at: arc.to_string(),
                    value: flow.quantity,
                });
            }
            // warehouse arcs are selected exactly when they ship
            let idle = arc.from_warehouse() && flow.used && flow.quantity == 0;
            if (flow.quantity > 0 && !flow.used) || idle {
                violations.push(Violation::Selection {
                    arc,
                    quantity: flow.quantity,
                    used: flow.used,
                });
            }
            if arc.from_warehouse() && flow.quantity > 0 && flow.quantity < self.moq {
                violations.push(Violation::MinimumOrder {
                    arc,
                    quantity: flow.quantity,
                    moq: self.moq,
                });
            }
            if arc.from_warehouse() && *arc.time == 0 {
                let expected = problem.nodes()[arc.to].in_transit() as i64;
                if flow.quantity != expected {
                    violations.push(Violation::InTransit {
                        arc,
                        quantity: flow.quantity,
                        expected,
                    });
                }
            }
        }

        let mut net: HashMap<Vertex, i64> = HashMap::new();
        for flow in &self.flows {
            *net.entry(flow.arc.head()).or_default() += flow.quantity;
            if !flow.arc.from_warehouse() {
                *net.entry(flow.arc.tail()).or_default() -= flow.quantity;
            }
        }

        let stock: HashMap<Vertex, i64> =
            self.vertices.iter().map(|v| (v.vertex, v.stock)).collect();
        for state in &self.vertices {
            let v = state.vertex;
            for (what, value) in [("lost sales", state.lost_sales), ("stock", state.stock)] {
                if value < 0 {
                    violations.push(Violation::Negative {
                        what,
                        at: v.to_string(),
                        value,
                    });
                }
            }

            let previous = match *v.time {
                0 => problem.nodes()[v.node].initial_stock() as i64,
                t => stock[&Vertex::new(TimeIndex::from(t - 1), v.node)],
            };
            let expected = previous + net.get(&v).copied().unwrap_or(0) - state.demand as i64
                + state.lost_sales;
            if state.stock != expected {
                violations.push(Violation::Conservation {
                    vertex: v,
                    stock: state.stock,
                    expected,
                });
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::rebalancing::sets_and_parameters::Sets;
    use crate::problem::tests::small_inputs;

    /// Builds a result by hand for the small problem, with the given flows on
    /// (period, from, to) and (lost sales, stock) per (period, outlet).
    fn result_with(
        problem: &Problem,
        flows: &[((usize, usize, usize), f64)],
        states: &[((usize, usize), (f64, f64))],
    ) -> RebalancingResult {
        let sets = Sets::new(problem);
        let parameters = Parameters::new(problem, &sets).unwrap();
        let flow = |a: &Arc| {
            flows
                .iter()
                .find(|((t, i, j), _)| (*a.time, *a.from, *a.to) == (*t, *i, *j))
                .map_or(0.0, |(_, q)| *q)
        };
        let state = |v: &Vertex| {
            states
                .iter()
                .find(|((t, i), _)| (*v.time, *v.node) == (*t, *i))
                .map_or((0.0, 0.0), |(_, s)| *s)
        };

        let values = Values {
            w: sets.A.iter().map(|a| (*a, flow(a))).collect(),
            y: sets
                .A
                .iter()
                .map(|a| (*a, if flow(a) > 0.0 { 1.0 } else { 0.0 }))
                .collect(),
            l: sets.V.iter().map(|v| (*v, state(v).0)).collect(),
            s: sets.V.iter().map(|v| (*v, state(v).1)).collect(),
        };

        RebalancingResult {
            status: SolveStatus::Optimal,
            objective: None,
            runtime: Duration::from_millis(5),
            values: Some(values),
            sets,
            parameters,
        }
    }

    fn problem() -> Problem {
        Problem::new(small_inputs(), Config::default()).unwrap()
    }

    /// Ships the surplus of outlet 1 to outlet 2 in both periods
    fn rebalanced(problem: &Problem) -> RebalancingResult {
        result_with(
            problem,
            &[((0, 0, 1), 30.0), ((0, 1, 2), 8.0), ((1, 1, 2), 6.0)],
            &[((0, 1), (0.0, 12.0)), ((1, 1), (0.0, 1.0))],
        )
    }

    #[test]
    fn costs_are_split_by_period() {
        let problem = problem();
        let outcome = Outcome::new(&problem, &rebalanced(&problem));
        let plan = outcome.plan().unwrap();

        let periods = plan.period_costs();
        assert!((periods[0].transport - (30.0 * 1.39 + 8.0 * 0.24)).abs() < 1e-9);
        assert!((periods[0].holding - 12.0 * 1.58).abs() < 1e-9);
        assert!((periods[1].transport - 6.0 * 0.24).abs() < 1e-9);
        assert!((periods[1].holding - 0.79).abs() < 1e-9);
        assert!((plan.total_cost() - 64.81).abs() < 1e-9);
        assert!((plan.first_period_cost() - periods[0].total()).abs() < 1e-12);
        assert!(plan.first_period_cost() <= plan.total_cost());
    }

    #[test]
    fn shipments_and_hand_off() {
        let problem = problem();
        let outcome = Outcome::new(&problem, &rebalanced(&problem));
        let plan = outcome.plan().unwrap();

        let shipments: Vec<String> = plan.shipments().map(|f| f.arc.to_string()).collect();
        assert_eq!(shipments, vec!["0_0_1", "0_1_2", "1_1_2"]);
        assert_eq!(plan.flow_values(), vec![30, 0, 8, 0, 0, 0, 6, 0]);
        assert_eq!(plan.replenishment_next(), vec![0, 0]);
        assert_eq!(plan.stock_after_first_period(), vec![12, 0]);
        assert!(!plan.has_lost_sales());
        assert!(plan.check(&problem).is_empty());
    }

    #[test]
    fn lost_sales_are_reported_and_priced() {
        let problem = problem();
        let result = result_with(
            &problem,
            &[((0, 0, 1), 30.0)],
            &[
                ((0, 1), (0.0, 20.0)),
                ((0, 2), (8.0, 0.0)),
                ((1, 1), (0.0, 15.0)),
                ((1, 2), (6.0, 0.0)),
            ],
        );
        let outcome = Outcome::new(&problem, &result);
        let plan = outcome.plan().unwrap();

        let lost: Vec<(String, i64)> = plan
            .lost_sales()
            .map(|v| (v.vertex.to_string(), v.lost_sales))
            .collect();
        assert_eq!(lost, vec![("0_2".to_string(), 8), ("1_2".to_string(), 6)]);
        assert!(plan.has_lost_sales());
        assert!((plan.period_costs()[0].lost_sales - 8.0 * 591.0).abs() < 1e-9);
        assert!(plan.check(&problem).is_empty());
    }

    #[test]
    fn check_finds_broken_invariants() {
        let problem = problem();
        let result = result_with(
            &problem,
            &[((0, 0, 1), 20.0), ((1, 0, 2), 10.0)],
            &[
                ((0, 1), (0.0, 10.0)),
                ((0, 2), (8.0, 0.0)),
                ((1, 1), (0.0, 5.0)),
            ],
        );
        let outcome = Outcome::new(&problem, &result);
        let violations = outcome.plan().unwrap().check(&problem);

        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::InTransit {
                quantity: 20,
                expected: 30,
                ..
            }
        )));
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::MinimumOrder {
                quantity: 10,
                moq: 25,
                ..
            }
        )));
        // outlet 2 receives 10 against a demand of 6 in period 1, but carries nothing
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::Conservation {
                stock: 0,
                expected: 4,
                ..
            }
        )));
    }

    #[test]
    fn selected_warehouse_arc_without_flow_is_flagged() {
        let problem = problem();
        let mut result = rebalanced(&problem);
        let idle = Arc::new(TimeIndex::from(1), NodeIndex::from(0), NodeIndex::from(2));
        result.values.as_mut().unwrap().y.insert(idle, 1.0);

        let outcome = Outcome::new(&problem, &result);
        let violations = outcome.plan().unwrap().check(&problem);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0],
            Violation::Selection {
                quantity: 0,
                used: true,
                ..
            }
        ));
    }

    #[test]
    fn unsolved_outcome_has_no_plan() {
        let problem = problem();
        let mut result = rebalanced(&problem);
        result.status = SolveStatus::Infeasible;
        result.values = None;
        let outcome = Outcome::new(&problem, &result);
        assert!(outcome.plan().is_none());
        assert_eq!(outcome.status(), SolveStatus::Infeasible);
    }
}

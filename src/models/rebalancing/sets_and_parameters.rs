use std::collections::HashMap;

use derive_more::Display;
use log::{debug, trace, warn};
use typed_index_collections::TiVec;

use crate::{
    config::Config,
    problem::{Arc, Cost, NodeIndex, Problem, TimeIndex, Vertex},
};

#[derive(Debug, Display)]
pub enum ModelError {
    #[display(fmt = "the minimum order quantity must be non-negative, got {}", _0)]
    NegativeMoq(i64),
    #[display(
        fmt = "big-M (MOQ {} + max demand {}) must be positive",
        moq,
        max_demand
    )]
    NonPositiveBigM { moq: i64, max_demand: u64 },
    #[display(fmt = "{} must be a non-negative finite number, got {}", name, value)]
    InvalidRate { name: &'static str, value: f64 },
    #[display(
        fmt = "{} holding multipliers given for a horizon of {} periods",
        given,
        periods
    )]
    HoldingMultiplierCount { given: usize, periods: usize },
}

impl std::error::Error for ModelError {}

/// sets for the rebalancing model
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of nodes, the warehouse first
    pub N: Vec<NodeIndex>,
    /// Set of outlets
    pub O: Vec<NodeIndex>,
    /// Set of time periods
    pub T: Vec<TimeIndex>,
    /// Set of vertices (t, i) for every period and outlet
    pub V: Vec<Vertex>,
    /// Set of arcs (t, i, j), in enumeration order
    pub A: Vec<Arc>,
    /// Set of arcs leaving the warehouse
    pub A_w: Vec<Arc>,
    /// Arcs entering each vertex
    pub Rs: HashMap<Vertex, Vec<Arc>>,
    /// Arcs leaving each vertex
    pub Fs: HashMap<Vertex, Vec<Arc>>,
}

/// parameters for the rebalancing model
#[allow(non_snake_case)]
#[derive(Debug)]
pub struct Parameters {
    /// Unit cost of shipping on an arc. Warehouse arcs include the holding rate.
    pub C: HashMap<Arc, Cost>,
    /// Unit holding cost of stock carried out of period t
    pub K: TiVec<TimeIndex, Cost>,
    /// Demand at each vertex
    pub D: HashMap<Vertex, f64>,
    /// Stock at each outlet before period 0
    pub S_0: TiVec<NodeIndex, f64>,
    /// In-transit quantity arriving at each outlet at the start of period 0
    pub R: TiVec<NodeIndex, f64>,
    /// Unit cost of lost sales
    pub U: Cost,
    /// Minimum order quantity on warehouse arcs
    pub Q: f64,
    /// Upper bound on the flow along any single arc
    pub M: f64,
}

#[allow(non_snake_case)]
impl Sets {
    pub fn new(problem: &Problem) -> Sets {
        let N: Vec<NodeIndex> = problem.nodes().iter().map(|n| n.index()).collect();
        let O = problem.outlets().map(|n| n.index()).collect();
        let T = problem.periods().collect();
        let V = problem.vertices();
        let A = problem.arcs();
        let A_w = A.iter().filter(|a| a.from_warehouse()).copied().collect();

        let mut Rs: HashMap<Vertex, Vec<Arc>> = V.iter().map(|v| (*v, Vec::new())).collect();
        let mut Fs: HashMap<Vertex, Vec<Arc>> = V.iter().map(|v| (*v, Vec::new())).collect();
        for arc in &A {
            Rs.entry(arc.head()).or_default().push(*arc);
            if !arc.from_warehouse() {
                Fs.entry(arc.tail()).or_default().push(*arc);
            }
        }

        trace!("sets: {} nodes, {} periods, {} arcs", N.len(), problem.timesteps(), A.len());

        Sets {
            N,
            O,
            T,
            V,
            A,
            A_w,
            Rs,
            Fs,
        }
    }

    /// Arcs entering the vertex
    pub fn inbound(&self, vertex: &Vertex) -> &[Arc] {
        self.Rs.get(vertex).map(|a| a.as_slice()).unwrap_or(&[])
    }

    /// Arcs leaving the vertex
    pub fn outbound(&self, vertex: &Vertex) -> &[Arc] {
        self.Fs.get(vertex).map(|a| a.as_slice()).unwrap_or(&[])
    }
}

fn rate(name: &'static str, value: f64) -> Result<f64, ModelError> {
    match value.is_finite() && value >= 0.0 {
        true => Ok(value),
        false => Err(ModelError::InvalidRate { name, value }),
    }
}

#[allow(non_snake_case)]
impl Parameters {
    pub fn new(problem: &Problem, sets: &Sets) -> Result<Parameters, ModelError> {
        let config = problem.config();
        let warehouse_rate = rate("warehouse_rate", config.warehouse_rate)?;
        let outlet_rate = rate("outlet_rate", config.outlet_rate)?;
        let H = rate("holding_rate", config.holding_rate)?;
        let U = rate("lost_sales_penalty", config.lost_sales_penalty)?;

        if config.moq < 0 {
            return Err(ModelError::NegativeMoq(config.moq));
        }
        let Q = config.moq as f64;

        let max_demand = problem.max_demand();
        let M = Q + max_demand as f64;
        if M <= 0.0 {
            return Err(ModelError::NonPositiveBigM {
                moq: config.moq,
                max_demand,
            });
        }

        let C = sets
            .A
            .iter()
            .map(|a| {
                let distance = problem.distance(a.from, a.to);
                let cost = match a.from_warehouse() {
                    true => distance * warehouse_rate + H,
                    false => distance * outlet_rate,
                };
                (*a, cost)
            })
            .collect();

        let K = Self::holding_costs(config, sets.T.len(), H)?;

        let D = sets
            .V
            .iter()
            .map(|v| (*v, problem.demand(v.time, v.node) as f64))
            .collect();

        let S_0 = problem
            .nodes()
            .iter()
            .map(|n| n.initial_stock() as f64)
            .collect();
        let R: TiVec<NodeIndex, f64> = problem
            .nodes()
            .iter()
            .map(|n| n.in_transit() as f64)
            .collect();

        for o in &sets.O {
            let r = R[*o];
            if r > M {
                warn!(
                    "in-transit quantity {} at {} exceeds the arc bound {}, the model is infeasible",
                    r,
                    problem.name(*o),
                    M
                );
            } else if r > 0.0 && r < Q {
                warn!(
                    "in-transit quantity {} at {} is below the MOQ {}, the model is infeasible",
                    r,
                    problem.name(*o),
                    Q
                );
            }
        }

        debug!("parameters: Q = {}, M = {}, U = {}, K = {:?}", Q, M, U, K);

        Ok(Parameters {
            C,
            K,
            D,
            S_0,
            R,
            U,
            Q,
            M,
        })
    }

    fn holding_costs(
        config: &Config,
        periods: usize,
        holding_rate: f64,
    ) -> Result<TiVec<TimeIndex, Cost>, ModelError> {
        let multipliers: Vec<f64> = match &config.holding_multipliers {
            Some(m) if m.len() != periods => {
                return Err(ModelError::HoldingMultiplierCount {
                    given: m.len(),
                    periods,
                })
            }
            Some(m) => m.clone(),
            None => (0..periods)
                .map(|t| Config::default_holding_multiplier(t, periods))
                .collect(),
        };

        multipliers
            .into_iter()
            .map(|m| rate("holding_multipliers", m).map(|m| m * holding_rate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{tests::small_inputs, Inputs};

    fn problem_with(inputs: Inputs, config: Config) -> Problem {
        Problem::new(inputs, config).unwrap()
    }

    #[test]
    fn inbound_and_outbound_arcs() {
        let problem = problem_with(small_inputs(), Config::default());
        let sets = Sets::new(&problem);
        let v = Vertex::new(TimeIndex::from(1), NodeIndex::from(2));

        let inbound: Vec<String> = sets.inbound(&v).iter().map(|a| a.to_string()).collect();
        let outbound: Vec<String> = sets.outbound(&v).iter().map(|a| a.to_string()).collect();
        assert_eq!(inbound, vec!["1_0_2", "1_1_2"]);
        assert_eq!(outbound, vec!["1_2_1"]);
        assert_eq!(sets.A_w.len(), 4);
        assert_eq!(sets.V.len(), 4);
    }

    #[test]
    fn costs_follow_arc_type() {
        let problem = problem_with(small_inputs(), Config::default());
        let sets = Sets::new(&problem);
        let parameters = Parameters::new(&problem, &sets).unwrap();

        let t = TimeIndex::from(0);
        let warehouse_arc = Arc::new(t, NodeIndex::from(0), NodeIndex::from(1));
        let outlet_arc = Arc::new(t, NodeIndex::from(1), NodeIndex::from(2));
        assert!((parameters.C[&warehouse_arc] - (10.0 * 0.06 + 0.79)).abs() < 1e-12);
        assert!((parameters.C[&outlet_arc] - 3.0 * 0.08).abs() < 1e-12);
        assert_eq!(parameters.M, 25.0 + 10.0);
        assert_eq!(parameters.Q, 25.0);
        assert_eq!(parameters.R[NodeIndex::from(1)], 30.0);
    }

    #[test]
    fn holding_is_doubled_for_interim_periods() {
        let problem = problem_with(small_inputs(), Config::default());
        let sets = Sets::new(&problem);
        let parameters = Parameters::new(&problem, &sets).unwrap();
        assert!((parameters.K[TimeIndex::from(0)] - 1.58).abs() < 1e-12);
        assert!((parameters.K[TimeIndex::from(1)] - 0.79).abs() < 1e-12);
    }

    #[test]
    fn explicit_holding_multipliers() {
        let config = Config {
            holding_multipliers: Some(vec![1.0, 3.0]),
            ..Config::default()
        };
        let problem = problem_with(small_inputs(), config);
        let sets = Sets::new(&problem);
        let parameters = Parameters::new(&problem, &sets).unwrap();
        assert!((parameters.K[TimeIndex::from(1)] - 2.37).abs() < 1e-12);

        let config = Config {
            holding_multipliers: Some(vec![1.0]),
            ..Config::default()
        };
        let problem = problem_with(small_inputs(), config);
        let err = Parameters::new(&problem, &Sets::new(&problem)).unwrap_err();
        assert!(matches!(
            err,
            ModelError::HoldingMultiplierCount {
                given: 1,
                periods: 2
            }
        ));
    }

    #[test]
    fn negative_moq_is_a_modelling_error() {
        let config = Config {
            moq: -5,
            ..Config::default()
        };
        let problem = problem_with(small_inputs(), config);
        let err = Parameters::new(&problem, &Sets::new(&problem)).unwrap_err();
        assert!(matches!(err, ModelError::NegativeMoq(-5)));
    }

    #[test]
    fn zero_big_m_is_a_modelling_error() {
        let mut inputs = small_inputs();
        inputs.demand = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let config = Config {
            moq: 0,
            ..Config::default()
        };
        let problem = problem_with(inputs, config);
        let err = Parameters::new(&problem, &Sets::new(&problem)).unwrap_err();
        assert!(matches!(err, ModelError::NonPositiveBigM { .. }));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let config = Config {
            outlet_rate: -0.1,
            ..Config::default()
        };
        let problem = problem_with(small_inputs(), config);
        let err = Parameters::new(&problem, &Sets::new(&problem)).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidRate {
                name: "outlet_rate",
                ..
            }
        ));
    }
}

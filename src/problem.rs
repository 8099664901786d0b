use derive_more::{Deref, Display, From, Into};
use float_ord::FloatOrd;
use itertools::iproduct;
use log::{debug, trace};
use serde::Serialize;
use typed_index_collections::TiVec;

use crate::config::Config;

/// The type used for inventory quantity. Product is only ever moved in whole units.
pub type Quantity = u64;
/// The type used for distance
pub type Distance = f64;
/// The type used for cost
pub type Cost = f64;

#[derive(
    Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash, Serialize,
)]
pub struct NodeIndex(usize);

#[derive(
    Deref, Debug, Display, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash, Serialize,
)]
pub struct TimeIndex(usize);

impl NodeIndex {
    /// The warehouse is always node 0
    pub const WAREHOUSE: NodeIndex = NodeIndex(0);

    pub fn is_warehouse(&self) -> bool {
        *self == Self::WAREHOUSE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeType {
    Warehouse,
    Outlet,
}

/// A (time, node) pair for an outlet.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[display(fmt = "{}_{}", time, node)]
pub struct Vertex {
    pub time: TimeIndex,
    pub node: NodeIndex,
}

impl Vertex {
    pub fn new(time: TimeIndex, node: NodeIndex) -> Vertex {
        Vertex { time, node }
    }
}

/// A transport arc `from -> to` used in period `time`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[display(fmt = "{}_{}_{}", time, from, to)]
pub struct Arc {
    pub time: TimeIndex,
    pub from: NodeIndex,
    pub to: NodeIndex,
}

impl Arc {
    pub fn new(time: TimeIndex, from: NodeIndex, to: NodeIndex) -> Arc {
        Arc { time, from, to }
    }

    /// Whether `from -> to` is a valid arc. Self-loops and arcs into the warehouse are never valid.
    pub fn is_valid(from: NodeIndex, to: NodeIndex) -> bool {
        from != to && !to.is_warehouse()
    }

    /// Whether this arc is a replenishment from the warehouse
    pub fn from_warehouse(&self) -> bool {
        self.from.is_warehouse()
    }

    /// The vertex this arc ends in
    pub fn head(&self) -> Vertex {
        Vertex::new(self.time, self.to)
    }

    /// The vertex this arc leaves from
    pub fn tail(&self) -> Vertex {
        Vertex::new(self.time, self.from)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    #[display(fmt = "demand forecast")]
    Demand,
    #[display(fmt = "starting stock")]
    Stock,
    #[display(fmt = "in-transit replenishment")]
    InTransit,
    #[display(fmt = "distance matrix")]
    Distances,
}

/// Raw, unvalidated input data as read from file. Outlets are ordered by node index, starting at node 1.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    /// Location labels, one per node, warehouse first
    pub locations: Vec<String>,
    /// Symmetric distance matrix between all nodes, warehouse first
    pub distances: Vec<Vec<Distance>>,
    /// Demand forecast per outlet (rows) and period (columns)
    pub demand: Vec<Vec<f64>>,
    /// Stock at every outlet before period 0
    pub stock: Vec<f64>,
    /// Quantity arriving at every outlet at the start of period 0
    pub in_transit: Vec<f64>,
}

#[derive(Debug, Display)]
pub enum DataInconsistencyError {
    #[display(fmt = "there are no outlets in the {}", _0)]
    NoOutlets(Input),
    #[display(fmt = "the planning horizon must contain at least one period")]
    NoPeriods,
    #[display(
        fmt = "outlet {} has no demand for period {} (only {} periods given)",
        outlet,
        period,
        given
    )]
    MissingDemand {
        outlet: usize,
        period: usize,
        given: usize,
    },
    #[display(
        fmt = "{} has {} outlet values, expected {}",
        input,
        actual,
        expected
    )]
    OutletCountMismatch {
        input: Input,
        expected: usize,
        actual: usize,
    },
    #[display(
        fmt = "{} record {}, field {}: value {} is negative",
        input,
        record,
        field,
        value
    )]
    NegativeValue {
        input: Input,
        record: usize,
        field: usize,
        value: f64,
    },
    #[display(
        fmt = "{} record {}, field {}: {:?} is not a number",
        input,
        record,
        field,
        value
    )]
    NotNumeric {
        input: Input,
        record: usize,
        field: usize,
        value: String,
    },
    #[display(
        fmt = "distance matrix is not square: row {} has {} columns, expected {}",
        row,
        actual,
        expected
    )]
    DistanceNotSquare {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[display(
        fmt = "distance matrix covers {} nodes, but there are {} (warehouse + outlets)",
        actual,
        expected
    )]
    DistanceSizeMismatch { expected: usize, actual: usize },
    #[display(
        fmt = "distance matrix is asymmetric between {} and {}: {} vs {}",
        from,
        to,
        forward,
        backward
    )]
    AsymmetricDistance {
        from: String,
        to: String,
        forward: Distance,
        backward: Distance,
    },
    #[display(fmt = "{} record {}: {}", input, record, message)]
    Malformed {
        input: Input,
        record: usize,
        message: String,
    },
}

impl std::error::Error for DataInconsistencyError {}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// The name of the node
    name: String,
    /// The type of node
    kind: NodeType,
    /// The index of the node
    index: NodeIndex,
    /// Stock available before period 0. Always zero for the warehouse.
    initial_stock: Quantity,
    /// Quantity arriving at the start of period 0 from an order placed in an earlier cycle
    in_transit: Quantity,
}

impl Node {
    /// The name of the node
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
    /// The type of node
    pub fn r#type(&self) -> NodeType {
        self.kind
    }
    /// The index of the node
    pub fn index(&self) -> NodeIndex {
        self.index
    }
    /// Stock available before period 0
    pub fn initial_stock(&self) -> Quantity {
        self.initial_stock
    }
    /// Quantity arriving at the start of period 0
    pub fn in_transit(&self) -> Quantity {
        self.in_transit
    }
}

/// The validated network: one warehouse, a set of outlets and a short planning horizon.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Problem {
    /// The nodes of this problem, the warehouse at index 0
    nodes: TiVec<NodeIndex, Node>,
    /// The number of periods in the planning horizon
    timesteps: usize,
    /// Demand per period and node. The warehouse entry is always zero.
    demand: TiVec<TimeIndex, TiVec<NodeIndex, Quantity>>,
    /// A distance matrix between the different nodes.
    distances: Vec<Vec<Distance>>,
    /// Cost rates and modelling choices for this run
    config: Config,
}

impl Problem {
    /// Validates the raw inputs and constructs the network.
    ///
    /// All demand, stock and in-transit quantities are rounded *up* to the next integer, so that
    /// fractional forecasts never understate demand. The horizon is `config.horizon`, or the number
    /// of demand columns if that is not set. Extra demand columns beyond the horizon are ignored.
    pub fn new(inputs: Inputs, config: Config) -> Result<Problem, DataInconsistencyError> {
        use DataInconsistencyError::*;
        let outlets = inputs.demand.len();
        if outlets == 0 {
            return Err(NoOutlets(Input::Demand));
        }

        let timesteps = match config.horizon {
            Some(h) => h,
            None => inputs.demand.iter().map(|row| row.len()).max().unwrap_or(0),
        };
        if timesteps == 0 {
            return Err(NoPeriods);
        }

        for (input, values) in [(Input::Stock, &inputs.stock), (Input::InTransit, &inputs.in_transit)]
        {
            if values.len() != outlets {
                return Err(OutletCountMismatch {
                    input,
                    expected: outlets,
                    actual: values.len(),
                });
            }
        }

        let row: TiVec<NodeIndex, Quantity> = vec![0; outlets + 1].into();
        let mut demand: TiVec<TimeIndex, TiVec<NodeIndex, Quantity>> =
            vec![row; timesteps].into();
        for (o, row) in inputs.demand.iter().enumerate() {
            if row.len() < timesteps {
                return Err(MissingDemand {
                    outlet: o + 1,
                    period: row.len(),
                    given: row.len(),
                });
            }
            for (t, value) in row.iter().take(timesteps).enumerate() {
                demand[TimeIndex(t)][NodeIndex(o + 1)] = ceil_quantity(*value, Input::Demand, o, t)?;
            }
        }

        let stock = inputs
            .stock
            .iter()
            .enumerate()
            .map(|(o, v)| ceil_quantity(*v, Input::Stock, 0, o))
            .collect::<Result<Vec<_>, _>>()?;
        let in_transit = inputs
            .in_transit
            .iter()
            .enumerate()
            .map(|(o, v)| ceil_quantity(*v, Input::InTransit, 0, o))
            .collect::<Result<Vec<_>, _>>()?;

        Self::check_distances(
            &inputs.distances,
            outlets + 1,
            config.symmetry_tolerance,
            &inputs.locations,
        )?;

        let nodes = (0..=outlets)
            .map(|i| {
                let name = inputs
                    .locations
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| default_name(i));
                match i {
                    0 => Node {
                        name,
                        kind: NodeType::Warehouse,
                        index: NodeIndex(0),
                        initial_stock: 0,
                        in_transit: 0,
                    },
                    _ => Node {
                        name,
                        kind: NodeType::Outlet,
                        index: NodeIndex(i),
                        initial_stock: stock[i - 1],
                        in_transit: in_transit[i - 1],
                    },
                }
            })
            .collect();

        debug!(
            "Constructed network with {} outlets over {} periods",
            outlets, timesteps
        );

        Ok(Problem {
            nodes,
            timesteps,
            demand,
            distances: inputs.distances,
            config,
        })
    }

    fn check_distances(
        distances: &[Vec<Distance>],
        nodes: usize,
        tolerance: f64,
        locations: &[String],
    ) -> Result<(), DataInconsistencyError> {
        use DataInconsistencyError::*;
        for (row, values) in distances.iter().enumerate() {
            if values.len() != distances.len() {
                return Err(DistanceNotSquare {
                    row,
                    expected: distances.len(),
                    actual: values.len(),
                });
            }
            for (field, value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(NotNumeric {
                        input: Input::Distances,
                        record: row,
                        field,
                        value: value.to_string(),
                    });
                }
                if *value < 0.0 {
                    return Err(NegativeValue {
                        input: Input::Distances,
                        record: row,
                        field,
                        value: *value,
                    });
                }
            }
        }

        if distances.len() != nodes {
            return Err(DistanceSizeMismatch {
                expected: nodes,
                actual: distances.len(),
            });
        }

        let worst = iproduct!(0..nodes, 0..nodes)
            .filter(|(i, j)| i < j)
            .max_by_key(|(i, j)| FloatOrd((distances[*i][*j] - distances[*j][*i]).abs()));

        if let Some((i, j)) = worst {
            let (forward, backward) = (distances[i][j], distances[j][i]);
            trace!("largest distance asymmetry is between {} and {}", i, j);
            if (forward - backward).abs() > tolerance {
                let name = |n: usize| locations.get(n).cloned().unwrap_or_else(|| default_name(n));
                return Err(AsymmetricDistance {
                    from: name(i),
                    to: name(j),
                    forward,
                    backward,
                });
            }
        }

        Ok(())
    }

    /// The nodes of this problem. The warehouse is the first node.
    pub fn nodes(&self) -> &TiVec<NodeIndex, Node> {
        &self.nodes
    }

    /// The warehouse
    pub fn warehouse(&self) -> &Node {
        &self.nodes[NodeIndex::WAREHOUSE]
    }

    /// The outlets, ordered by index
    pub fn outlets(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.r#type() == NodeType::Outlet)
    }

    /// The number of outlets
    pub fn outlet_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// The number of periods in the planning horizon
    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    /// The periods of the planning horizon in order
    pub fn periods(&self) -> impl Iterator<Item = TimeIndex> {
        (0..self.timesteps).map(TimeIndex)
    }

    /// Whether `time` is the last period of the horizon
    pub fn is_terminal(&self, time: TimeIndex) -> bool {
        *time + 1 == self.timesteps
    }

    /// The distance between two nodes
    pub fn distance(&self, from: NodeIndex, to: NodeIndex) -> Distance {
        self.distances[*from][*to]
    }

    /// The demand at `node` in period `time`. Zero for the warehouse.
    pub fn demand(&self, time: TimeIndex, node: NodeIndex) -> Quantity {
        self.demand[time][node]
    }

    /// The largest demand of any outlet in any period
    pub fn max_demand(&self) -> Quantity {
        self.demand
            .iter()
            .flat_map(|row| row.iter().copied())
            .max()
            .unwrap_or(0)
    }

    /// Cost rates and modelling choices of this run
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The name of a node
    pub fn name(&self, node: NodeIndex) -> &str {
        self.nodes[node].name()
    }

    /// All vertices `(t, i)` for outlets, ordered by period, then node
    pub fn vertices(&self) -> Vec<Vertex> {
        let outlets: Vec<NodeIndex> = self.outlets().map(|n| n.index()).collect();
        iproduct!(self.periods(), outlets)
            .map(|(t, n)| Vertex::new(t, n))
            .collect()
    }

    /// All valid arcs, in the fixed enumeration order: period, then origin, then destination.
    pub fn arcs(&self) -> Vec<Arc> {
        let nodes = || self.nodes.iter().map(|n| n.index());
        iproduct!(self.periods(), nodes(), nodes())
            .filter(|(_, i, j)| Arc::is_valid(*i, *j))
            .map(|(t, i, j)| Arc::new(t, i, j))
            .collect()
    }
}

fn default_name(node: usize) -> String {
    match node {
        0 => String::from("warehouse"),
        n => format!("outlet {}", n),
    }
}

/// Rounds a raw input quantity up to the next whole unit
fn ceil_quantity(
    value: f64,
    input: Input,
    record: usize,
    field: usize,
) -> Result<Quantity, DataInconsistencyError> {
    if !value.is_finite() {
        return Err(DataInconsistencyError::NotNumeric {
            input,
            record,
            field,
            value: value.to_string(),
        });
    }
    let rounded = value.ceil();
    if rounded < 0.0 {
        return Err(DataInconsistencyError::NegativeValue {
            input,
            record,
            field,
            value,
        });
    }
    Ok(rounded as Quantity)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two outlets, two periods. The outlets are closer to each other than to the warehouse.
    pub fn small_inputs() -> Inputs {
        Inputs {
            locations: vec!["Paris".into(), "Lyon".into(), "Dijon".into()],
            distances: vec![
                vec![0.0, 10.0, 10.0],
                vec![10.0, 0.0, 3.0],
                vec![10.0, 3.0, 0.0],
            ],
            demand: vec![vec![10.0, 5.0], vec![8.0, 6.0]],
            stock: vec![0.0, 0.0],
            in_transit: vec![30.0, 0.0],
        }
    }

    #[test]
    fn quantities_are_rounded_up() {
        let mut inputs = small_inputs();
        inputs.demand[0][1] = 4.2;
        inputs.stock[1] = 0.01;
        inputs.in_transit[0] = 29.5;

        let problem = Problem::new(inputs, Config::default()).unwrap();
        assert_eq!(problem.demand(TimeIndex(1), NodeIndex(1)), 5);
        assert_eq!(problem.nodes()[NodeIndex(2)].initial_stock(), 1);
        assert_eq!(problem.nodes()[NodeIndex(1)].in_transit(), 30);
        assert_eq!(problem.max_demand(), 10);
    }

    #[test]
    fn warehouse_has_no_demand_or_stock() {
        let problem = Problem::new(small_inputs(), Config::default()).unwrap();
        let warehouse = problem.warehouse();
        assert_eq!(warehouse.r#type(), NodeType::Warehouse);
        assert_eq!(warehouse.name(), "Paris");
        assert_eq!(warehouse.initial_stock(), 0);
        assert_eq!(problem.demand(TimeIndex(0), NodeIndex::WAREHOUSE), 0);
        assert_eq!(problem.outlet_count(), 2);
    }

    #[test]
    fn arcs_exclude_self_loops_and_returns_to_warehouse() {
        let problem = Problem::new(small_inputs(), Config::default()).unwrap();
        let arcs = problem.arcs();
        // per period: 2 warehouse arcs + 2 outlet-outlet arcs
        assert_eq!(arcs.len(), 8);
        assert!(arcs.iter().all(|a| a.from != a.to && !a.to.is_warehouse()));

        let first: Vec<String> = arcs.iter().take(4).map(|a| a.to_string()).collect();
        assert_eq!(first, vec!["0_0_1", "0_0_2", "0_1_2", "0_2_1"]);
        assert!(arcs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn missing_demand_is_rejected() {
        let mut inputs = small_inputs();
        inputs.demand[1].pop();
        let err = Problem::new(inputs, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            DataInconsistencyError::MissingDemand { outlet: 2, .. }
        ));
    }

    #[test]
    fn horizon_truncates_extra_demand_columns() {
        let mut inputs = small_inputs();
        for row in inputs.demand.iter_mut() {
            row.extend([100.0, 100.0]);
        }
        let config = Config {
            horizon: Some(2),
            ..Config::default()
        };
        let problem = Problem::new(inputs, config).unwrap();
        assert_eq!(problem.timesteps(), 2);
        assert_eq!(problem.max_demand(), 10);
    }

    #[test]
    fn negative_stock_is_rejected() {
        let mut inputs = small_inputs();
        inputs.stock[1] = -3.0;
        let err = Problem::new(inputs, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            DataInconsistencyError::NegativeValue {
                input: Input::Stock,
                field: 1,
                ..
            }
        ));
    }

    #[test]
    fn asymmetric_distances_are_rejected() {
        let mut inputs = small_inputs();
        inputs.distances[1][2] = 3.5;
        let err = Problem::new(inputs, Config::default()).unwrap_err();
        match err {
            DataInconsistencyError::AsymmetricDistance { from, to, .. } => {
                assert_eq!((from.as_str(), to.as_str()), ("Lyon", "Dijon"));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn asymmetry_within_tolerance_is_accepted() {
        let mut inputs = small_inputs();
        inputs.distances[1][2] = 3.0 + 1e-9;
        assert!(Problem::new(inputs, Config::default()).is_ok());
    }

    #[test]
    fn non_finite_distances_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY] {
            let mut inputs = small_inputs();
            inputs.distances[0][1] = bad;
            inputs.distances[1][0] = bad;
            let err = Problem::new(inputs, Config::default()).unwrap_err();
            assert!(matches!(
                err,
                DataInconsistencyError::NotNumeric {
                    input: Input::Distances,
                    record: 0,
                    field: 1,
                    ..
                }
            ));
        }
    }

    #[test]
    fn non_square_distances_are_rejected() {
        let mut inputs = small_inputs();
        inputs.distances[2].pop();
        let err = Problem::new(inputs, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            DataInconsistencyError::DistanceNotSquare { row: 2, .. }
        ));
    }

    #[test]
    fn outlet_count_must_match() {
        let mut inputs = small_inputs();
        inputs.in_transit.push(4.0);
        let err = Problem::new(inputs, Config::default()).unwrap_err();
        assert!(matches!(
            err,
            DataInconsistencyError::OutletCountMismatch {
                input: Input::InTransit,
                expected: 2,
                actual: 3
            }
        ));
    }
}

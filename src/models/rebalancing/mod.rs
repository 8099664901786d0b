pub mod model;
pub mod sets_and_parameters;

pub use model::{RebalancingError, RebalancingModel, RebalancingResult};
pub use sets_and_parameters::{ModelError, Parameters, Sets};

pub mod lp_format;
pub mod milp;
pub mod rebalancing;
pub mod utils;

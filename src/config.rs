use std::{path::Path, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::solvers::SolveLimits;

/// Cost rates and modelling choices for a single planning run.
///
/// Every field has a default, so a JSON config file only needs to list the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Transport cost per unit per distance on warehouse -> outlet arcs
    pub warehouse_rate: f64,
    /// Transport cost per unit per distance on outlet -> outlet arcs
    pub outlet_rate: f64,
    /// Holding cost per unit of stock carried out of the terminal period
    pub holding_rate: f64,
    /// Cost of a single unit of demand left unmet
    pub lost_sales_penalty: f64,
    /// Minimum order quantity for any nonzero shipment from the warehouse
    pub moq: i64,
    /// Multiplier applied to `holding_rate` in each period. When unset, every non-terminal period
    /// uses `2.0` and the terminal period `1.0`.
    pub holding_multipliers: Option<Vec<f64>>,
    /// Number of periods to plan for. Defaults to the number of demand columns.
    pub horizon: Option<usize>,
    /// Largest accepted difference between `d(i, j)` and `d(j, i)`
    pub symmetry_tolerance: f64,
    /// Wall-clock limit handed to the solver, in seconds
    pub time_limit_secs: Option<f64>,
    /// Relative optimality gap at which the solver may stop
    pub mip_gap: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            warehouse_rate: 0.06,
            outlet_rate: 0.08,
            holding_rate: 0.79,
            lost_sales_penalty: 591.0,
            moq: 25,
            holding_multipliers: None,
            horizon: None,
            symmetry_tolerance: 1e-6,
            time_limit_secs: None,
            mip_gap: None,
        }
    }
}

impl Config {
    /// Reads a config from a JSON file. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Config, crate::Error> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        debug!("Read config from {}: {:?}", path.as_ref().display(), config);
        Ok(config)
    }

    /// The holding multiplier for period `time` in a horizon of `timesteps` periods, unless
    /// explicit multipliers are configured.
    pub fn default_holding_multiplier(time: usize, timesteps: usize) -> f64 {
        if time + 1 == timesteps {
            1.0
        } else {
            2.0
        }
    }

    /// The limits to hand to the solver
    pub fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: self
                .time_limit_secs
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
            mip_gap: self.mip_gap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "moq": 40, "outlet_rate": 0.1 }"#).unwrap();
        assert_eq!(config.moq, 40);
        assert_eq!(config.outlet_rate, 0.1);
        assert_eq!(config.warehouse_rate, 0.06);
        assert_eq!(config.lost_sales_penalty, 591.0);
        assert!(config.holding_multipliers.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<Config>(r#"{ "moqq": 40 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn holding_is_doubled_before_the_terminal_period() {
        assert_eq!(Config::default_holding_multiplier(0, 2), 2.0);
        assert_eq!(Config::default_holding_multiplier(1, 2), 1.0);
        assert_eq!(Config::default_holding_multiplier(2, 4), 2.0);
    }

    #[test]
    fn limits_ignore_non_positive_time() {
        let config = Config {
            time_limit_secs: Some(0.0),
            mip_gap: Some(0.01),
            ..Config::default()
        };
        let limits = config.limits();
        assert!(limits.time_limit.is_none());
        assert_eq!(limits.mip_gap, Some(0.01));

        let config = Config {
            time_limit_secs: Some(2.5),
            ..Config::default()
        };
        assert_eq!(config.limits().time_limit, Some(Duration::from_millis(2500)));
    }
}

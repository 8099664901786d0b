//! Console and file output of a planning run.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::solution::{Outcome, Plan};
use crate::solvers::SolveStatus;
use crate::Error;

/// Period-1 warehouse shipments, read as the in-transit quantities of the next cycle
pub const REPLENISHMENT_FILE: &str = "replenishment_next.csv";
/// Stock after period 0, read as the starting stock of the next cycle
pub const STOCK_FILE: &str = "outlet_stock_next.csv";

/// Writes the human-readable summary of a run
pub fn summary<W: Write>(out: &mut W, outcome: &Outcome, horizon: usize) -> io::Result<()> {
    let plan = match outcome {
        Outcome::Solved(plan) => plan,
        Outcome::Unsolved { status, .. } => {
            writeln!(out, "\nRESULT:")?;
            return writeln!(
                out,
                "No solution could be obtained for given preferences ({})",
                status
            );
        }
    };

    writeln!(out, "\nRESULT:\n")?;
    for flow in plan.shipments() {
        writeln!(
            out,
            "{} quantity of the product is transferred from {} to {} in week {}",
            flow.quantity, flow.from, flow.to, flow.arc.time
        )?;
    }
    for state in plan.lost_sales() {
        writeln!(
            out,
            "{} is the loss of sales at {} in week {}",
            state.lost_sales, state.outlet, state.vertex.time
        )?;
    }
    if !plan.has_lost_sales() {
        writeln!(out, "\nThere is no loss of sales")?;
    }

    if let SolveStatus::BestEffort { gap } = plan.status() {
        match gap {
            Some(gap) => writeln!(
                out,
                "\nThe plan is the best found, not proven optimal (gap {:.2}%)",
                gap * 100.0
            )?,
            None => writeln!(out, "\nThe plan is the best found, not proven optimal")?,
        }
    }

    writeln!(
        out,
        "\nThe total cost of replenishment and rebalancing for a {} week time horizon is {:.2}",
        horizon,
        plan.total_cost()
    )?;
    writeln!(
        out,
        "The total cost of replenishment and rebalancing for the 1st week is {:.2}",
        plan.first_period_cost()
    )?;
    writeln!(
        out,
        "The runtime of the model is {:.2} seconds",
        plan.runtime().as_secs_f64()
    )
}

fn write_row(path: &Path, values: &[i64]) -> Result<(), Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(values.iter().map(|v| v.to_string()))?;
    writer.flush()?;
    Ok(())
}

/// Writes the flow on every arc as a single row, in arc enumeration order
pub fn write_flows(path: &Path, plan: &Plan) -> Result<(), Error> {
    write_row(path, &plan.flow_values())?;
    info!("Wrote {} arc flows to {}", plan.flows().len(), path.display());
    Ok(())
}

/// Writes the next cycle's in-transit and starting stock files into `dir`
pub fn write_handoff(dir: &Path, plan: &Plan) -> Result<(), Error> {
    fs::create_dir_all(dir)?;
    write_row(&dir.join(REPLENISHMENT_FILE), &plan.replenishment_next())?;
    write_row(&dir.join(STOCK_FILE), &plan.stock_after_first_period())?;
    info!("Wrote next cycle hand-off to {}", dir.display());
    Ok(())
}

/// Optional output files of a run
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    pub flows: Option<PathBuf>,
    pub handoff_dir: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Writes every requested output file. Nothing is written when the run produced no plan.
pub fn write_outputs(outcome: &Outcome, paths: &OutputPaths) -> Result<(), Error> {
    let plan = match outcome.plan() {
        Some(plan) => plan,
        None => {
            info!("No solution, no output files written");
            return Ok(());
        }
    };

    if let Some(path) = &paths.flows {
        write_flows(path, plan)?;
    }
    if let Some(dir) = &paths.handoff_dir {
        write_handoff(dir, plan)?;
    }
    if let Some(path) = &paths.json {
        write_json(path, plan)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated: DateTime<Utc>,
    total_cost: f64,
    first_period_cost: f64,
    lost_sales: bool,
    plan: &'a Plan,
}

/// Writes the interpreted plan as JSON
pub fn write_json(path: &Path, plan: &Plan) -> Result<(), Error> {
    let report = JsonReport {
        generated: Utc::now(),
        total_cost: plan.total_cost(),
        first_period_cost: plan.first_period_cost(),
        lost_sales: plan.has_lost_sales(),
        plan,
    };
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, &report)?;
    out.flush()?;
    info!("Wrote report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::models::rebalancing::model::RebalancingModel;
    use crate::parse::{read_row, tests::temp_file};
    use crate::problem::{tests::small_inputs, Input, Problem};
    use crate::solvers::{microlp::MicroLp, SolveLimits};

    fn solved() -> Outcome {
        let problem = Problem::new(small_inputs(), Config::default()).unwrap();
        let result =
            RebalancingModel::solve(&problem, &MicroLp, &SolveLimits::default(), None).unwrap();
        Outcome::new(&problem, &result)
    }

    #[test]
    fn summary_lists_shipments_and_costs() {
        let outcome = solved();
        let mut out = Vec::new();
        summary(&mut out, &outcome, 2).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text
            .contains("30 quantity of the product is transferred from Paris to Lyon in week 0"));
        assert!(text.contains("There is no loss of sales"));
        assert!(text.contains("for a 2 week time horizon is 64.81"));
        assert!(text.contains("for the 1st week is"));
        assert!(!text.contains("not proven optimal"));
    }

    #[test]
    fn summary_without_solution() {
        let outcome = Outcome::Unsolved {
            status: SolveStatus::Infeasible,
            runtime: Duration::from_millis(1),
        };
        let mut out = Vec::new();
        summary(&mut out, &outcome, 2).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No solution could be obtained for given preferences (infeasible)"));
        assert!(!text.contains("total cost"));
    }

    #[test]
    fn handoff_is_readable_as_next_inputs() {
        let outcome = solved();
        let plan = outcome.plan().unwrap();
        let dir = std::env::temp_dir().join(format!("rebalance-{}", uuid::Uuid::new_v4()));
        write_handoff(&dir, plan).unwrap();

        let in_transit = read_row(&dir.join(REPLENISHMENT_FILE), Input::InTransit).unwrap();
        let stock = read_row(&dir.join(STOCK_FILE), Input::Stock).unwrap();
        assert_eq!(in_transit, vec![0.0, 0.0]);
        assert_eq!(stock.len(), 2);
        assert_eq!(stock.iter().sum::<f64>(), 30.0 - 18.0);
    }

    #[test]
    fn flows_are_one_row() {
        let outcome = solved();
        let plan = outcome.plan().unwrap();
        let path = temp_file("");
        write_flows(&path, plan).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        let values: Vec<i64> = text.trim().split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(values.len(), 8);
        assert_eq!(values[0], 30);
        assert_eq!(values[1], 0);
    }

    #[test]
    fn json_report_carries_costs() {
        let outcome = solved();
        let plan = outcome.plan().unwrap();
        let path = temp_file("");
        write_json(&path, plan).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!((value["total_cost"].as_f64().unwrap() - 64.81).abs() < 1e-6);
        assert_eq!(value["lost_sales"], serde_json::Value::Bool(false));
        assert!(value["generated"].is_string());
        assert_eq!(value["plan"]["flows"].as_array().unwrap().len(), 8);
    }
}

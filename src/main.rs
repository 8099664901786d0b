use std::{io, path::PathBuf};

use clap::Parser;
use log::error;

use rebalance::{
    parse::InputPaths,
    report::{self, OutputPaths},
    solvers::Backend,
    Config, Error,
};

/// Plans replenishment from the warehouse and rebalancing between outlets for a short horizon.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Demand forecast: one row per outlet, one column per period
    #[clap(long)]
    demand: PathBuf,
    /// Starting stock: one row with a value per outlet
    #[clap(long)]
    stock: PathBuf,
    /// Replenishment arriving at the start of period 0: one row with a value per outlet
    #[clap(long)]
    in_transit: PathBuf,
    /// Labelled distance matrix, warehouse first
    #[clap(long)]
    distances: PathBuf,

    /// JSON file with cost rates and modelling choices
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    warehouse_rate: Option<f64>,
    #[clap(long)]
    outlet_rate: Option<f64>,
    #[clap(long)]
    holding_rate: Option<f64>,
    #[clap(long)]
    lost_sales_penalty: Option<f64>,
    /// Minimum order quantity on warehouse shipments
    #[clap(long, allow_hyphen_values = true)]
    moq: Option<i64>,
    /// Number of periods to plan for
    #[clap(long)]
    horizon: Option<usize>,
    /// Solver time limit in seconds
    #[clap(long)]
    time_limit: Option<f64>,
    /// Relative optimality gap at which the solver may stop
    #[clap(long)]
    mip_gap: Option<f64>,
    #[clap(long, default_value = "microlp")]
    solver: Backend,

    /// Where to write the flow on every arc
    #[clap(long)]
    flows_out: Option<PathBuf>,
    /// Directory to write the next cycle's stock and in-transit files to
    #[clap(long)]
    handoff_dir: Option<PathBuf>,
    /// Where to write the plan as JSON
    #[clap(long)]
    json_out: Option<PathBuf>,
    /// Write the model in LP format before solving
    #[clap(long)]
    write_model: Option<PathBuf>,

    /// More logging, may be repeated
    #[clap(short, long, parse(from_occurrences))]
    verbose: usize,
}

impl Args {
    /// Defaults, then the config file, then individual flags
    fn config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(rate) = self.warehouse_rate {
            config.warehouse_rate = rate;
        }
        if let Some(rate) = self.outlet_rate {
            config.outlet_rate = rate;
        }
        if let Some(rate) = self.holding_rate {
            config.holding_rate = rate;
        }
        if let Some(penalty) = self.lost_sales_penalty {
            config.lost_sales_penalty = penalty;
        }
        if let Some(moq) = self.moq {
            config.moq = moq;
        }
        if self.horizon.is_some() {
            config.horizon = self.horizon;
        }
        if self.time_limit.is_some() {
            config.time_limit_secs = self.time_limit;
        }
        if self.mip_gap.is_some() {
            config.mip_gap = self.mip_gap;
        }

        Ok(config)
    }

    fn paths(&self) -> InputPaths {
        InputPaths {
            demand: self.demand.clone(),
            stock: self.stock.clone(),
            in_transit: self.in_transit.clone(),
            distances: self.distances.clone(),
        }
    }

    fn outputs(&self) -> OutputPaths {
        OutputPaths {
            flows: self.flows_out.clone(),
            handoff_dir: self.handoff_dir.clone(),
            json: self.json_out.clone(),
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let config = args.config()?;
    let solver = args.solver.solver();
    let (problem, outcome) = rebalance::run(
        &args.paths(),
        config,
        solver.as_ref(),
        args.write_model.as_deref(),
    )?;

    report::summary(&mut io::stdout().lock(), &outcome, problem.timesteps())?;
    report::write_outputs(&outcome, &args.outputs())
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}

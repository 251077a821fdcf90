use std::path::PathBuf;

use clap::Parser;
use hoverslam::export::{export_policy, render_c_source};
use hoverslam::sim;
use hoverslam::{persistence, report, solve, SolverConfig, State};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hoverslam")]
struct Cli {
    /// JSON solver configuration; defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Solution snapshot. Loaded if it exists, otherwise solved and written here.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the policy as a C lookup table.
    #[arg(long)]
    export_c: Option<PathBuf>,

    /// Print the policy and cost slices closest to this burn time.
    #[arg(long)]
    render_time: Option<f64>,

    /// Random starts to replay after solving.
    #[arg(long)]
    episodes: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> hoverslam::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SolverConfig::load(path)?,
        None => SolverConfig::default(),
    };
    if let Some(episodes) = cli.episodes {
        config.evaluation.episodes = episodes;
    }
    if let Some(seed) = cli.seed {
        config.evaluation.seed = seed;
    }
    config.validate()?;

    let grid = config.grid()?;
    let dynamics = config.dynamics()?;
    let solution = match &cli.snapshot {
        Some(path) => persistence::load_or_solve(path, &grid, &dynamics, &config.loss, &config.solver)?,
        None => solve(&grid, &dynamics, &config.loss, config.solver.clone())?,
    };

    if let Some(path) = &cli.export_c {
        let export = export_policy(solution.grid(), solution.policy())?;
        std::fs::write(path, render_c_source(&export))?;
        info!(path = %path.display(), bytes = export.codes.len(), "Exported policy table");
    }

    if let Some(burn_time) = cli.render_time {
        println!("{}", report::render_policy_slice(&solution, burn_time));
        println!("{}", report::render_cost_heatmap(&solution, burn_time));
    }

    let ignition = solution.grid().times()[solution.grid().times().len() - 1];
    let demo = sim::simulate(
        &solution,
        &dynamics,
        &config.loss,
        &State::new(ignition, 6.0, 20.0),
        &config.simulation,
    );
    let touchdown = demo.last();
    info!(
        outcome = ?demo.outcome,
        expected_cost = solution.interpolate_cost(&demo.states[0]),
        steps = demo.states.len(),
        velocity = touchdown.velocity.0,
        "Replayed descent from {}",
        demo.states[0]
    );

    if config.evaluation.episodes > 0 {
        let results = sim::evaluate(&solution, &dynamics, &config.loss, &config.evaluation);
        info!(
            episodes = results.episodes,
            landed = results.landed,
            crashed = results.crashed,
            stranded = results.stranded,
            no_plan = results.no_plan,
            mean_touchdown_speed = results.mean_touchdown_speed,
            "Landed {:.1}% of random starts",
            results.success_rate() * 100.0
        );
        if results.landed == 0 {
            warn!("No random start reached a landing");
        }
    }
    Ok(())
}

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gridmdp::config::{MdpConfig, Preset};
use gridmdp::format::{format_grid, format_policy, format_q_values, format_values};
use gridmdp::grid::TracingObserver;
use gridmdp::report::{write_trace_csv, TraceSummary};
use gridmdp::{GridWorld, QLearner, Result, ValueIterator};

/// Command line argument parser.
#[derive(Parser, Debug)]
#[command(about = "Solve grid-world MDPs with value iteration and Q-learning", long_about = None)]
pub struct Args {
    /// Path to a TOML problem description. Overrides --preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in problem used when no config file is given.
    #[arg(long, value_enum, default_value_t = Preset::RussellNorvig)]
    preset: Preset,

    /// Seed for the world's and the learner's random number generators.
    #[arg(long)]
    seed: Option<u64>,

    /// Execute every action exactly as intended.
    #[arg(long)]
    deterministic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the landscape.
    Show,
    /// Run value iteration and print values and policy.
    Values {
        /// Override the configured discount factor.
        #[arg(long)]
        gamma: Option<f64>,
        /// Override the configured convergence threshold.
        #[arg(long)]
        theta: Option<f64>,
    },
    /// Run Q-learning, print the learned policy and write the reward trace.
    Learn {
        /// Override the configured number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// CSV file receiving one row per epoch.
        #[arg(long, default_value = "cumulative_rewards.csv")]
        output: PathBuf,
        /// Log every step at trace level.
        #[arg(long)]
        trace_steps: bool,
    },
    /// Run both solvers and report how often their policies agree.
    Compare,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => MdpConfig::load(path)?,
        None => MdpConfig::preset(args.preset),
    };
    if args.deterministic {
        config.deterministic = true;
    }
    if args.seed.is_some() {
        config.q_learning.seed = args.seed;
    }
    let build = |learning: bool| -> Result<GridWorld> {
        let mut grid = if learning { config.build_learning_world()? } else { config.build_world()? };
        if let Some(seed) = args.seed {
            grid.reseed(seed);
        }
        Ok(grid)
    };

    match &args.command {
        Commands::Show => {
            print!("{}", format_grid(&build(false)?));
        }
        Commands::Values { gamma, theta } => {
            let mut vi_config = config.value_iteration;
            vi_config.gamma = gamma.unwrap_or(vi_config.gamma);
            vi_config.theta = theta.unwrap_or(vi_config.theta);
            let grid = build(false)?;
            let mut vi = ValueIterator::new(&grid, vi_config);
            let solution = vi.run();
            info!(convergence = ?solution.convergence, "value iteration done");
            print!("{}", format_values(&grid, &solution.values, 2));
            print!("{}", format_policy(&grid, &solution.policy));
        }
        Commands::Learn { epochs, output, trace_steps } => {
            let mut grid = build(true)?;
            let mut ql_config = config.q_learning;
            ql_config.epochs = epochs.unwrap_or(ql_config.epochs);
            if *trace_steps {
                grid.subscribe(Box::new(TracingObserver));
            }
            let learner = learn(&mut grid, ql_config)?;
            print!("{}", format_q_values(&grid, learner.q_table(), 2));
            print!("{}", format_policy(&grid, &learner.policy(&grid)));
            info!(path = %output.display(), "writing reward trace");
            write_trace_csv(File::create(output)?, learner.trace())?;
        }
        Commands::Compare => {
            let grid = build(false)?;
            let solution = ValueIterator::new(&grid, config.value_iteration).run();
            let mut learning_grid = build(true)?;
            let learner = learn(&mut learning_grid, config.q_learning)?;
            let learned = learner.policy(&grid);
            let cells = grid.non_terminal_positions().count();
            let agree = solution.policy.agreement(&learned);
            print!("{}", format_policy(&grid, &solution.policy));
            print!("{}", format_policy(&grid, &learned));
            println!("Policies agree on {agree} of {cells} cells");
        }
    }
    Ok(())
}

fn learn(grid: &mut GridWorld, config: gridmdp::QLearningConfig) -> Result<QLearner> {
    let mut learner = QLearner::for_grid(grid, config);
    learner.train(grid)?;
    if let Some(s) = TraceSummary::from_trace(learner.trace()) {
        info!(
            epochs = s.epochs,
            mean = s.mean,
            std_dev = s.std_dev,
            min = s.min,
            max = s.max,
            mean_steps = s.mean_steps,
            cumulative = s.cumulative,
            "episode rewards"
        );
    }
    Ok(learner)
}

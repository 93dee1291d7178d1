use anyhow::{Context, Result};
use book_recommender_core::{
    init_tracing, load_dotenv, ConfigLoader, RecommenderConfig, Stage, TelemetryConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

/// Exit code for a title (or poster) that could not be found
const EXIT_NOT_FOUND: i32 = 2;

#[derive(Parser)]
#[command(name = "bookrec")]
#[command(about = "Train and query the collaborative-filtering book recommender", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        env = "BOOK_RECOMMENDER_CONFIG",
        help = "Configuration file (default: config/recommender.*)"
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the training pipeline")]
    Train {
        #[arg(
            long,
            value_enum,
            default_value = "validation",
            help = "First stage to run; earlier stages reuse their saved output"
        )]
        from_stage: StageArg,
    },

    #[command(about = "Recommend books similar to a title")]
    Recommend {
        #[arg(help = "Exact book title")]
        title: String,

        #[arg(long, help = "Print the result as JSON")]
        json: bool,
    },

    #[command(about = "List the titles that can be queried")]
    Titles {
        #[arg(short, long, help = "Print at most this many titles")]
        limit: Option<usize>,
    },

    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    Validation,
    Transformation,
    Model,
}

impl From<StageArg> for Stage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Validation => Stage::Validation,
            StageArg::Transformation => Stage::Transformation,
            StageArg::Model => Stage::ModelTraining,
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    load_dotenv();

    let cli = Cli::parse();

    let telemetry = TelemetryConfig::from_env()?;
    let guard = init_tracing(&telemetry).context("failed to initialize logging")?;

    let config = RecommenderConfig::load(cli.config.as_deref())?;
    config.validate()?;

    let code = match cli.command {
        Commands::Train { from_stage } => {
            commands::train(config, from_stage.into()).await?;
            0
        }
        Commands::Recommend { title, json } => {
            if commands::recommend(config, &title, json)? {
                0
            } else {
                EXIT_NOT_FOUND
            }
        }
        Commands::Titles { limit } => {
            commands::titles(config, limit)?;
            0
        }
        Commands::Config => {
            commands::show_config(&config)?;
            0
        }
    };

    guard.shutdown();
    Ok(code)
}

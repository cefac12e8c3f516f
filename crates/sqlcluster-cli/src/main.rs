use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod display;
mod repl;

use commands::*;
use config::{Config, OutputFormat};
use repl::Repl;

#[derive(Parser)]
#[command(name = "sqlcluster")]
#[command(author, version, about = "sqlcluster - distributed SQL over partitioned Arrow tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of worker processes, overriding the configuration file
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl {
        /// Tables to load on startup (format: name=path[,path...])
        #[arg(short, long)]
        load: Vec<String>,
    },

    /// Load tables and run one query across the cluster
    Query {
        /// Tables to load (format: name=path[,path...])
        #[arg(short, long)]
        load: Vec<String>,

        /// SQL query to execute
        #[arg(short, long)]
        sql: String,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Show the relational plan of a query
    Explain {
        /// Tables to load (format: name=path[,path...])
        #[arg(short, long)]
        load: Vec<String>,

        /// SQL query to explain
        #[arg(short, long)]
        sql: String,

        /// Include the physical plan with row counts
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show how files would be sliced among participants
    Slices {
        /// Source files, in order
        #[arg(short, long, required = true, num_args = 1..)]
        file: Vec<String>,

        /// Number of participants
        #[arg(short, long)]
        parts: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    match cli.command {
        Some(Commands::Query { load, sql, output }) => {
            let output = output.unwrap_or(config.output_format);
            execute_query(&config, &load, &sql, output).await?;
        }
        Some(Commands::Explain {
            load,
            sql,
            detailed,
        }) => {
            explain_query(&config, &load, &sql, detailed).await?;
        }
        Some(Commands::Slices { file, parts }) => {
            show_slices(&file, parts)?;
        }
        Some(Commands::Repl { load }) => {
            run_repl(config, &load).await?;
        }
        None => {
            run_repl(config, &[]).await?;
        }
    }

    Ok(())
}

async fn run_repl(config: Config, load: &[String]) -> Result<()> {
    print_banner();
    let cluster = start_cluster(&config).await?;
    if let Err(e) = load_tables(&cluster, load).await {
        cluster.stop();
        return Err(e);
    }
    let mut repl = Repl::new(config, cluster)?;
    repl.run().await
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "sqlcluster_cli=debug,sqlcluster_core=debug,sqlcluster_partition=debug,sqlcluster_context=debug,sqlcluster_distributed=debug"
    } else {
        "sqlcluster_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
           _      _           _
 ___  __ _| | ___| |_   _ ___| |_ ___ _ __
/ __|/ _` | |/ __| | | | / __| __/ _ \ '__|
\__ \ (_| | | (__| | |_| \__ \ ||  __/ |
|___/\__, |_|\___|_|\__,_|___/\__\___|_|
        |_|
    "#
        .bright_cyan()
    );
    println!(
        "{}",
        format!("Distributed SQL over Arrow partitions v{}", env!("CARGO_PKG_VERSION")).bright_yellow()
    );
}

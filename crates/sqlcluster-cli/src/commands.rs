use crate::config::{Config, OutputFormat};
use crate::display::{print_batch, slices_table};
use anyhow::{Context, Result};
use colored::Colorize;
use sqlcluster_core::{SourceKind, TableReference};
use sqlcluster_distributed::ClusterCoordinator;
use sqlcluster_partition::PartitionPlanner;
use std::time::Instant;

/// Parse a `name=path[,path...]` table definition
pub fn parse_load(definition: &str) -> Result<TableReference> {
    let (name, paths) = definition
        .split_once('=')
        .with_context(|| format!("Expected name=path, got '{}'", definition))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Missing table name in '{}'", definition);
    }

    let files: Vec<String> = paths
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    let first = files
        .first()
        .with_context(|| format!("No files given for table '{}'", name))?;
    let kind = source_kind(first)?;
    for file in &files[1..] {
        if source_kind(file)? != kind {
            anyhow::bail!("Table '{}' mixes {} and {} files", name, kind, source_kind(file)?);
        }
    }

    Ok(TableReference::new(name, kind, files))
}

fn source_kind(path: &str) -> Result<SourceKind> {
    SourceKind::from_path(path)
        .with_context(|| format!("Unsupported file format: {} (use .csv, .tsv, .psv or .parquet)", path))
}

pub async fn start_cluster(config: &Config) -> Result<ClusterCoordinator> {
    let cluster = ClusterCoordinator::init(config.workers, config.cluster.clone())
        .await
        .context("Failed to start cluster")?;
    println!(
        "{} Cluster {} up with {} workers",
        "✓".bright_green(),
        cluster.id().to_string().bright_cyan(),
        config.workers
    );
    Ok(cluster)
}

pub async fn load_tables(cluster: &ClusterCoordinator, loads: &[String]) -> Result<()> {
    for definition in loads {
        let table = parse_load(definition)?;
        let name = table.name().to_string();
        tracing::debug!("Loading '{}' from {} {} files", name, table.locations().len(), table.kind());
        cluster
            .create_table_from_source(table)
            .await
            .with_context(|| format!("Failed to load table '{}'", name))?;
        println!("{} Loaded table '{}'", "✓".bright_green(), name.bright_cyan());
    }
    Ok(())
}

pub async fn execute_query(
    config: &Config,
    loads: &[String],
    sql: &str,
    output: OutputFormat,
) -> Result<()> {
    let cluster = start_cluster(config).await?;
    let result = run_loaded(&cluster, loads, sql, output, config).await;
    cluster.stop();
    result
}

async fn run_loaded(
    cluster: &ClusterCoordinator,
    loads: &[String],
    sql: &str,
    output: OutputFormat,
    config: &Config,
) -> Result<()> {
    load_tables(cluster, loads).await?;

    println!("{} Executing query...", "→".bright_blue());
    let start = Instant::now();
    let batch = cluster.sql(sql).await?;
    let elapsed = start.elapsed();

    print_batch(&batch, output, config.max_rows)?;
    if config.show_timing {
        println!(
            "{} {} rows in {:.2}ms",
            "Query time:".bright_yellow(),
            batch.num_rows(),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

pub async fn explain_query(config: &Config, loads: &[String], sql: &str, detailed: bool) -> Result<()> {
    let cluster = start_cluster(config).await?;
    let result = async {
        load_tables(&cluster, loads).await?;
        let plan = cluster.explain(sql, detailed)?;
        println!("{}", plan);
        Ok::<_, anyhow::Error>(())
    }
    .await;
    cluster.stop();
    result
}

/// Print how `files` would be sliced among `parts` participants
pub fn show_slices(files: &[String], parts: usize) -> Result<()> {
    let definition = format!("slices={}", files.join(","));
    let table = parse_load(&definition)?;
    let planner = PartitionPlanner::new(parts)?;
    let slices = planner.plan_table(&table)?;

    println!(
        "{} {} files over {} participants",
        "Slice plan:".bright_yellow().bold(),
        files.len(),
        parts
    );
    println!("{}", slices_table(&slices));
    Ok(())
}

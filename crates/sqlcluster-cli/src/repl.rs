use crate::commands::parse_load;
use crate::config::{Config, OutputFormat};
use crate::display::{columns_table, print_batch, status_table};
use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use sqlcluster_distributed::ClusterCoordinator;
use std::path::PathBuf;
use std::time::Instant;

/// What the REPL should do after a line
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    config: Config,
    cluster: ClusterCoordinator,
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl Repl {
    pub fn new(config: Config, cluster: ClusterCoordinator) -> Result<Self> {
        let history_file = Self::get_history_file().ok();
        let mut editor = DefaultEditor::new()?;

        if let Some(path) = &history_file {
            let _ = editor.load_history(path);
        }

        Ok(Self {
            config,
            cluster,
            editor,
            history_file,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{}", "Interactive sqlcluster REPL".bright_green().bold());
        println!(
            "Type {} for commands, {} to exit\n",
            ".help".bright_cyan(),
            ".quit".bright_cyan()
        );

        loop {
            let prompt = format!("{} ", "sqlcluster>".bright_green().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.editor.add_history_entry(line)?;

                    match self.handle_input(line).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => eprintln!("{} {:#}", "Error:".bright_red().bold(), e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".bright_yellow());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "exit".bright_yellow());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {:?}", "Error:".bright_red().bold(), err);
                    break;
                }
            }
        }

        if let Some(path) = &self.history_file {
            self.editor.save_history(path)?;
        }
        tracing::debug!("Stopping {} on REPL exit", self.cluster.id());
        self.cluster.stop();

        println!("{}", "Goodbye!".bright_cyan());
        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<Flow> {
        if input.starts_with('.') {
            self.handle_command(input).await
        } else {
            self.handle_sql(input.trim_end_matches(';')).await?;
            Ok(Flow::Continue)
        }
    }

    async fn handle_command(&mut self, cmd: &str) -> Result<Flow> {
        let (command, rest) = cmd.split_once(char::is_whitespace).unwrap_or((cmd, ""));
        let rest = rest.trim();

        match command {
            ".help" | ".h" => self.show_help(),
            ".quit" | ".q" | ".exit" => return Ok(Flow::Quit),
            ".tables" => self.show_tables()?,
            ".load" => {
                if rest.is_empty() {
                    anyhow::bail!("Usage: .load <name>=<path>[,<path>...]");
                }
                let table = parse_load(rest)?;
                let name = table.name().to_string();
                let start = Instant::now();
                self.cluster.create_table_from_source(table).await?;
                println!(
                    "{} Loaded table '{}' in {:.2}ms",
                    "✓".bright_green(),
                    name.bright_cyan(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ".describe" | ".desc" => {
                if rest.is_empty() {
                    anyhow::bail!("Usage: .describe <table_name>");
                }
                let columns = self.cluster.describe_table(rest)?;
                println!("\n{} {}", "Table:".bright_yellow().bold(), rest.bright_cyan());
                println!("{}", columns_table(&columns));
            }
            ".drop" => {
                if rest.is_empty() {
                    anyhow::bail!("Usage: .drop <table_name>");
                }
                self.cluster.drop_table(rest).await?;
                println!("{} Dropped table '{}'", "✓".bright_green(), rest.bright_cyan());
            }
            ".explain" => {
                let (detailed, query) = match rest.strip_prefix("analyze") {
                    Some(query) => (true, query.trim()),
                    None => (false, rest),
                };
                if query.is_empty() {
                    anyhow::bail!("Usage: .explain [analyze] <query>");
                }
                println!("{}", self.cluster.explain(query, detailed)?);
            }
            ".status" => println!("{}", status_table(&self.cluster.status())),
            ".timing" => {
                self.config.show_timing = !self.config.show_timing;
                println!(
                    "Timing is now {}",
                    if self.config.show_timing {
                        "ON".bright_green()
                    } else {
                        "OFF".bright_red()
                    }
                );
            }
            ".format" => {
                self.config.output_format = match rest {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "csv" => OutputFormat::Csv,
                    _ => anyhow::bail!("Usage: .format <table|json|csv>"),
                };
                println!("Output format set to {}", rest.bright_cyan());
            }
            ".clear" => print!("\x1B[2J\x1B[1;1H"),
            _ => anyhow::bail!("Unknown command: {} (try .help)", command),
        }
        Ok(Flow::Continue)
    }

    async fn handle_sql(&mut self, sql: &str) -> Result<()> {
        let start = Instant::now();
        let batch = self.cluster.sql(sql).await?;
        let elapsed = start.elapsed();

        print_batch(&batch, self.config.output_format, self.config.max_rows)?;
        if self.config.show_timing {
            println!(
                "{} {} rows in {:.2}ms",
                "Query time:".bright_yellow(),
                batch.num_rows(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        Ok(())
    }

    fn show_help(&self) {
        let mut table = ComfyTable::new();
        table.set_header(vec![
            Cell::new("Command").fg(Color::Cyan),
            Cell::new("Description").fg(Color::Yellow),
        ]);

        let commands = vec![
            (".help, .h", "Show this help message"),
            (".quit, .q, .exit", "Stop the cluster and exit"),
            (".tables", "List distributed tables"),
            (".load <name>=<path>[,<path>...]", "Partition CSV or Parquet files into a table"),
            (".describe <table>", "Show table columns"),
            (".drop <table>", "Drop a table on every participant"),
            (".explain [analyze] <query>", "Show the relational plan"),
            (".status", "Show cluster membership and state"),
            (".timing", "Toggle query timing display"),
            (".format <type>", "Set output format (table|json|csv)"),
            (".clear", "Clear the screen"),
        ];
        for (cmd, desc) in commands {
            table.add_row(vec![cmd, desc]);
        }

        println!("{}", table);
        println!();
        println!("{}", "SQL:".bright_yellow().bold());
        println!("  SELECT <columns|*> FROM <table> [WHERE a AND b ...] [LIMIT n]");
        println!();
    }

    fn show_tables(&self) -> Result<()> {
        let tables = self.cluster.list_tables()?;
        if tables.is_empty() {
            println!("{}", "No tables registered".bright_yellow());
            println!("Use {} to load files", ".load name=path".bright_cyan());
            return Ok(());
        }

        let mut table = ComfyTable::new();
        table.set_header(vec![
            Cell::new("Table Name").fg(Color::Cyan),
            Cell::new("Columns").fg(Color::Green),
        ]);
        for name in tables {
            let columns = self.cluster.describe_table(&name)?.len();
            table.add_row(vec![name, columns.to_string()]);
        }
        println!("{}", table);
        Ok(())
    }

    fn get_history_file() -> Result<PathBuf> {
        let home = home::home_dir().context("Could not find home directory")?;
        let history_dir = home.join(".sqlcluster");
        std::fs::create_dir_all(&history_dir)?;
        Ok(history_dir.join("history.txt"))
    }
}

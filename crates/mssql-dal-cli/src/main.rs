//! mssql-dal CLI - run one data-access operation against SQL Server.

use clap::{Parser, Subcommand};
use mssql_dal::config::CONNECTION_STRING_ENV;
use mssql_dal::{AlterDatabase, Config, DalError, ErrorPolicy, QueryDatabase, Snapshot, SqlEngine};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-dal")]
#[command(about = "Generic SQL Server data access from the command line")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// ADO.NET connection string (overrides the configuration file)
    #[arg(long)]
    connection_string: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Return faults as errors instead of printing them and continuing
    #[arg(long)]
    propagate_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured database if it does not exist
    CreateDatabase,

    /// Create a table if it does not exist
    CreateTable {
        /// Table name
        table: String,

        /// Column definitions, e.g. "Id INT IDENTITY(1,1) PRIMARY KEY, Name NVARCHAR(50)"
        structure: String,
    },

    /// Alter a table, e.g. "ADD Age INT"
    AlterTable {
        /// Table name
        table: String,

        /// Alter clause
        structure: String,
    },

    /// Insert a row and print its identity
    Insert {
        /// Table name
        table: String,

        /// Comma-space separated column names; the first is the key
        columns: String,

        /// Comma-space separated SQL values, in column order
        values: String,

        /// Insert unconditionally (no key guard, no identity insert)
        #[arg(long)]
        parent: bool,
    },

    /// Update rows matching raw criteria
    Update {
        /// Table name
        table: String,

        /// SET clause, e.g. "Name = 'Ann', Age = 30"
        assignments: String,

        /// WHERE clause
        criteria: String,
    },

    /// Delete rows by key
    Delete {
        /// Table name
        table: String,

        /// Key column name
        pk_name: String,

        /// Key value as SQL text
        pk_id: String,
    },

    /// Print a table or query result
    GetTable {
        /// Table name
        table: String,

        /// Query to run instead of SELECT * FROM <table>
        #[arg(long)]
        query: Option<String>,

        /// Load without key metadata
        #[arg(long)]
        read_only: bool,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), DalError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(DalError::Config)?;

    let config = load_config(&cli)?;
    let engine = SqlEngine::connect(&config);

    match cli.command {
        Commands::CreateDatabase => {
            engine.create_database().await?;
            report(cli.output_json, "create-database", json!(null), "Done");
        }

        Commands::CreateTable { table, structure } => {
            engine.create_database_table(&table, &structure).await?;
            report(cli.output_json, "create-table", json!(null), "Done");
        }

        Commands::AlterTable { table, structure } => {
            engine.alter_database_table(&table, &structure).await?;
            report(cli.output_json, "alter-table", json!(null), "Done");
        }

        Commands::Insert {
            table,
            columns,
            values,
            parent,
        } => {
            let id = if parent {
                engine.insert_parent_record(&table, &columns, &values).await?
            } else {
                engine.insert_record(&table, &columns, &values).await?
            };
            report(cli.output_json, "insert", json!(id), &format!("Identity: {}", id));
        }

        Commands::Update {
            table,
            assignments,
            criteria,
        } => {
            let ok = engine.update_record(&table, &assignments, &criteria).await?;
            report(cli.output_json, "update", json!(ok), &format!("Success: {}", ok));
        }

        Commands::Delete {
            table,
            pk_name,
            pk_id,
        } => {
            engine.delete_record(&table, &pk_name, &pk_id).await?;
            report(cli.output_json, "delete", json!(null), "Done");
        }

        Commands::GetTable {
            table,
            query,
            read_only,
        } => {
            let snapshot = match query {
                Some(query) => engine.get_data_table_by_query_as(&query, &table, read_only).await?,
                None => engine.get_data_table_as(&table, read_only).await?,
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", render_table(&snapshot));
                println!("({} rows)", snapshot.len());
            }
        }

        Commands::HealthCheck => {
            let start = std::time::Instant::now();
            let result = engine.health_check().await;
            let latency_ms = start.elapsed().as_millis() as u64;

            if cli.output_json {
                let body = json!({
                    "server": engine.server(),
                    "database": engine.database(),
                    "connected": result.is_ok(),
                    "latency_ms": latency_ms,
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  SQL Server {}/{}: {} ({}ms)",
                    engine.server(),
                    engine.database(),
                    if result.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
            }

            result?;
        }
    }

    Ok(())
}

/// Resolve configuration: `--connection-string`, then the config file, then
/// the `ConnectionString` environment variable when the file is absent.
fn load_config(cli: &Cli) -> Result<Config, DalError> {
    let mut config = if let Some(ref connection_string) = cli.connection_string {
        Config::from_connection_string(connection_string)?
    } else if !cli.config.exists() && std::env::var_os(CONNECTION_STRING_ENV).is_some() {
        info!("{:?} not found, using {}", cli.config, CONNECTION_STRING_ENV);
        Config::from_env()?
    } else {
        let config = Config::load(&cli.config)?;
        info!("Loaded configuration from {:?}", cli.config);
        config
    };

    if cli.propagate_errors {
        config.engine.error_policy = ErrorPolicy::Propagate;
    }
    Ok(config)
}

fn report(output_json: bool, operation: &str, result: serde_json::Value, text: &str) {
    if output_json {
        println!("{}", json!({ "operation": operation, "result": result }));
    } else {
        println!("{}", text);
    }
}

/// Plain-text grid of the snapshot's live rows.
fn render_table(snapshot: &Snapshot) -> String {
    let header: Vec<String> = snapshot.columns().iter().map(|c| c.name.clone()).collect();
    let body: Vec<Vec<String>> = snapshot
        .rows()
        .iter()
        .filter(|r| r.state() != mssql_dal::RowState::Deleted)
        .map(|r| r.values().iter().map(|v| v.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = line(&header);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("-+-")));
    for row in &body {
        out.push_str(&line(row));
    }
    out
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays clean for results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

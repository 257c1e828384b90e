mod logging;
mod seed;
mod workforce;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tenancy_db::{DataConfig, Engine, Repositories, bootstrap_schema, schema_diff};
use tracing::{info, warn};
use uuid::Uuid;

/// Schema, parity and seeding tool for the workforce data layer
#[derive(Parser)]
#[command(name = "workforce-data", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Engine override (sea_orm or sqlx); defaults to `database.active_engine`
    #[arg(long, global = true)]
    engine: Option<Engine>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seal the catalog, run the static parity check and validate configuration
    Check,
    /// Create every table, index and join table through the chosen engine
    Bootstrap,
    /// Compare the live schema with the catalog through both engines
    SchemaDiff,
    /// Upsert demo rows for one tenant and organization
    Seed {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long)]
        organization: Uuid,
    },
    /// Print the effective configuration (YAML) and exit
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let mut config = DataConfig::load(cli.config.as_deref())?;
    if let Some(engine) = cli.engine {
        config.database.active_engine = engine;
    }

    match cli.command {
        Commands::Check => check(&config),
        Commands::Bootstrap => bootstrap(&config).await,
        Commands::SchemaDiff => diff(&config).await,
        Commands::Seed {
            tenant,
            organization,
        } => run_seed(&config, tenant, organization).await,
        Commands::PrintConfig => {
            print!("{}", serde_saphyr::to_string(&config)?);
            Ok(())
        }
    }
}

fn check(config: &DataConfig) -> Result<()> {
    let catalog = workforce::catalog()?;
    for desc in catalog.entities() {
        println!(
            "{:<14} scope={:<13} columns={:<3} relations={}",
            desc.table(),
            desc.scope().as_str(),
            desc.columns().len(),
            desc.relations().len()
        );
    }
    for join in catalog.join_tables() {
        println!("{:<14} join table owned by {}", join.name, join.owner);
    }
    println!(
        "catalog sealed; active engine {}, dsn {}",
        config.database.active_engine, config.database.dsn
    );
    Ok(())
}

async fn connect(config: &DataConfig) -> Result<Repositories> {
    let repos = Repositories::connect(config, workforce::catalog()?).await?;
    if repos.handle().dsn().contains(":memory:") {
        warn!("in-memory database; nothing survives this process");
    }
    Ok(repos)
}

async fn bootstrap(config: &DataConfig) -> Result<()> {
    let repos = connect(config).await?;
    let engine = repos.active_engine();
    bootstrap_schema(&repos, engine).await?;
    println!(
        "bootstrapped {} tables and {} join tables via {engine}",
        repos.catalog().entities().len(),
        repos.catalog().join_tables().len()
    );
    Ok(())
}

async fn diff(config: &DataConfig) -> Result<()> {
    let repos = connect(config).await?;
    let diff = schema_diff(&repos).await?;
    for mismatch in &diff.mismatches {
        println!("{mismatch}");
    }
    if !diff.is_clean() {
        bail!(
            "{} mismatches across {} tables",
            diff.mismatches.len(),
            diff.tables_checked
        );
    }
    println!("schema clean: {} tables checked", diff.tables_checked);
    Ok(())
}

async fn run_seed(config: &DataConfig, tenant: Uuid, organization: Uuid) -> Result<()> {
    let repos = connect(config).await?;
    bootstrap_schema(&repos, repos.active_engine()).await?;
    let report = seed::seed(&repos, tenant, organization).await?;
    info!(engine = %repos.active_engine(), "seeded");
    println!(
        "seeded organization {organization}: {} departments, {} employees, {} tags, {} new links",
        report.departments, report.employees, report.tags, report.new_links
    );
    Ok(())
}

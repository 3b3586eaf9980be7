//! oxide-migrate CLI
//!
//! Command-line tool for managing database migrations.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_migrate::prelude::*;
use oxide_schema::{
    DialectKind, Differ, MigrationDialect, PostgresDialect, SchemaDefinition, SqliteDialect,
};

/// Snapshot-driven database migrations.
#[derive(Parser)]
#[command(name = "oxide-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON). Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Target dialect (sqlite or postgres).
    #[arg(long, env = "OXIDE_MIGRATE_DIALECT")]
    dialect: Option<DialectKind>,

    /// Migrations directory.
    #[arg(short, long)]
    migrations_dir: Option<PathBuf>,

    /// Snapshot file of the last applied schema.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Refuse destructive changes.
    #[arg(long, env = "OXIDE_MIGRATE_PRODUCTION")]
    production: bool,

    /// Allow destructive changes under --production.
    #[arg(long)]
    allow_destructive: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a migration for the current schema and apply it.
    Generate {
        /// Schema definition file (JSON).
        #[arg(short, long)]
        schema: PathBuf,

        /// Migration name.
        #[arg(short, long)]
        name: String,

        /// Show SQL and classification without writing or executing.
        #[arg(long)]
        dry_run: bool,

        /// Print the dry run as JSON.
        #[arg(long, requires = "dry_run")]
        json: bool,
    },

    /// Apply pending migrations.
    Migrate {
        /// Schema definition to record as applied once everything succeeded.
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Apply the schema directly, without a migration file.
    Push {
        /// Schema definition file (JSON).
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Show migration status.
    Status,

    /// Initialize the migrations system (create history table).
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_config(&cli)?;

    // Connect lazily so dry runs never touch the database
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.database_url)
        .with_context(|| format!("invalid database URL '{}'", config.database_url))?;

    match config.dialect {
        DialectKind::Sqlite => run(SqliteDialect::new(), &config, pool, cli.command).await,
        DialectKind::Postgres => run(PostgresDialect::new(), &config, pool, cli.command).await,
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<MigrateConfig> {
    let mut config = match &cli.config {
        Some(path) => MigrateConfig::load(path)?,
        None => MigrateConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.database_url.clone_from(database);
    }
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_dir.clone_from(dir);
    }
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot_path.clone_from(snapshot);
    }
    config.production |= cli.production;
    config.allow_destructive |= cli.allow_destructive;
    config.validate()?;
    Ok(config)
}

fn read_schema(path: &Path) -> anyhow::Result<SchemaDefinition> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read schema file '{}'", path.display()))?;
    SchemaDefinition::from_json(&json)
        .with_context(|| format!("invalid schema file '{}'", path.display()))
}

async fn run<D: MigrationDialect>(
    dialect: D,
    config: &MigrateConfig,
    pool: AnyPool,
    command: Commands,
) -> anyhow::Result<()> {
    let runner =
        MigrationRunner::new(dialect, config.policy()).with_options(config.runner_options());
    let workflow = Workflow::new(
        runner,
        MigrationHistory::new(pool),
        SnapshotStore::new(&config.snapshot_path),
        &config.migrations_dir,
    )
    .with_differ(Differ::new(config.rename)?);

    match command {
        Commands::Init => {
            info!("Initializing migrations system...");
            workflow.init().await?;
            info!(
                dir = %workflow.migrations_dir().display(),
                "Migrations table created successfully."
            );
        }

        Commands::Generate {
            schema,
            name,
            dry_run,
            json,
        } => {
            let schema = read_schema(&schema)?;
            if dry_run {
                let preview = workflow.preview(&schema)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&preview)?);
                } else {
                    print_dry_run(&preview);
                }
                return Ok(());
            }

            match workflow.generate_and_apply(&schema, &name).await? {
                Some(generated) => info!(
                    path = %generated.path.display(),
                    statements = generated.record.statements_applied,
                    "Migration generated and applied"
                ),
                None => info!("Nothing to do"),
            }
        }

        Commands::Migrate { schema } => {
            let schema = schema.as_deref().map(read_schema).transpose()?;
            let applied = workflow.apply_pending(schema.as_ref()).await?;
            for record in &applied {
                info!(version = record.id, name = %record.name, "Applied");
            }
        }

        Commands::Push { schema } => {
            warn!("Pushing schema without a migration file (development shortcut)");
            let schema = read_schema(&schema)?;
            match workflow.push(&schema).await? {
                Some(record) => info!(name = %record.name, "Schema pushed"),
                None => info!("Nothing to do"),
            }
        }

        Commands::Status => {
            let entries = workflow.status().await?;
            if entries.is_empty() {
                info!("No migrations found.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for entry in &entries {
                    let mark = match entry.state {
                        MigrationState::Applied => "[X]",
                        MigrationState::Failed => "[!]",
                        _ => "[ ]",
                    };
                    let when = entry
                        .applied_at
                        .map(|t| format!(" ({})", t.format("%Y-%m-%d %H:%M:%S")))
                        .unwrap_or_default();
                    let note = match (entry.state, entry.has_artifact) {
                        (MigrationState::Failed, _) => format!(
                            " failed after {} statement(s), manual recovery required",
                            entry.statements_applied.unwrap_or_default()
                        ),
                        (_, false) => " no migration file".to_string(),
                        _ => String::new(),
                    };
                    println!(" {mark} {}_{}{when}{note}", entry.version, entry.name);
                }
                println!();
            }
        }
    }

    Ok(())
}

fn print_dry_run(preview: &DryRun) {
    println!("-- Classification: {}", preview.classification);
    for change in &preview.destructive {
        println!("-- Destructive: {change}");
    }
    if preview.statements.is_empty() {
        println!("-- No statements");
    }
    for statement in &preview.statements {
        println!("{statement}");
    }
    if !preview.reverse.is_empty() {
        println!("\n-- Reverse (reference only):");
        for statement in &preview.reverse {
            println!("-- {statement}");
        }
    }
}

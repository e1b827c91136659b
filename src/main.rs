use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sales_warehouse::config::mask_database_url;
use sales_warehouse::extract::{read_raw_file, ApiExtractor, RawLanding};
use sales_warehouse::store::SchemaStore;
use sales_warehouse::{
    MemoryWarehouse, PgWarehouse, PhaseError, Pipeline, PipelineReport, WarehouseConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "sales-warehouse",
    about = "Load e-commerce sales into a star-schema warehouse."
)]
struct Cli {
    /// PostgreSQL connection URL; overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract from the API, land, cleanse, stage and populate the warehouse.
    Run,
    /// Populate dimensions and facts from the current staging table.
    Populate {
        /// Use an in-memory warehouse seeded from --raw-file instead of PostgreSQL.
        #[arg(long, requires = "raw_file")]
        dry_run: bool,

        /// Raw JSON extraction used to seed staging in a dry run.
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        raw_file: Option<PathBuf>,
    },
    /// Cleanse a raw JSON extraction and replace the staging table with it.
    LoadStaging {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Stage into an in-memory warehouse and print the report only.
        #[arg(long)]
        dry_run: bool,
    },
    /// Create any missing warehouse tables, constraints and indexes.
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sales_warehouse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = WarehouseConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }

    match cli.command {
        Command::Run => {
            let warehouse = connect(&config).await?;
            let extractor =
                ApiExtractor::new(config.require_api_base_url()?, config.api_timeout)?;
            let landing = RawLanding::new(&config.raw_data_dir);
            finish(Pipeline::new(&warehouse).run(&extractor, &landing).await)
        }
        Command::Populate {
            dry_run: true,
            raw_file: Some(raw_file),
        } => {
            let raw = read_raw_file(&raw_file)
                .await
                .with_context(|| format!("reading {}", raw_file.display()))?;
            let warehouse = MemoryWarehouse::new();
            let pipeline = Pipeline::new(&warehouse);
            finish(pipeline.load_staging(&raw).await)?;
            finish(pipeline.populate().await)
        }
        Command::Populate { .. } => {
            let warehouse = connect(&config).await?;
            finish(Pipeline::new(&warehouse).populate().await)
        }
        Command::LoadStaging { file, dry_run } => {
            let raw = read_raw_file(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            if dry_run {
                let warehouse = MemoryWarehouse::new();
                finish(Pipeline::new(&warehouse).load_staging(&raw).await)
            } else {
                let warehouse = connect(&config).await?;
                finish(Pipeline::new(&warehouse).load_staging(&raw).await)
            }
        }
        Command::Schema => {
            let warehouse = connect(&config).await?;
            warehouse.ensure_schema().await?;
            info!("Warehouse schema is up to date");
            Ok(())
        }
    }
}

async fn connect(config: &WarehouseConfig) -> anyhow::Result<PgWarehouse> {
    let database_url = config.require_database_url()?;
    info!("Connecting to {}", mask_database_url(database_url));
    Ok(PgWarehouse::new(database_url, config.pool_size).await?)
}

fn finish(outcome: Result<PipelineReport, PhaseError>) -> anyhow::Result<()> {
    match outcome {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            error!("Pipeline halted in phase {}", err.phase);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dry_run_populate_needs_a_raw_file() {
        let err = Cli::try_parse_from(["sales-warehouse", "populate", "--dry-run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "sales-warehouse",
            "populate",
            "--dry-run",
            "--raw-file",
            "sales_raw.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Populate {
                dry_run: true,
                raw_file: Some(_)
            }
        ));
    }
}

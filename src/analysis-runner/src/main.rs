//! Analysis Runner: validates, resolves and runs experiment analysis configs.

use std::path::PathBuf;
use std::sync::Arc;

use analysis_catalog::Catalog;
use analysis_core::config::AppConfig;
use analysis_core::dates::parse_date;
use analysis_experimenter::ExperimentCollection;
use analysis_external::{
    ConfigRepository, ExternalConfigCollection, GitConfigRepository, LocalConfigRepository,
};
use analysis_spec::AnalysisConfiguration;
use analysis_validation::Validator;
use analysis_warehouse::{Analysis, ClickHouseBackend, QueryBackend};
use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "analysis-runner")]
#[command(about = "Experiment analysis configuration runner")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML), layered under ANALYSIS_RUNNER__* variables
    #[arg(long, env = "ANALYSIS_RUNNER_CONFIG")]
    config: Option<String>,

    /// Warehouse URL (overrides config)
    #[arg(long, env = "ANALYSIS_RUNNER__WAREHOUSE__URL")]
    warehouse_url: Option<String>,

    /// Warehouse database (overrides config)
    #[arg(long, env = "ANALYSIS_RUNNER__WAREHOUSE__DATABASE")]
    database: Option<String>,

    /// Read configs from a checked-out directory instead of cloning
    #[arg(long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dry-run config files and outcome snippets
    ValidateConfig {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Max concurrent validations (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the resolved configuration of an experiment as JSON
    Resolve {
        #[arg(long)]
        slug: String,
    },

    /// List configs newer than their warehouse tables
    StaleConfigs,

    /// Write the tables of an experiment that are due on a date
    Run {
        #[arg(long)]
        slug: String,

        /// Analysis date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analysis_runner=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(url) = cli.warehouse_url {
        config.warehouse.url = url;
    }
    if let Some(database) = cli.database {
        config.warehouse.database = database;
    }

    info!(
        warehouse = %config.warehouse.url,
        database = %config.warehouse.database,
        "Configuration loaded"
    );

    let backend: Arc<dyn QueryBackend> = Arc::new(ClickHouseBackend::new(&config.warehouse));
    let repository: Box<dyn ConfigRepository> = match &cli.config_dir {
        Some(dir) => Box::new(LocalConfigRepository::new(dir)),
        None => Box::new(GitConfigRepository::from_config(&config.external)),
    };

    match cli.command {
        Commands::ValidateConfig { paths, concurrency } => {
            if let Some(n) = concurrency {
                config.validation.max_concurrency = n;
            }
            let experiments = ExperimentCollection::from_experimenter(&config.experimenter).await?;
            let validator = Arc::new(Validator::new(
                backend,
                Arc::new(experiments),
                Arc::new(Catalog::builtin()),
                &config.validation,
            ));

            let reports = validator.validate_all(paths).await;
            for report in &reports {
                println!("{report}");
            }
            let failed = reports.iter().filter(|r| !r.is_valid()).count();
            if failed > 0 {
                bail!("{failed} of {} configs are invalid", reports.len());
            }
        }

        Commands::Resolve { slug } => {
            let external = ExternalConfigCollection::from_repository(repository.as_ref()).await?;
            let experiments = ExperimentCollection::from_experimenter(&config.experimenter).await?;
            let resolved = resolve(&slug, &experiments, &external)?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::StaleConfigs => {
            let external = ExternalConfigCollection::from_repository(repository.as_ref()).await?;
            for stale in external.updated_configs(backend.as_ref()).await {
                println!("{}", stale.slug);
            }
        }

        Commands::Run { slug, date } => {
            let current_date = match date {
                Some(date) => parse_date("date", &date)?,
                None => Utc::now(),
            };
            let external = ExternalConfigCollection::from_repository(repository.as_ref()).await?;
            let experiments = ExperimentCollection::from_experimenter(&config.experimenter).await?;
            let resolved = resolve(&slug, &experiments, &external)?;

            let written = Analysis::new(&resolved)
                .run(backend.as_ref(), current_date)
                .await?;
            info!(slug = %slug, tables = ?written, "Run complete");
        }
    }

    Ok(())
}

fn resolve(
    slug: &str,
    experiments: &ExperimentCollection,
    external: &ExternalConfigCollection,
) -> anyhow::Result<AnalysisConfiguration> {
    let experiment = experiments
        .find(slug)
        .with_context(|| format!("No experiment with slug {slug} in Experimenter."))?;
    let spec = external.spec_for(experiment)?;
    Ok(spec.resolve(experiment, Catalog::shared())?)
}

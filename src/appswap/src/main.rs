//! AppSwap scoring service: price suggestions and recommendations for the
//! AppSwap marketplace.
//!
//! `serve` runs the HTTP API; `train` runs one training pass and prints the
//! report.

use appswap_api::ApiServer;
use appswap_core::config::AppConfig;
use appswap_core::{InMemoryRepository, TransactionRepository};
use appswap_scoring::{ScoringFacade, SnapshotStore};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "appswap")]
#[command(about = "Catalog scoring engine for the AppSwap marketplace")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the scoring HTTP API
    Serve {
        #[command(flatten)]
        data: DataArgs,

        /// HTTP port (overrides config)
        #[arg(long, env = "APPSWAP__API__HTTP_PORT")]
        http_port: Option<u16>,

        /// Run a training pass before accepting traffic
        #[arg(long, default_value_t = false)]
        train_on_start: bool,
    },
    /// Run one training pass and print the report as JSON
    Train {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// JSON catalog export to score (overrides config)
    #[arg(long, env = "APPSWAP__DATA__CATALOG_PATH")]
    catalog: Option<String>,

    /// Model snapshot file (overrides config)
    #[arg(long, env = "APPSWAP__PERSISTENCE__SNAPSHOT_PATH")]
    snapshot: Option<String>,
}

impl DataArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(catalog) = self.catalog {
            config.data.catalog_path = Some(catalog);
        }
        if let Some(snapshot) = self.snapshot {
            config.persistence.snapshot_path = Some(snapshot);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appswap=info,appswap_scoring=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Serve {
            data,
            http_port,
            train_on_start,
        } => {
            data.apply(&mut config);
            if let Some(port) = http_port {
                config.api.http_port = port;
            }
            serve(config, train_on_start).await
        }
        Command::Train { data } => {
            data.apply(&mut config);
            train(config).await
        }
    }
}

fn build_facade(config: &AppConfig) -> anyhow::Result<ScoringFacade> {
    let repo: Arc<dyn TransactionRepository> = match &config.data.catalog_path {
        Some(path) => Arc::new(InMemoryRepository::from_json_file(path)?),
        None => {
            warn!("No catalog configured, starting with an empty repository");
            Arc::new(InMemoryRepository::default())
        }
    };

    let mut facade = ScoringFacade::new(repo, config.scoring.clone());
    if let Some(path) = &config.persistence.snapshot_path {
        facade = facade.with_snapshot_store(SnapshotStore::new(path));
    }
    Ok(facade)
}

async fn serve(config: AppConfig, train_on_start: bool) -> anyhow::Result<()> {
    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        catalog = ?config.data.catalog_path,
        snapshot = ?config.persistence.snapshot_path,
        "AppSwap scoring service starting up"
    );

    let facade = Arc::new(build_facade(&config)?);
    facade.restore();

    if train_on_start {
        match facade.train_all().await {
            Ok(report) => info!(
                price_trained = report.price_model.is_trained(),
                recommender_trained = report.recommender.is_trained(),
                "Startup training complete"
            ),
            Err(e) => error!(error = %e, "Startup training failed, serving previous snapshot"),
        }
    }

    let api_server = ApiServer::new(config, facade);
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("AppSwap scoring service is ready to serve traffic");
    api_server.start_http().await
}

async fn train(config: AppConfig) -> anyhow::Result<()> {
    if config.data.catalog_path.is_none() {
        anyhow::bail!("no catalog configured; pass --catalog or set APPSWAP__DATA__CATALOG_PATH");
    }
    let facade = build_facade(&config)?;
    let report = facade.train_all().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

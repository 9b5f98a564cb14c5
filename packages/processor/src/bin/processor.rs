// Main entry point for the graph search processor

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use processor_core::domains::processors::ProcessorPatch;
use processor_core::kernel::{
    BaseGraphGenerator, CliGraphGenerator, OpenGraphScraper, SearchPoller, ServerDeps,
};
use processor_core::server::{build_app, AppState};
use processor_core::{Config, StoreKind};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "processor")]
#[command(about = "Graph search processor", version)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Clone, Copy)]
enum Mode {
    /// Claim pending graph searches and run the graph generator on them
    Search,
    /// Serve the graph search HTTP API
    Server,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Search => "search",
            Mode::Server => "server",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,processor_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let processor_id = config.processor_id(cli.mode.as_str());

    tracing::info!(
        processor_id = %processor_id,
        version = env!("CARGO_PKG_VERSION"),
        "Launching processor"
    );

    // External collaborators
    let graph_generator: Arc<dyn BaseGraphGenerator> = Arc::new(
        CliGraphGenerator::new(
            config.graph_generator_provider.clone(),
            config.graph_generator_path.clone(),
            config.graph_generator_mode,
        )
        .await,
    );
    let url_scraper = Arc::new(OpenGraphScraper::new()?);

    let deps = match config.store {
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            ServerDeps::postgres(pool, graph_generator.clone(), url_scraper)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, graph searches are lost on exit");
            ServerDeps::in_memory(graph_generator.clone(), url_scraper)
        }
    };

    // Register this processor
    let metadata = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "graphGenerator": format!("{}:{}", graph_generator.provider(), graph_generator.version()),
        "graphGeneratorPath": config.graph_generator_path,
        "graphGeneratorMode": config.graph_generator_mode.to_string(),
        "store": format!("{:?}", config.store).to_lowercase(),
        "databaseHost": config.database_host(),
        "debug": config.debug,
    });
    tracing::info!(metadata = %metadata, "Processor metadata");

    deps.processor_manager(&processor_id)
        .update(ProcessorPatch::builder().metadata(metadata).build())
        .await
        .context("Failed to register processor")?;

    match cli.mode {
        Mode::Search => {
            let poller = SearchPoller::new(config.poller_config(&processor_id), deps);
            poller
                .init()
                .await
                .context("Failed to reset outdated graph searches")?;

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown requested, finishing current graph search");
                signal.cancel();
            });

            poller.run(shutdown).await;
        }
        Mode::Server => {
            if !config.api_enabled {
                tracing::info!("No API started");
                return Ok(());
            }

            let app = build_app(AppState::new(deps, &processor_id, config.invalid_mimes.clone()));

            let addr = format!("0.0.0.0:{}", config.port);
            tracing::info!("Starting server on {}", addr);
            tracing::info!("Health check: http://localhost:{}/health", config.port);

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .context("Failed to bind to address")?;

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("Server error")?;
        }
    }

    Ok(())
}

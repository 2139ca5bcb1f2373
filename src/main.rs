use anyhow::Result;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = stagingd::config::Cli::parse();
    let cmd = cli.command.clone().unwrap_or(stagingd::config::Command::Run);

    match cmd {
        stagingd::config::Command::Run => run_server(cli.config).await,
        stagingd::config::Command::Seed(args) => seed_record(&cli.config, args),
    }
}

async fn run_server(config: stagingd::config::Config) -> Result<()> {
    // Fail fast: a blank secret would make every request a 403.
    if config.shared_token().is_none() {
        anyhow::bail!("no shared token configured; set --token or STAGINGD_TOKEN");
    }

    let store = stagingd::state::JsonStagingStore::load_or_init(&config.data_dir)?;
    let store = Arc::new(Mutex::new(store));

    let app = stagingd::http::build_router(config.clone(), store).layer(TraceLayer::new_for_http());

    info!(
        bind = %config.bind,
        data_dir = %config.data_dir.display(),
        "starting stagingd"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn seed_record(
    config: &stagingd::config::Config,
    args: stagingd::config::SeedArgs,
) -> Result<()> {
    let timestamp = chrono::Utc::now().timestamp();
    let record = stagingd::domain::StagingRecord {
        hostname: args.hostname,
        name: args.name,
        ip: args.ip,
        user: args.user,
        branch: args.branch,
        timestamp,
        time_string: stagingd::claim_time::render_claim_time(timestamp),
    };

    let mut store = stagingd::state::JsonStagingStore::load_or_init(&config.data_dir)?;
    if store
        .records()
        .values()
        .any(|existing| existing.hostname == record.hostname)
    {
        anyhow::bail!("a record with hostname {} already exists", record.hostname);
    }

    let key = store.insert_record(record)?;
    println!("{key}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

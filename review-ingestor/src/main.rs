mod config;
mod logging;

use appstore::config::Config as AppStoreConfig;
use appstore::headers::UserAgentPool;
use appstore::{FetchOptions, PartialFetch, ReviewFetcher, RetryPolicy, TokenError, TokenExtractor};
use clap::{Args, Parser};
use config::{Config, ConfigError};
use ingest_service::bus::{
    self, BusError, EventPublisher, LinePublisher, LineSource, MessageSource, NatsPublisher,
    NatsSource,
};
use ingest_service::config::{BusConfig, Config as IngestConfig};
use ingest_service::events::start_of_day;
use ingest_service::storage::{self, ReviewRepository, StorageError};
use ingest_service::{Consumer, IngestService, SagaSettings};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use shared::http_client::{HttpClient, HttpError, ReqwestClient, TransportConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "review-ingestor", version)]
enum CliCommand {
    /// Consume extract requests from the configured bus and publish completion events.
    Run(ConfigArgs),
    /// Apply the storage schema and exit.
    Migrate(ConfigArgs),
    /// Fetch one country's reviews and print them as JSON lines. Nothing is stored.
    Fetch(FetchArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    app_id: String,
    #[arg(long, default_value = "")]
    app_name: String,
    #[arg(long, default_value = "us")]
    country: String,
    /// Only reviews on or after this day (YYYY-MM-DD).
    #[arg(long)]
    date_from: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("fetch failed after {} reviews: {}", .0.reviews.len(), .0.source)]
    Fetch(#[from] PartialFetch),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("invalid --date-from {0:?}")]
    InvalidDate(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliCommand::parse();
    let config_path = match &cli {
        CliCommand::Run(args) | CliCommand::Migrate(args) => &args.config,
        CliCommand::Fetch(args) => &args.config.config,
    };
    let config = Config::from_file(config_path)?;

    // Sentry has to be initialised before the runtime starts.
    let _sentry = logging::init(&config.common.logging)?;

    if let Some(metrics) = &config.common.metrics {
        shared::metrics::install_statsd(
            &metrics.statsd_host,
            metrics.statsd_port,
            &metrics.prefix,
            &[
                appstore::metrics_defs::ALL_METRICS,
                ingest_service::metrics_defs::ALL_METRICS,
            ],
        )?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        match cli {
            CliCommand::Run(_) => run(config).await,
            CliCommand::Migrate(_) => migrate(&config).await,
            CliCommand::Fetch(args) => fetch(&config.appstore, args).await,
        }
    });

    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = &result {
        tracing::error!(error = %e, "review-ingestor exited with error");
    }
    Ok(result?)
}

async fn run(config: Config) -> Result<(), CliError> {
    let ingest_config = config.ingest()?.clone();
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let repository = storage::connect(&ingest_config.storage).await?;
    repository.migrate().await?;

    let ready = Arc::new(AtomicBool::new(false));
    let admin = config.admin_listener.clone().map(|listener| {
        let ready = ready.clone();
        let admin_shutdown = shutdown.clone();
        let service = AdminService::<_, std::io::Error>::new(move || ready.load(Ordering::Relaxed));
        tokio::spawn(async move {
            run_http_service(&listener.host, listener.port, service, admin_shutdown).await
        })
    });

    let (source, publisher) = open_bus(&ingest_config.bus).await?;
    let service = build_service(&config.appstore, &ingest_config, repository, publisher)?;
    let consumer = Consumer::new(
        source,
        Arc::new(service),
        ingest_config.consumer.processing_timeout(),
    );

    tracing::info!("review-ingestor consumer started");
    ready.store(true, Ordering::Relaxed);
    let result = consumer.run(shutdown.clone()).await;
    ready.store(false, Ordering::Relaxed);

    shutdown.cancel();
    if let Some(admin) = admin {
        match admin.await {
            Ok(Err(e)) => tracing::error!(error = %e, "admin listener failed"),
            Err(e) => tracing::error!(error = %e, "admin listener task panicked"),
            Ok(Ok(())) => {}
        }
    }

    let stats = result?;
    tracing::info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        skipped = stats.skipped,
        "review-ingestor consumer stopped"
    );
    Ok(())
}

async fn migrate(config: &Config) -> Result<(), CliError> {
    let repository = storage::connect(&config.ingest()?.storage).await?;
    repository.migrate().await?;
    Ok(())
}

async fn fetch(appstore: &AppStoreConfig, args: FetchArgs) -> Result<(), CliError> {
    let after = args
        .date_from
        .as_deref()
        .map(|day| start_of_day(day).map_err(|_| CliError::InvalidDate(day.to_string())))
        .transpose()?;

    let http = http_client(appstore)?;
    let tokens = TokenExtractor::new(
        http.clone(),
        &appstore.landing_host,
        UserAgentPool::new(appstore.http.user_agents.clone()),
    );
    let fetcher = ReviewFetcher::new(http, appstore);

    let token = tokens
        .extract_token(&args.country, &args.app_name, &args.app_id)
        .await?;

    let options = FetchOptions {
        after,
        max_total: args.limit,
        ..fetch_options(appstore)
    };
    let reviews = fetcher
        .fetch_all_reviews(
            &token,
            &args.country.to_lowercase(),
            &args.app_id,
            &options,
            &CancellationToken::new(),
        )
        .await?;

    let mut stdout = std::io::stdout().lock();
    for review in &reviews {
        serde_json::to_writer(&mut stdout, review).map_err(std::io::Error::from)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    tracing::info!(count = reviews.len(), "fetch finished");
    Ok(())
}

async fn open_bus(
    config: &BusConfig,
) -> Result<(Box<dyn MessageSource>, Arc<dyn EventPublisher>), BusError> {
    match config {
        BusConfig::Stdio => Ok((
            Box::new(LineSource::stdin()),
            Arc::new(LinePublisher::stdout()),
        )),
        BusConfig::Nats(nats) => {
            let client = bus::nats::connect(nats).await?;
            let source = NatsSource::subscribe(&client, nats).await?;
            let publisher = NatsPublisher::new(Arc::new(client), nats.completed_subject.clone());
            Ok((Box::new(source), Arc::new(publisher)))
        }
    }
}

fn http_client(appstore: &AppStoreConfig) -> Result<Arc<dyn HttpClient>, HttpError> {
    Ok(Arc::new(ReqwestClient::new(TransportConfig::from(
        &appstore.http,
    ))?))
}

fn fetch_options(appstore: &AppStoreConfig) -> FetchOptions {
    FetchOptions {
        page_size: appstore.page_size,
        inter_page_delay: appstore.inter_page_delay(),
        retry: RetryPolicy::from(&appstore.rate_limit),
        ..FetchOptions::default()
    }
}

fn build_service(
    appstore: &AppStoreConfig,
    ingest: &IngestConfig,
    repository: Arc<dyn ReviewRepository>,
    publisher: Arc<dyn EventPublisher>,
) -> Result<IngestService, HttpError> {
    let http = http_client(appstore)?;
    let tokens = TokenExtractor::new(
        http.clone(),
        &appstore.landing_host,
        UserAgentPool::new(appstore.http.user_agents.clone()),
    );
    let fetcher = ReviewFetcher::new(http, appstore);

    Ok(IngestService::new(
        Arc::new(tokens),
        Arc::new(fetcher),
        repository,
        publisher,
        SagaSettings {
            fetch: fetch_options(appstore),
            max_total: ingest.max_total,
        },
    ))
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}

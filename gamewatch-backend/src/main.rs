use gamewatch_backend::config::{Config, load_servers};
use gamewatch_backend::{AppState, RateLimitConfig, create_app};
use gamewatch_core::{ProtocolRegistry, RefreshDriver};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting gamewatch backend...");

    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, cache_ttl={}ms, refresh_interval={}s, timeouts={}ms/{}ms x{} retries, max_probes={}",
        config.port,
        config.cache_ttl.as_millis(),
        config.refresh_interval.as_secs(),
        config.socket_timeout.as_millis(),
        config.attempt_timeout.as_millis(),
        config.max_retries,
        config.max_concurrent_probes
    );

    let servers = match &config.servers_path {
        Some(path) => load_servers(path)?,
        None => Vec::new(),
    };
    tracing::info!("Loaded {} configured servers", servers.len());

    let registry = ProtocolRegistry::with_builtin();
    for server in &servers {
        if !registry.supports(server.identity.protocol_type()) {
            tracing::warn!(
                id = %server.id,
                protocol = server.identity.protocol_type(),
                "no query protocol registered for configured server"
            );
        }
    }

    let state = AppState::new(&config, Arc::new(registry));
    let refresh = RefreshDriver::new(
        state.aggregator.clone(),
        servers,
        state.snapshot.clone(),
        config.refresh_interval,
    )
    .spawn();

    let rate_limit = config.rate_limit_enabled.then(|| RateLimitConfig {
        per_sec: config.rate_limit_per_sec,
        burst: config.rate_limit_burst,
    });
    let app = create_app(state, config.request_timeout, rate_limit);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await;

    refresh.shutdown();
    if let Err(e) = &result {
        tracing::error!("Axum server error: {}", e);
    }
    Ok(result?)
}

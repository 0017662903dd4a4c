//! buildcord - relays CI build notifications into a chat channel.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use buildcord::gateway::handlers;
use buildcord::ingress::{self, AcceptAll, IngressState, PayloadVerifier};
use buildcord::travis::TravisVerifier;
use buildcord::{Config, GatewayClient, NotificationQueue, RestClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("buildcord {}", VERSION);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml exists or set BUILDCORD__DISCORD__TOKEN and BUILDCORD__DISCORD__CHANNEL_ID.",
            e
        )
    })?;
    tracing::info!("Starting buildcord, relaying to channel {}", config.discord.channel_id);

    let rest = Arc::new(RestClient::new(&config.discord.api_url, &config.discord.token));
    let queue = Arc::new(NotificationQueue::new());
    let stop = CancellationToken::new();

    // Start webhook ingress if enabled
    if config.ingress.enabled {
        let verifier: Arc<dyn PayloadVerifier> = if config.ingress.verify_signatures {
            Arc::new(TravisVerifier::new(&config.ingress.travis_config_url))
        } else {
            tracing::warn!("Webhook signatures are not verified");
            Arc::new(AcceptAll)
        };
        let state = Arc::new(IngressState {
            queue: queue.clone(),
            verifier,
        });
        let app = ingress::router(state).layer(TraceLayer::new_for_http());

        let addr = format!("{}:{}", config.ingress.host, config.ingress.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Webhook ingress listening on {}", addr);

        let stop = stop.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await });
            if let Err(e) = server.await {
                tracing::error!("Webhook ingress failed: {}", e);
            }
        });
    } else {
        tracing::info!("Webhook ingress disabled");
    }

    // Resolve the gateway URL
    let gateway_url = match config.gateway.url.clone() {
        Some(url) => url,
        None => rest.gateway_url().await?,
    };

    let client = GatewayClient::new(
        gateway_url,
        config.gateway.clone(),
        &config.discord,
        rest,
        queue,
        handlers::default_router(),
    );

    let gateway_stop = stop.clone();
    let gateway = tokio::spawn(async move {
        client.run(gateway_stop).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    stop.cancel();
    gateway.await?;

    Ok(())
}

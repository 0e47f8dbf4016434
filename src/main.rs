use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signal_billing::config::Config;
use signal_billing::db::{AppState, create_pool, init_db};
use signal_billing::handlers;
use signal_billing::jwt::TokenKeys;
use signal_billing::payments::{self, PaymentGateway, RazorpayGateway, StripeGateway};
use signal_billing::store::{KeyValueStore, MemoryStore, RedisStore};

const STORE_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Parser, Debug)]
#[command(name = "signal-billing")]
#[command(about = "Subscription-gated signals API with Stripe and Razorpay billing")]
struct Cli {
    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Print which payment gateways are configured and exit
    #[arg(long)]
    check_config: bool,
}

fn print_gateway_config(config: &Config) {
    let client = payments::http_client(config.gateway_http_timeout);
    let gateways: [Box<dyn PaymentGateway>; 2] = [
        Box::new(StripeGateway::new(
            client.clone(),
            config.stripe.clone(),
            &config.frontend_url,
        )),
        Box::new(RazorpayGateway::new(client, config.razorpay.clone())),
    ];

    println!("Default gateway:  {}", config.default_gateway);
    println!("Fallback policy:  {:?}", config.gateway_fallback);
    for gateway in &gateways {
        println!(
            "{:<17} {}",
            format!("{}:", gateway.name()),
            if gateway.is_configured() { "configured" } else { "not configured" }
        );
    }
    println!(
        "Key-value store:  {}",
        if config.redis_url.is_some() { "redis" } else { "in-process (REDIS_URL unset)" }
    );
}

async fn connect_store(config: &Config) -> Result<Arc<dyn KeyValueStore>, String> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url, config.store_timeout)
                .await
                .map_err(|e| format!("Failed to connect to Redis: {}", e))?;
            tracing::info!("Connected to Redis");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set; using in-process store. Idempotency and rate limits are not shared across instances"
            );
            let store = Arc::new(MemoryStore::new());
            MemoryStore::spawn_cleanup_task(&store, STORE_SWEEP_INTERVAL);
            tracing::info!("In-process store cleanup task started (runs every 5 minutes)");
            Ok(store)
        }
    }
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!("FRONTEND_URL is not a valid origin; CORS disabled");
            cors
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_billing=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if cli.check_config {
        print_gateway_config(&config);
        return;
    }

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let store = match connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let tokens = match &config.jwt_secret {
        Some(secret) => TokenKeys::from_secret(secret.as_bytes(), config.access_token_ttl),
        None => {
            tracing::warn!("JWT_SECRET not set; using a random key. Tokens will not survive a restart");
            TokenKeys::generate(config.access_token_ttl)
        }
    };

    let state = AppState::new(&config, db_pool, store.clone(), tokens);

    let available = state.gateways.gateway_info().available_gateways;
    if available.is_empty() {
        tracing::warn!("No payment gateway is configured; checkout will fail");
    } else {
        tracing::info!("Payment gateways available: {}", available.join(", "));
    }

    let app = handlers::router(state)
        .layer(cors_layer(&config.frontend_url))
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cli.ephemeral && !config.dev_mode {
        tracing::warn!("--ephemeral ignored: not in dev mode (set APP_ENV=dev)");
    }
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Signal billing server listening on {}", addr);

    // ConnectInfo feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    drop(store);
    tracing::info!("Server stopped; key-value store connection closed");

    if cleanup_on_exit {
        let db_path = &config.database_path;
        if let Err(e) = std::fs::remove_file(db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

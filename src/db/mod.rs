mod from_row;
pub mod queries;
mod schema;

pub use from_row::{FromRow, USER_COLS, query_one};
pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::idempotency::IdempotencyStore;
use crate::jwt::TokenKeys;
use crate::payments::{self, GatewayRegistry, GatewayRouter, RazorpayGateway, StripeGateway};
use crate::rate_limit::FixedWindowLimiter;
use crate::store::KeyValueStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Entitlement ledger
    pub db: DbPool,
    pub gateways: Arc<GatewayRouter>,
    pub tokens: TokenKeys,
    /// Ceiling for /auth/signup and /auth/login
    pub auth_limiter: Arc<FixedWindowLimiter>,
    /// Ceiling for checkout creation and payment verification
    pub billing_limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    /// Wire adapters, the idempotency store and the limiters around an
    /// already-connected pool and key-value store.
    pub fn new(
        config: &Config,
        db: DbPool,
        store: Arc<dyn KeyValueStore>,
        tokens: TokenKeys,
    ) -> Self {
        let client = payments::http_client(config.gateway_http_timeout);

        let registry = GatewayRegistry::new(&config.default_gateway, config.gateway_fallback)
            .register(Arc::new(StripeGateway::new(
                client.clone(),
                config.stripe.clone(),
                &config.frontend_url,
            )))
            .register(Arc::new(RazorpayGateway::new(
                client,
                config.razorpay.clone(),
            )));

        let router = GatewayRouter::new(registry, IdempotencyStore::new(store.clone()), db.clone());

        let limits = config.rate_limits;
        Self {
            db,
            gateways: Arc::new(router),
            tokens,
            auth_limiter: Arc::new(FixedWindowLimiter::new(
                store.clone(),
                limits.auth_max,
                limits.window,
            )),
            billing_limiter: Arc::new(FixedWindowLimiter::new(
                store,
                limits.billing_max,
                limits.window,
            )),
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    Pool::builder().max_size(10).build(manager)
}

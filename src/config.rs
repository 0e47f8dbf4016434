use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What to do when a client explicitly asks for a gateway that is not
/// registered or not configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayFallback {
    /// Fail with 400 so operator misconfiguration is visible.
    #[default]
    Reject,
    /// Log a warning and use the default gateway.
    Default,
}

impl FromStr for GatewayFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "default" | "fallback" => Ok(Self::Default),
            other => Err(format!("unknown gateway fallback policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct RazorpaySettings {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    /// Smallest currency unit (paise for INR).
    pub plan_amount: i64,
    pub currency: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub auth_max: u64,
    pub billing_max: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_max: 5,
            billing_max: 10,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub database_path: String,
    pub redis_url: Option<String>,
    pub store_timeout: Duration,
    /// `None` means a random per-process secret is generated at startup.
    pub jwt_secret: Option<String>,
    pub access_token_ttl: Duration,
    pub frontend_url: String,
    pub default_gateway: String,
    pub gateway_fallback: GatewayFallback,
    pub gateway_http_timeout: Duration,
    pub stripe: StripeSettings,
    pub razorpay: RazorpaySettings,
    pub rate_limits: RateLimitConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let gateway_fallback = match env::var("GATEWAY_FALLBACK") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}; using 'reject'", e);
                GatewayFallback::Reject
            }),
            Err(_) => GatewayFallback::default(),
        };

        Self {
            host: var_or("HOST", "127.0.0.1"),
            port: parsed_or("PORT", 8000),
            dev_mode,
            database_path: var_or("DATABASE_PATH", "signals.db"),
            redis_url: non_empty("REDIS_URL"),
            store_timeout: Duration::from_millis(parsed_or("STORE_TIMEOUT_MS", 2000)),
            jwt_secret: non_empty("JWT_SECRET"),
            access_token_ttl: Duration::from_secs(
                parsed_or::<u64>("ACCESS_TOKEN_EXPIRE_MINUTES", 30) * 60,
            ),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),
            default_gateway: var_or("PAYMENT_GATEWAY", "stripe").to_ascii_lowercase(),
            gateway_fallback,
            gateway_http_timeout: Duration::from_secs(parsed_or("GATEWAY_HTTP_TIMEOUT_SECS", 15)),
            stripe: StripeSettings {
                secret_key: var_or("STRIPE_SECRET_KEY", ""),
                webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
                price_id: var_or("STRIPE_PRICE_ID", ""),
                api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            },
            razorpay: RazorpaySettings {
                key_id: var_or("RAZORPAY_KEY_ID", ""),
                key_secret: var_or("RAZORPAY_KEY_SECRET", ""),
                webhook_secret: var_or("RAZORPAY_WEBHOOK_SECRET", ""),
                plan_amount: parsed_or("RAZORPAY_PLAN_AMOUNT", 49900),
                currency: var_or("RAZORPAY_CURRENCY", "INR"),
                api_base: var_or("RAZORPAY_API_BASE", "https://api.razorpay.com"),
            },
            rate_limits: RateLimitConfig {
                auth_max: parsed_or("AUTH_RATE_LIMIT_MAX", 5),
                billing_max: parsed_or("BILLING_RATE_LIMIT_MAX", 10),
                window: Duration::from_secs(parsed_or("RATE_LIMIT_WINDOW_SECS", 60)),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

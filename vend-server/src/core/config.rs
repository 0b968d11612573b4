/// Server configuration.
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | DB_PATH | vend.db | SQLite database file |
/// | HTTP_PORT | 3000 | Webhook/API port |
/// | ENVIRONMENT | development | development \| staging \| production |
/// | ADMIN_IDS | (empty) | Comma-separated admin user ids |
/// | USD_TO_INR_RATE | 90.0 | Fixed USD→credit display rate |
/// | LOW_STOCK_THRESHOLD | 3 | Admin alert when stock falls to this |
/// | EXPIRY_POLL_SECS | 60 | Payment timer poll interval |
/// | EXPIRY_SWEEP_SECS | 300 | Overdue-payment sweep interval |
/// | RAZORPAY_KEY_ID | (empty) | Razorpay API key id |
/// | RAZORPAY_KEY_SECRET | (empty) | Razorpay API key secret |
/// | RAZORPAY_WEBHOOK_SECRET | (empty) | Razorpay webhook HMAC secret |
/// | RAZORPAY_TTL_SECS | 300 | QR payment lifetime |
/// | OXAPAY_API_KEY | (empty) | OxaPay merchant key |
/// | OXAPAY_CALLBACK_SECRET | (empty) | Secret path segment for callbacks |
/// | OXAPAY_CALLBACK_URL | (empty) | Public callback URL given to OxaPay |
/// | OXAPAY_TTL_SECS | 1800 | Invoice payment lifetime |
///
/// A gateway with an empty key is simply not offered; manual payments
/// always work.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub http_port: u16,
    pub environment: String,
    pub admin_ids: Vec<i64>,
    pub usd_to_inr_rate: f64,
    pub low_stock_threshold: i64,
    pub expiry_poll_secs: u64,
    pub expiry_sweep_secs: u64,
    pub razorpay: RazorpayConfig,
    pub oxapay: OxapayConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub ttl_secs: i64,
}

impl RazorpayConfig {
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OxapayConfig {
    pub api_key: String,
    pub callback_secret: String,
    pub callback_url: String,
    pub ttl_secs: i64,
}

impl OxapayConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let admin_ids = std::env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        Self {
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "vend.db".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            admin_ids,
            usd_to_inr_rate: env_or("USD_TO_INR_RATE", 90.0),
            low_stock_threshold: env_or("LOW_STOCK_THRESHOLD", 3),
            expiry_poll_secs: env_or("EXPIRY_POLL_SECS", 60),
            expiry_sweep_secs: env_or("EXPIRY_SWEEP_SECS", 300),
            razorpay: RazorpayConfig {
                key_id: env_string("RAZORPAY_KEY_ID"),
                key_secret: env_string("RAZORPAY_KEY_SECRET"),
                webhook_secret: env_string("RAZORPAY_WEBHOOK_SECRET"),
                ttl_secs: env_or("RAZORPAY_TTL_SECS", 300),
            },
            oxapay: OxapayConfig {
                api_key: env_string("OXAPAY_API_KEY"),
                callback_secret: env_string("OXAPAY_CALLBACK_SECRET"),
                callback_url: env_string("OXAPAY_CALLBACK_URL"),
                ttl_secs: env_or("OXAPAY_TTL_SECS", 1800),
            },
        }
    }

    /// Override the values tests care about, keep the rest from the
    /// environment.
    pub fn with_overrides(db_path: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.db_path = db_path.into();
        config.http_port = http_port;
        config
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

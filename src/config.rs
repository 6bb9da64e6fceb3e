use std::env;

use rust_decimal::Decimal;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP/WebSocket server.
    pub bind_addr: String,
    /// Override for the DynamoDB endpoint (local development).
    pub store_endpoint: Option<String>,
    pub region: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
    /// Balance granted to newly registered demo users.
    pub initial_balance: Decimal,
    /// Registering under this username grants the admin role.
    pub admin_username: String,
    /// Defaults applied when an auction input omits the optional knobs.
    pub default_round_duration: u64,
    pub default_anti_snipe_window: u64,
    pub default_anti_snipe_extension: u64,
    pub default_max_extensions: u32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            store_endpoint: env::var("DYNAMODB_ENDPOINT").ok(),
            region: env_or("AWS_REGION", "us-east-1"),
            jwt_secret: env_or("JWT_SECRET", "slotdrop-dev-secret"),
            token_ttl_secs: env_parse("TOKEN_TTL_SECS", 60 * 60 * 24),
            initial_balance: env_parse("INITIAL_BALANCE", Decimal::from(10_000)),
            admin_username: env_or("ADMIN_USERNAME", "admin"),
            default_round_duration: env_parse("DEFAULT_ROUND_DURATION", 3600),
            default_anti_snipe_window: env_parse("DEFAULT_ANTI_SNIPE_WINDOW", 60),
            default_anti_snipe_extension: env_parse("DEFAULT_ANTI_SNIPE_EXTENSION", 60),
            default_max_extensions: env_parse("DEFAULT_MAX_EXTENSIONS", 3),
        }
    }
}

use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Default credit cost of one chat turn.
const DEFAULT_TURN_COST: i64 = 1;

/// Default idle-chunk timeout: abort the upstream call if no bytes arrive
/// within this window.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub provider: ProviderConfig,
    pub chat: ChatSettings,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
}

/// Which upstream provider backs the model gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    /// Idle-chunk timeout in seconds for streaming responses.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    /// Credits debited per chat turn.
    pub turn_cost: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Shared secret for verifying payment-provider webhook signatures.
    pub webhook_secret: String,
}

impl ChatConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(ChatConfig {
            common: common_config,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://chat.db?mode=rwc"), is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-secret-change-me"), is_prod)?,
                access_token_expiry_minutes: get_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            provider: ProviderConfig {
                kind: match get_env("CHAT_PROVIDER", Some("openrouter"), is_prod)?.as_str() {
                    "mock" => ProviderKind::Mock,
                    _ => ProviderKind::OpenRouter,
                },
                api_key: get_env("OPENROUTER_API_KEY", Some(""), is_prod)?,
                base_url: get_env(
                    "OPENROUTER_BASE_URL",
                    Some("https://openrouter.ai/api/v1"),
                    is_prod,
                )?,
                idle_timeout_secs: get_env(
                    "CHAT_IDLE_TIMEOUT_SECS",
                    Some(&DEFAULT_IDLE_TIMEOUT_SECS.to_string()),
                    is_prod,
                )?
                .parse()
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            },
            chat: ChatSettings {
                turn_cost: get_env("CHAT_TURN_COST", Some(&DEFAULT_TURN_COST.to_string()), is_prod)?
                    .parse()
                    .unwrap_or(DEFAULT_TURN_COST),
            },
            billing: BillingConfig {
                webhook_secret: get_env("BILLING_WEBHOOK_SECRET", Some("dev-webhook-secret"), is_prod)?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

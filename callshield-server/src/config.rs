//! Configuration resolution
//!
//! Environment variables are resolved once at startup into a typed
//! `Config`. CLI flags override the runtime knobs (port, database path);
//! everything else is env-only.

use std::path::PathBuf;
use std::time::Duration;

/// Default requests-per-minute budget for the model scorer
const DEFAULT_MODEL_RPM: u32 = 30;

/// Hard floor for the model minimum interval
const MIN_MODEL_INTERVAL_MS: u64 = 2800;

/// Remote model scorer settings
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Absent key disables the model scorer entirely
    pub api_key: Option<String>,
    pub name: String,
    pub base_url: String,
    pub rpm_limit: u32,
    /// Explicit override for the derived minimum interval
    pub min_interval_ms: Option<u64>,
}

/// Telephony provider settings
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub account_id: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub base_url: String,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub model: ModelSettings,
    pub provider: ProviderSettings,
    /// Tests only: `WEBHOOK_SKIP_SIGNATURE_VALIDATION=1`
    pub skip_signature_validation: bool,
    /// Preferred external base URL for webhook callbacks
    pub public_base_url: Option<String>,
    /// Snapshot transcript cap, clamped to [1, 500]
    pub live_transcript_limit: usize,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        let model = ModelSettings {
            api_key: env_nonempty("MODEL_API_KEY"),
            name: env_nonempty("MODEL_NAME").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: env_nonempty("MODEL_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            rpm_limit: env_parse("MODEL_RPM_LIMIT").unwrap_or(DEFAULT_MODEL_RPM).max(1),
            min_interval_ms: env_parse("MODEL_MIN_INTERVAL_MS"),
        };

        let provider = ProviderSettings {
            account_id: env_nonempty("PROVIDER_ACCOUNT_ID"),
            auth_token: env_nonempty("PROVIDER_AUTH_TOKEN"),
            from_number: env_nonempty("PROVIDER_FROM_NUMBER"),
            base_url: env_nonempty("PROVIDER_BASE_URL")
                .unwrap_or_else(|| "https://api.twilio.com".to_string()),
        };

        let public_base_url =
            env_nonempty("PUBLIC_BASE_URL").or_else(|| env_nonempty("APP_BASE_URL"));

        Self {
            port: env_parse("CALLSHIELD_PORT").unwrap_or(5760),
            db_path: env_nonempty("CALLSHIELD_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("callshield.db")),
            model,
            provider,
            skip_signature_validation: std::env::var("WEBHOOK_SKIP_SIGNATURE_VALIDATION")
                .map(|v| v == "1")
                .unwrap_or(false),
            public_base_url,
            live_transcript_limit: env_parse::<usize>("LIVE_TRANSCRIPT_LIMIT")
                .unwrap_or(200)
                .clamp(1, 500),
        }
    }

    /// Minimum spacing between model runs for one call.
    ///
    /// Derived from the RPM budget with headroom, floored at 2.8s, unless
    /// `MODEL_MIN_INTERVAL_MS` overrides it outright.
    pub fn model_min_interval(&self) -> Duration {
        if let Some(ms) = self.model.min_interval_ms {
            return Duration::from_millis(ms.max(1));
        }
        let per_request = 60_000u64.div_ceil(self.model.rpm_limit as u64) + 400;
        Duration::from_millis(per_request.max(MIN_MODEL_INTERVAL_MS))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

//! Telephony provider client
//!
//! Places the outbound monitor call that the provider silently bridges
//! into the user's ongoing conversation. Thin by design: the interesting
//! work happens when the provider starts posting transcript events back
//! to the webhook.

use crate::config::ProviderSettings;
use callshield_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Outbound call placement result
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub call_id: String,
    pub status: String,
}

#[derive(Deserialize)]
struct ProviderCallResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// REST client for the telephony provider
pub struct ProviderClient {
    http: reqwest::Client,
    account_id: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl ProviderClient {
    /// Build a client, or `None` when provider credentials are absent.
    pub fn from_settings(settings: &ProviderSettings) -> Option<Self> {
        let account_id = settings.account_id.clone()?;
        let auth_token = settings.auth_token.clone()?;
        let from_number = settings.from_number.clone()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("callshield/0.1")
            .build()
            .ok()?;
        Some(Self {
            http,
            account_id,
            auth_token,
            from_number,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Place the monitor call to the protected number. `webhook_url`
    /// receives status callbacks and live transcription events.
    pub async fn place_monitor_call(&self, to: &str, webhook_url: &str) -> Result<PlacedCall> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_id
        );

        let params = [
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Url", webhook_url),
            ("StatusCallback", webhook_url),
            ("StatusCallbackEvent", "initiated ringing answered completed"),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("call placement failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "provider rejected call placement: {status}: {body}"
            )));
        }

        let call: ProviderCallResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("provider response unreadable: {e}")))?;

        info!(call_id = %call.sid, to = %to, "Monitor call placed");
        Ok(PlacedCall {
            call_id: call.sid,
            status: call.status.unwrap_or_else(|| "queued".to_string()),
        })
    }
}

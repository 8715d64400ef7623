use crate::config::DialingDefaults;
use crate::error::DeliveryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: Option<String>,
    pub status: String,
}

/// Outbound messaging channel. Implementations do a single attempt; retries
/// belong to the notifier.
pub trait MessageTransport: Send + Sync {
    fn send(&self, phone: &str, text: &str) -> Result<SendReceipt, DeliveryError>;
    fn check_channel_status(&self) -> bool;
}

/// Brings a phone number to international format: digits only, country code
/// first, trunk `0` dropped, bare local numbers completed with the area code.
pub fn normalize_phone(raw: &str, dialing: &DialingDefaults) -> Result<String, DeliveryError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(DeliveryError::InvalidTarget(raw.to_string()));
    }
    if digits.starts_with(&dialing.country_code) {
        return Ok(digits);
    }
    let national = digits.strip_prefix('0').unwrap_or(&digits);
    if national.is_empty() {
        return Err(DeliveryError::InvalidTarget(raw.to_string()));
    }
    if national.len() == dialing.local_digits {
        Ok(format!("{}{}{}", dialing.country_code, dialing.area_code, national))
    } else {
        Ok(format!("{}{}", dialing.country_code, national))
    }
}

/// HTTP chat gateway: `GET {base}/api/send/chat?uid=&text=&token=` to send,
/// `GET {base}/api/session/status` for the session state.
pub struct GatewayTransport {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl GatewayTransport {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }
}

impl MessageTransport for GatewayTransport {
    fn send(&self, phone: &str, text: &str) -> Result<SendReceipt, DeliveryError> {
        let url = format!("{}/api/send/chat", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("uid", phone), ("text", text), ("token", self.token.as_str())])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Transport(format!("timed out: {e}"))
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Http(status.as_u16()));
        }

        // The gateway's body is informational; a 2xx means the message was queued.
        let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
        if body.get("success") == Some(&serde_json::Value::Bool(false)) {
            if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
                return Err(DeliveryError::Rejected(error.to_string()));
            }
        }
        Ok(SendReceipt {
            message_id: body.get("id").map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            status: body
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("sent")
                .to_string(),
        })
    }

    fn check_channel_status(&self) -> bool {
        let url = format!("{}/api/session/status", self.base_url);
        let response = match self.client.get(&url).send() {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "gateway status check failed");
                return false;
            }
            Err(err) => {
                debug!(error = %err, "gateway unreachable");
                return false;
            }
        };
        match response.json::<serde_json::Value>() {
            Ok(body) => {
                body.get("connected").and_then(|v| v.as_bool()).unwrap_or(false)
                    || body.get("status").and_then(|v| v.as_str()) == Some("connected")
            }
            Err(_) => false,
        }
    }
}

/// Transport that only logs. Used when notifications are disabled and by the
/// demo.
#[derive(Default)]
pub struct LoggingTransport;

impl MessageTransport for LoggingTransport {
    fn send(&self, phone: &str, text: &str) -> Result<SendReceipt, DeliveryError> {
        tracing::info!(target_phone = phone, chars = text.chars().count(), "message logged, not sent");
        Ok(SendReceipt {
            message_id: None,
            status: "logged".to_string(),
        })
    }

    fn check_channel_status(&self) -> bool {
        true
    }
}

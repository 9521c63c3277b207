// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Transport;
use crate::error::DeliveryError;
use crate::store::SubscriberId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_API_BASE: &str = "TELEGRAM_API_BASE";

// Error descriptions that mean the chat is gone for this bot.
const PERMANENT_MARKERS: &[&str] = &[
    "chat not found",
    "bot was blocked",
    "user is deactivated",
    "bot was kicked",
    "bot is not a member",
    "not enough rights",
    "have no rights",
    "group chat was upgraded",
];

/// Telegram Bot API `sendMessage` transport.
#[derive(Clone)]
pub struct TelegramTransport {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// `TELEGRAM_BOT_TOKEN` is required; `TELEGRAM_API_BASE` optionally points
    /// at a local Bot API server.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(ENV_BOT_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("{ENV_BOT_TOKEN} missing"))?;
        let mut transport = Self::new(token.trim());
        if let Ok(base) = std::env::var(ENV_API_BASE) {
            transport = transport.with_api_base(base);
        }
        Ok(transport)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Map a Bot API failure onto the delivery taxonomy.
pub fn classify_api_error(status: u16, description: &str, retry_after: Option<u64>) -> DeliveryError {
    let desc = description.to_lowercase();
    let reason = format!("telegram {status}: {description}");

    if status == 403 || PERMANENT_MARKERS.iter().any(|m| desc.contains(m)) {
        return DeliveryError::permanent(reason);
    }
    if status == 429 {
        let wait = Duration::from_secs(retry_after.unwrap_or(1));
        return DeliveryError::rate_limited(reason, wait);
    }
    DeliveryError::transient(reason)
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: to.as_str(),
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let rsp = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            // the URL carries the bot token; keep it out of errors and logs
            .map_err(|e| DeliveryError::transient(format!("telegram request failed: {}", e.without_url())))?;

        let status = rsp.status().as_u16();
        let body: Option<ApiResponse> = rsp.json().await.ok();

        match body {
            Some(b) if b.ok => Ok(()),
            Some(b) => Err(classify_api_error(
                b.error_code.unwrap_or(status),
                b.description.as_deref().unwrap_or_default(),
                b.parameters.and_then(|p| p.retry_after),
            )),
            None if (200..300).contains(&status) => Ok(()),
            None => Err(classify_api_error(status, "", None)),
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_missing_chats_are_permanent() {
        assert!(classify_api_error(403, "Forbidden: bot was blocked by the user", None).is_permanent());
        assert!(classify_api_error(400, "Bad Request: chat not found", None).is_permanent());
        assert!(classify_api_error(403, "", None).is_permanent());
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let rl = classify_api_error(429, "Too Many Requests: retry after 7", Some(7));
        assert!(!rl.is_permanent());
        assert_eq!(rl.retry_after(), Some(Duration::from_secs(7)));

        assert!(!classify_api_error(502, "Bad Gateway", None).is_permanent());
        assert!(!classify_api_error(400, "Bad Request: message is too long", None).is_permanent());
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let t = TelegramTransport::new("123:abc").with_api_base("http://localhost:8081/");
        assert_eq!(t.endpoint(), "http://localhost:8081/bot123:abc/sendMessage");
    }

    #[test]
    fn payload_shape() {
        let p = SendMessage {
            chat_id: "42",
            text: "hi",
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["chat_id"], "42");
        assert_eq!(v["parse_mode"], "HTML");
        assert_eq!(v["disable_web_page_preview"], true);
    }
}

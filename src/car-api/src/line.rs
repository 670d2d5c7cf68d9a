//! Minimal LINE Messaging API client: webhook payload types,
//! signature verification and the two calls the service needs
//! (fetch message content, reply with text).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use log::debug;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

const REPLY_ENDPOINT: &str = "https://api.line.me/v2/bot/message/reply";
const CONTENT_ENDPOINT: &str = "https://api-data.line.me/v2/bot/message";

#[derive(Debug, Error)]
pub enum LineError {
    #[error("LINE API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LINE API returned status {0}")]
    Api(reqwest::StatusCode),
}

/// Webhook request body: a batch of events.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "replyToken")]
    pub reply_token: Option<String>,
    pub message: Option<Message>,
}

/// Message kinds the adapter reacts to. Everything else (stickers,
/// video, location, ...) deserializes as `Other` and is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text { id: String, text: String },
    Image { id: String },
    #[serde(other)]
    Other,
}

pub struct LineBot {
    http: reqwest::Client,
    access_token: String,
    channel_secret: String,
}

impl LineBot {
    pub fn new(access_token: String, channel_secret: String) -> Self {
        LineBot {
            http: reqwest::Client::new(),
            access_token,
            channel_secret,
        }
    }

    /// Check the `X-Line-Signature` header: base64 of the HMAC-SHA256
    /// of the raw request body, keyed with the channel secret.
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_signature(&self.channel_secret, body, signature)
    }

    /// Download the binary content of a message (the uploaded photo).
    pub async fn message_content(&self, message_id: &str) -> Result<Bytes, LineError> {
        let url = format!("{}/{}/content", CONTENT_ENDPOINT, message_id);
        debug!("fetching message content from {}", url);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LineError::Api(response.status()));
        }
        Ok(response.bytes().await?)
    }

    /// Send a single text reply for the given reply token.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        let body = json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });

        let response = self
            .http
            .post(REPLY_ENDPOINT)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LineError::Api(response.status()));
        }
        Ok(())
    }
}

fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let mut mac = match Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = BASE64.encode(mac.finalize().into_bytes());
    expected == signature
}

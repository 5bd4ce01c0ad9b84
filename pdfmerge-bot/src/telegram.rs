//! Telegram transport adapter.
//!
//! Implements [`ChatTransport`] over the Telegram Bot API and long-polls
//! `getUpdates` for incoming messages.

use crate::message::{BotCommand, ChatEvent, DocumentInfo, EventKind};
use crate::traits::{ChatTransport, TransportError, TransportResult};
use async_trait::async_trait;
use pdfmerge_common::config::TelegramConfig;
use pdfmerge_common::logging::{generate_span_id, generate_trace_id};
use reqwest::multipart::{Form, Part};
use std::path::Path;
use tokio::sync::mpsc;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram transport - long-polls the Bot API for updates.
pub struct TelegramTransport {
    bot_token: String,
    api_base: String,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramTransport {
    /// Create a new Telegram transport.
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base: DEFAULT_API_BASE.to_string(),
            allowed_users: config.allowed_users.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    /// Point the transport at a different API base URL (used in tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    fn is_user_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == username)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Verify the bot token by calling getMe.
    pub async fn init(&self) -> TransportResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram transport initialized");
        Ok(())
    }

    /// Decode one Telegram message object into a chat event.
    ///
    /// Returns `None` for messages from unauthorized users or payloads
    /// missing required fields.
    fn decode_message(&self, message: &serde_json::Value) -> Option<ChatEvent> {
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?
            .to_string();

        let username = message
            .get("from")
            .and_then(|f| f.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or("unknown");

        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string());

        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }

        if !self.is_any_user_allowed(identities.iter().copied()) {
            tracing::warn!(
                username = %username,
                "Telegram: ignoring message from unauthorized user"
            );
            return None;
        }

        let kind = if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
            match BotCommand::parse(text) {
                Some(command) => EventKind::Command { command },
                None => EventKind::Text {
                    text: text.to_string(),
                },
            }
        } else if let Some(doc) = message.get("document") {
            let file_id = doc.get("file_id").and_then(|v| v.as_str())?;
            let mime_type = doc
                .get("mime_type")
                .and_then(|v| v.as_str())
                .map(String::from);
            let size_bytes = doc
                .get("file_size")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let file_name = doc
                .get("file_name")
                .and_then(|v| v.as_str())
                .map(String::from);

            EventKind::Document {
                document: DocumentInfo {
                    file_id: file_id.to_string(),
                    mime_type,
                    size_bytes,
                    file_name,
                },
            }
        } else {
            EventKind::Unsupported
        };

        let event = ChatEvent {
            chat_id,
            user_id: user_id.unwrap_or_else(|| username.to_string()),
            kind,
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
        };

        tracing::info!(
            trace_id = %event.trace_id,
            span_id = %event.span_id,
            chat_id = %event.chat_id,
            user_id = %event.user_id,
            "Telegram message received"
        );

        Some(event)
    }

    /// Long-poll getUpdates and forward decoded events to the processor.
    ///
    /// Runs until the receiving side of the channel is dropped. Poll and
    /// decode errors are logged and retried after a short backoff.
    pub async fn listen(&self, tx: mpsc::Sender<ChatEvent>) {
        let mut offset: i64 = 0;

        tracing::info!("Telegram transport listening for updates...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };

                    let Some(event) = self.decode_message(message) else {
                        continue;
                    };

                    if tx.send(event).await.is_err() {
                        tracing::info!("Event channel closed, stopping Telegram listener");
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn reply(&self, chat_id: &str, text: &str) -> TransportResult<i64> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed(format!(
                "sendMessage failed: {err}"
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        data.get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                TransportError::SendFailed("Missing message_id in sendMessage response".into())
            })
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> TransportResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id
        });

        let resp = self
            .client
            .post(self.api_url("deleteMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::DeleteFailed(format!(
                "deleteMessage failed: {err}"
            )));
        }

        Ok(())
    }

    async fn download_document(&self, file_id: &str) -> TransportResult<Vec<u8>> {
        // Step 1: Get the file path via getFile API
        let body = serde_json::json!({ "file_id": file_id });

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::Download(format!("getFile failed: {err}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                TransportError::Download("Missing file_path in getFile response".into())
            })?;

        // Step 2: Download the file
        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !file_resp.status().is_success() {
            return Err(TransportError::Download(format!(
                "file download failed with status {}",
                file_resp.status()
            )));
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> TransportResult<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let file_bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let part = Part::bytes(file_bytes).file_name(file_name.clone());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed(format!(
                "sendDocument failed: {err}"
            )));
        }

        tracing::info!("Telegram document sent to {chat_id}: {file_name}");
        Ok(())
    }
}

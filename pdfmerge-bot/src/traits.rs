//! Transport trait for talking to the chat platform.

use async_trait::async_trait;
use std::path::Path;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport error type.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Message delete failed: {0}")]
    DeleteFailed(String),

    #[error("File download failed: {0}")]
    Download(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Chat transport seam.
///
/// The controller and merge executor only talk to the platform through this
/// trait, so tests can substitute an in-memory fake.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Get the transport name.
    fn name(&self) -> &'static str;

    /// Send a text reply to a chat. Returns the sent message's ID so the
    /// caller can retract it later.
    async fn reply(&self, chat_id: &str, text: &str) -> TransportResult<i64>;

    /// Delete a previously sent message.
    ///
    /// Callers retracting feedback treat failures as best-effort and discard
    /// them after logging.
    async fn delete_message(&self, chat_id: &str, message_id: i64) -> TransportResult<()>;

    /// Fetch the raw bytes of an uploaded document by its file ID.
    async fn download_document(&self, file_id: &str) -> TransportResult<Vec<u8>>;

    /// Upload a document from a local path to a chat.
    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        caption: Option<&str>,
    ) -> TransportResult<()>;
}

//! Event types for chat communication.

use serde::{Deserialize, Serialize};

/// MIME type accepted for merging.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Bot commands understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotCommand {
    Start,
    Help,
    MergePdf,
}

impl BotCommand {
    /// Parse a command from message text.
    ///
    /// Accepts the `/command@BotName` form Telegram uses in group chats.
    pub fn parse(text: &str) -> Option<Self> {
        let command = text.split_whitespace().next()?;
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/mergepdf" => Some(Self::MergePdf),
            _ => None,
        }
    }
}

/// An uploaded document as declared by the transport.
///
/// The size is the *declared* size from the update payload; the bytes are not
/// fetched until merge time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Opaque file identifier used to fetch the bytes later
    pub file_id: String,
    /// MIME type as declared by the sender
    pub mime_type: Option<String>,
    /// Declared size in bytes
    pub size_bytes: u64,
    /// Original file name, if any
    pub file_name: Option<String>,
}

impl DocumentInfo {
    /// Check whether the declared MIME type is PDF.
    pub fn is_pdf(&self) -> bool {
        self.mime_type.as_deref() == Some(PDF_MIME_TYPE)
    }
}

/// What a chat event carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    /// A recognized bot command
    Command { command: BotCommand },
    /// A document upload
    Document { document: DocumentInfo },
    /// Free-form text (the controller watches for "done")
    Text { text: String },
    /// Content the bot does not handle (stickers, photos, voice, ...)
    Unsupported,
}

/// Unified incoming event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Chat the event originated from
    pub chat_id: String,
    /// User identifier
    pub user_id: String,
    /// Event payload
    pub kind: EventKind,
    /// Trace ID for this event chain
    pub trace_id: String,
    /// Span ID for this event
    pub span_id: String,
}

impl ChatEvent {
    /// Get the text content if this is a text event.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Check if this is a document event.
    pub const fn is_document(&self) -> bool {
        matches!(self.kind, EventKind::Document { .. })
    }
}

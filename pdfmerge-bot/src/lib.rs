//! Pdfmerge Bot - Telegram bot that merges uploaded PDFs into one document.
//!
//! ## Architecture
//!
//! The bot long-polls the Telegram Bot API for updates, decodes them into
//! typed events, and feeds them to the session controller:
//!
//! ```text
//! Telegram → getUpdates → TelegramTransport → ChatEvent (mpsc)
//!                                                  ↓
//!              AttachmentValidator ← SessionController → SessionStore
//!                                                  ↓ done
//!              User ←── sendDocument ←── MergeExecutor
//! ```
//!
//! Each chat owns its own collection session; `done` drains the session,
//! merges the collected documents in arrival order, delivers the result, and
//! removes every artifact the merge created.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod controller;
pub mod health;
pub mod merge;
pub mod message;
pub mod session;
pub mod telegram;
pub mod traits;
pub mod validator;

// Re-export commonly used types
pub use controller::SessionController;
pub use merge::{MergeError, MergeExecutor, MergedArtifact, StreamMerger};
pub use message::{BotCommand, ChatEvent, DocumentInfo, EventKind};
pub use session::{AttachmentRef, Session, SessionSnapshot, SessionState, SessionStore};
pub use telegram::TelegramTransport;
pub use traits::{ChatTransport, TransportError, TransportResult};
pub use validator::{AttachmentValidator, RejectReason, Verdict};

use pdfmerge_common::config::Config;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Queue depth between the Telegram listener and the event processor.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Start the bot and run until the process is stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let transport = Arc::new(TelegramTransport::new(&config.telegram));
    transport.init().await?;

    let controller = Arc::new(SessionController::new(
        transport.clone(),
        config.merge.clone(),
    ));

    if config.health.enabled {
        let health_config = config.health.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&health_config).await {
                tracing::error!(error = %e, "Health endpoint failed");
            }
        });
    }

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let listener = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.listen(tx).await })
    };

    tracing::info!("Event processor started");

    while let Some(event) = rx.recv().await {
        let controller = controller.clone();
        // Process each event in its own task; per-chat ordering is enforced
        // by the session mutex, not by the queue.
        tokio::spawn(async move {
            controller.handle_event(event).await;
        });
    }

    tracing::info!("Event processor stopped");
    listener.abort();

    Ok(())
}

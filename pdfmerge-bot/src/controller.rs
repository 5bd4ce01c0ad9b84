//! Session controller - the merge workflow state machine.
//!
//! Consumes chat events, applies the validator's verdicts to the per-chat
//! session, and drives drain → merge → delivery → cleanup on `done`.
//!
//! # Progress Feedback Strategy
//!
//! At most one progress notification is visible per chat: each acceptance
//! retracts the previous progress message (best-effort) before sending the
//! next one. The in-progress merge notice is tracked and retracted the same
//! way once the merge resolves.

use crate::merge::{MergeError, MergeExecutor};
use crate::message::{BotCommand, ChatEvent, DocumentInfo, EventKind};
use crate::session::{AttachmentRef, SessionState, SessionStore};
use crate::traits::{ChatTransport, TransportResult};
use crate::validator::{AttachmentValidator, RejectReason, Verdict};
use dashmap::DashMap;
use pdfmerge_common::config::MergeConfig;
use std::sync::Arc;
use tokio::sync::Mutex;

const WELCOME_TEXT: &str = "Welcome to the PDF Merger Bot!\nTry /help for more details.";

const HELP_TEXT: &str = "This bot can merge multiple PDFs into a single PDF.\n\n\
Usage:\n\
1. Send the /mergepdf command to start the merging process.\n\
2. Send the PDF files one by one.\n\
3. Send 'done' to start the merge operation.";

const COLLECT_TEXT: &str = "Please send the PDFs one by one. Send 'done' when finished.";

const INVALID_TEXT: &str = "Invalid command. Send /help for more information.";

// ============================================================================
// Feedback Tracker
// ============================================================================

/// Tracks the visible progress message for one chat.
#[derive(Debug, Default)]
struct FeedbackTracker {
    progress_message_id: Option<i64>,
}

// ============================================================================
// Session Controller
// ============================================================================

/// Orchestrates validation, session mutation, merging, and user feedback.
pub struct SessionController {
    transport: Arc<dyn ChatTransport>,
    store: SessionStore,
    validator: AttachmentValidator,
    executor: MergeExecutor,
    config: MergeConfig,
    /// Feedback trackers per chat
    feedback: DashMap<String, Mutex<FeedbackTracker>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ChatTransport>, config: MergeConfig) -> Self {
        Self {
            store: SessionStore::new(),
            validator: AttachmentValidator::new(config.clone()),
            executor: MergeExecutor::new(transport.clone(), config.clone()),
            transport,
            config,
            feedback: DashMap::new(),
        }
    }

    /// Handle one incoming event. Never fails: feedback delivery problems are
    /// logged and the controller returns to a well-defined state.
    pub async fn handle_event(&self, event: ChatEvent) {
        tracing::info!(
            trace_id = %event.trace_id,
            span_id = %event.span_id,
            chat_id = %event.chat_id,
            user_id = %event.user_id,
            "Handling chat event"
        );

        if let Err(e) = self.dispatch(&event).await {
            tracing::warn!(
                chat_id = %event.chat_id,
                error = %e,
                "Failed to deliver feedback"
            );
        }
    }

    async fn dispatch(&self, event: &ChatEvent) -> TransportResult<()> {
        let chat_id = event.chat_id.as_str();
        match &event.kind {
            EventKind::Command { command } => match command {
                BotCommand::Start => self.transport.reply(chat_id, WELCOME_TEXT).await.map(|_| ()),
                BotCommand::Help => self.transport.reply(chat_id, HELP_TEXT).await.map(|_| ()),
                BotCommand::MergePdf => self.on_begin(chat_id).await,
            },
            EventKind::Document { document } => self.on_document(chat_id, document).await,
            EventKind::Text { text } if text.trim().eq_ignore_ascii_case("done") => {
                self.on_done(chat_id).await
            }
            EventKind::Text { .. } | EventKind::Unsupported => {
                self.transport.reply(chat_id, INVALID_TEXT).await.map(|_| ())
            }
        }
    }

    /// `/mergepdf`: reset the chat's session and start collecting.
    ///
    /// Any in-flight collection is discarded without confirmation; the stale
    /// progress message (if any) is simply forgotten, matching the reference
    /// behavior.
    async fn on_begin(&self, chat_id: &str) -> TransportResult<()> {
        let cell = self.store.session(chat_id);
        cell.lock().await.begin();
        self.set_progress(chat_id, None).await;

        tracing::info!(chat_id = %chat_id, "Collection started");
        self.transport.reply(chat_id, COLLECT_TEXT).await.map(|_| ())
    }

    async fn on_document(&self, chat_id: &str, document: &DocumentInfo) -> TransportResult<()> {
        let cell = self.store.session(chat_id);
        let mut session = cell.lock().await;

        match self.validator.evaluate(&session.snapshot(), document) {
            Verdict::Ignore => Ok(()),
            Verdict::Reject(RejectReason::NotCollecting) => {
                drop(session);
                self.transport.reply(chat_id, INVALID_TEXT).await.map(|_| ())
            }
            Verdict::Reject(RejectReason::FileTooLarge) => {
                drop(session);
                let text = format!(
                    "File size exceeds the limit of {}. Please send a smaller PDF.",
                    format_file_size(self.config.max_file_size_bytes)
                );
                self.transport.reply(chat_id, &text).await.map(|_| ())
            }
            Verdict::Reject(RejectReason::LimitReached) => {
                drop(session);
                let text = format!(
                    "Maximum file limit of {} reached. Please send 'done' to start merging.",
                    self.config.max_files
                );
                self.transport.reply(chat_id, &text).await.map(|_| ())
            }
            Verdict::Accept => {
                let count = session.accept(AttachmentRef {
                    file_id: document.file_id.clone(),
                    size_bytes: document.size_bytes,
                });
                drop(session);

                tracing::info!(
                    chat_id = %chat_id,
                    file_id = %document.file_id,
                    size_bytes = document.size_bytes,
                    count,
                    "Attachment accepted"
                );
                self.supersede_progress(chat_id, count).await
            }
        }
    }

    /// `done`: drain the session and run the merge.
    async fn on_done(&self, chat_id: &str) -> TransportResult<()> {
        let cell = self.store.session(chat_id);
        let mut session = cell.lock().await;

        if session.snapshot().state != SessionState::Collecting {
            drop(session);
            return self.transport.reply(chat_id, INVALID_TEXT).await.map(|_| ());
        }

        // Hand the sequence to the merge before any blocking I/O; from here
        // on the session is Idle and new attachments start a fresh story.
        let refs = session.drain();
        drop(session);

        if let Some(message_id) = self.take_progress(chat_id).await {
            self.retract(chat_id, message_id).await;
        }

        let notice_id = match self.transport.reply(chat_id, "Merging in progress...").await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Failed to send merge notice");
                None
            }
        };

        match self.executor.execute(&refs).await {
            Ok(artifact) => {
                match self
                    .transport
                    .send_document(chat_id, artifact.output_path(), None)
                    .await
                {
                    Ok(()) => {
                        let text = format!(
                            "Merging completed. {} PDFs merged.",
                            artifact.merged_count()
                        );
                        self.send_feedback(chat_id, &text).await;
                    }
                    Err(e) => {
                        tracing::error!(chat_id = %chat_id, error = %e, "Failed to deliver merged document");
                        self.send_feedback(chat_id, "Failed to send the merged PDF.").await;
                    }
                }
                if let Some(message_id) = notice_id {
                    self.retract(chat_id, message_id).await;
                }
                // The output has been delivered (or delivery abandoned);
                // nothing from this merge may stay on disk.
                artifact.cleanup().await;
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Merge failed");
                self.send_feedback(chat_id, &failure_notice(&e, &self.config)).await;
                if let Some(message_id) = notice_id {
                    self.retract(chat_id, message_id).await;
                }
            }
        }

        Ok(())
    }

    /// Replace the visible progress message with a fresh count notice.
    async fn supersede_progress(&self, chat_id: &str, count: usize) -> TransportResult<()> {
        if let Some(message_id) = self.take_progress(chat_id).await {
            self.retract(chat_id, message_id).await;
        }

        let text = format!("{count} PDFs received so far. Please send 'done' when finished.");
        let message_id = self.transport.reply(chat_id, &text).await?;
        self.set_progress(chat_id, Some(message_id)).await;
        Ok(())
    }

    /// Delete a feedback message. Failure is intentionally discarded after
    /// logging: retraction is cosmetic and must never block the flow.
    async fn retract(&self, chat_id: &str, message_id: i64) {
        if let Err(e) = self.transport.delete_message(chat_id, message_id).await {
            tracing::warn!(
                chat_id = %chat_id,
                message_id,
                error = %e,
                "Failed to retract feedback message"
            );
        }
    }

    /// Send a notice whose delivery failure must not interrupt the merge
    /// epilogue (cleanup still has to run).
    async fn send_feedback(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.transport.reply(chat_id, text).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to deliver feedback");
        }
    }

    fn tracker(&self, chat_id: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<FeedbackTracker>> {
        self.feedback
            .entry(chat_id.to_string())
            .or_insert_with(|| Mutex::new(FeedbackTracker::default()))
            .downgrade()
    }

    async fn take_progress(&self, chat_id: &str) -> Option<i64> {
        let tracker = self.tracker(chat_id);
        let mut guard = tracker.lock().await;
        guard.progress_message_id.take()
    }

    async fn set_progress(&self, chat_id: &str, message_id: Option<i64>) {
        let tracker = self.tracker(chat_id);
        let mut guard = tracker.lock().await;
        guard.progress_message_id = message_id;
    }
}

/// Map a merge failure to its user-visible notice.
fn failure_notice(error: &MergeError, config: &MergeConfig) -> String {
    match error {
        MergeError::NoInput => "No PDFs received. Send the PDFs first.".into(),
        MergeError::TotalSizeExceeded { .. } => format!(
            "Total file size exceeds the limit of {}. Please send smaller PDFs.",
            format_file_size(config.max_total_size_bytes)
        ),
        MergeError::Fetch { .. } | MergeError::Io(_) => {
            "Merging failed. Please try again later.".into()
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

// ============================================================================
// Tests
// ============================================================================

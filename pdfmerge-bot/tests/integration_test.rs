//! Integration tests for the pdfmerge bot.
//!
//! Drives the session controller through the real Telegram transport against
//! a mock Bot API server, covering the whole collect-merge-deliver-cleanup
//! flow.

use pdfmerge_bot::{
    BotCommand, ChatEvent, DocumentInfo, EventKind, SessionController, TelegramTransport,
};
use pdfmerge_common::config::{MergeConfig, TelegramConfig};
use pdfmerge_common::logging::{generate_span_id, generate_trace_id};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

const BOT_TOKEN: &str = "123:ABC";

fn event(kind: EventKind) -> ChatEvent {
    ChatEvent {
        chat_id: "42".into(),
        user_id: "7".into(),
        kind,
        trace_id: generate_trace_id(),
        span_id: generate_span_id(),
    }
}

fn pdf_event(file_id: &str, size_bytes: u64) -> ChatEvent {
    event(EventKind::Document {
        document: DocumentInfo {
            file_id: file_id.into(),
            mime_type: Some("application/pdf".into()),
            size_bytes,
            file_name: Some(format!("{file_id}.pdf")),
        },
    })
}

async fn transport_for(server: &MockServer) -> Arc<TelegramTransport> {
    let config = TelegramConfig {
        bot_token: BOT_TOKEN.into(),
        allowed_users: vec!["*".into()],
        poll_timeout_secs: 1,
    };
    Arc::new(TelegramTransport::new(&config).with_api_base(server.uri()))
}

/// Mount the Bot API surface the merge flow touches.
async fn mount_bot_api(server: &MockServer, files: &[(&str, &[u8])]) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 1}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/deleteMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": true
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendDocument")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 2}
        })))
        .mount(server)
        .await;

    for (file_id, bytes) in files {
        Mock::given(method("POST"))
            .and(path(format!("/bot{BOT_TOKEN}/getFile")))
            .and(body_partial_json(json!({"file_id": file_id})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_path": format!("documents/{file_id}")}
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/file/bot{BOT_TOKEN}/documents/{file_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(server)
            .await;
    }
}

/// Every file left under `dir`, recursively.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.extend(files_under(&path));
        } else {
            found.push(path);
        }
    }
    found
}

async fn requests_to(server: &MockServer, api_method: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with(api_method))
        .count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_merge_flow_over_the_wire() {
    let server = MockServer::start().await;
    mount_bot_api(&server, &[("doc-a", b"%PDF-a"), ("doc-b", b"%PDF-b")]).await;

    let dir = tempfile::tempdir().unwrap();
    let transport = transport_for(&server).await;
    let controller = SessionController::new(
        transport,
        MergeConfig {
            work_dir: dir.path().join("merged_pdfs"),
            ..MergeConfig::default()
        },
    );

    controller
        .handle_event(event(EventKind::Command {
            command: BotCommand::MergePdf,
        }))
        .await;
    controller.handle_event(pdf_event("doc-a", 1024)).await;
    controller.handle_event(pdf_event("doc-b", 2048)).await;
    controller
        .handle_event(event(EventKind::Text {
            text: "done".into(),
        }))
        .await;

    // Both inputs were fetched and exactly one merged document delivered
    assert_eq!(requests_to(&server, "/getFile").await, 2);
    assert_eq!(requests_to(&server, "/sendDocument").await, 1);

    // No artifacts remain on disk
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn test_done_while_idle_merges_nothing() {
    let server = MockServer::start().await;
    mount_bot_api(&server, &[]).await;

    let dir = tempfile::tempdir().unwrap();
    let transport = transport_for(&server).await;
    let controller = SessionController::new(
        transport,
        MergeConfig {
            work_dir: dir.path().join("merged_pdfs"),
            ..MergeConfig::default()
        },
    );

    controller
        .handle_event(event(EventKind::Text {
            text: "done".into(),
        }))
        .await;

    // One invalid-command reply, no downloads, no delivery
    assert_eq!(requests_to(&server, "/sendMessage").await, 1);
    assert_eq!(requests_to(&server, "/getFile").await, 0);
    assert_eq!(requests_to(&server, "/sendDocument").await, 0);
    assert!(files_under(dir.path()).is_empty());
}

#[tokio::test]
async fn test_fetch_failure_surfaces_notice_and_cleans_up() {
    let server = MockServer::start().await;
    // Only doc-a resolvable; doc-b's getFile answers 400
    mount_bot_api(&server, &[("doc-a", b"%PDF-a")]).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/getFile")))
        .and(body_partial_json(json!({"file_id": "doc-b"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: file not found"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let transport = transport_for(&server).await;
    let controller = SessionController::new(
        transport,
        MergeConfig {
            work_dir: dir.path().join("merged_pdfs"),
            ..MergeConfig::default()
        },
    );

    controller
        .handle_event(event(EventKind::Command {
            command: BotCommand::MergePdf,
        }))
        .await;
    controller.handle_event(pdf_event("doc-a", 1024)).await;
    controller.handle_event(pdf_event("doc-b", 1024)).await;
    controller
        .handle_event(event(EventKind::Text {
            text: "done".into(),
        }))
        .await;

    // Nothing was delivered and the materialized first input is gone again
    assert_eq!(requests_to(&server, "/sendDocument").await, 0);
    assert!(files_under(dir.path()).is_empty());
}

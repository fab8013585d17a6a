#![allow(clippy::similar_names)]

//! End-to-end tests for the `mirror-cli` binary.
//!
//! Built only with the `cli` feature, which also builds the binary.
//! Each test starts a [`FakeImapServer`] on a random port and spawns
//! the compiled `mirror-cli` binary with environment variables
//! pointing at the fake server and a scratch mirror root, then asserts
//! on stdout.

use crate::fake_imap::{FakeImapServer, MailboxBuilder};
use std::path::Path;

const USER: &str = "me@example.com";
const PASS: &str = "app-password";
const ALL_MAIL: &str = "[Gmail]/All Mail";

/// Build a minimal valid RFC 2822 email.
fn make_raw_email(from: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
         To: {USER}\r\n\
         Subject: {subject}\r\n\
         Date: Wed, 01 May 2024 10:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}"
    )
    .into_bytes()
}

fn mailbox() -> MailboxBuilder {
    MailboxBuilder::new()
        .credentials(USER, PASS)
        .folder("INBOX")
        .noselect("[Gmail]")
        .folder(ALL_MAIL)
        .email(
            1,
            1001,
            true,
            &make_raw_email("alice@example.com", "Lunch", "See you at noon."),
        )
        .labels(&["Friends"])
        .email(
            2,
            1002,
            false,
            &make_raw_email("billing@example.com", "Invoice 42", "Invoice attached."),
        )
        .labels(&["Billing"])
}

/// Run `mirror-cli` against `server` with `root` as the mirror root.
/// Returns `(stdout, stderr, success)`.
async fn run_cli(
    server: &FakeImapServer,
    root: &Path,
    password: &str,
    args: &[&str],
) -> (String, String, bool) {
    let bin = env!("CARGO_BIN_EXE_mirror-cli");
    let output = tokio::process::Command::new(bin)
        .args(args)
        .env("IMAP_HOST", "127.0.0.1")
        .env("IMAP_PORT", server.port().to_string())
        .env("IMAP_SECURITY", "starttls")
        .env("IMAP_ACCEPT_INVALID_CERTS", "true")
        .env("IMAP_USERNAME", USER)
        .env("IMAP_PASSWORD", password)
        .env("MIRROR_ROOT", root)
        .env("MIRROR_MAILBOXES", format!("{ALL_MAIL}=archive"))
        .env_remove("RUST_LOG")
        .output()
        .await
        .expect("failed to run mirror-cli");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_folders() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (stdout, _, success) = run_cli(&server, dir.path(), PASS, &["folders"]).await;

    assert!(success, "mirror-cli folders failed");
    assert!(stdout.contains("INBOX"));
    assert!(stdout.contains("[Gmail] (not selectable)"));
    assert!(stdout.contains(ALL_MAIL));
}

#[tokio::test]
async fn test_sync_then_search_and_show() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (stdout, stderr, success) = run_cli(&server, dir.path(), PASS, &["sync"]).await;
    assert!(success, "mirror-cli sync failed: {stderr}");
    assert!(stdout.contains("archive"));
    assert!(dir.path().join(USER).join("mirror.sqlite3").is_file());
    assert!(dir.path().join(USER).join("archive/cur/1001").is_file());
    assert!(dir.path().join(USER).join("archive/new/1002").is_file());

    let (stdout, _, success) = run_cli(&server, dir.path(), PASS, &["search", "invoice"]).await;
    assert!(success, "mirror-cli search failed");
    assert!(stdout.contains("1002"));
    assert!(stdout.contains("Invoice 42"));
    assert!(stdout.contains("1 message(s)"));

    let (stdout, _, success) = run_cli(&server, dir.path(), PASS, &["show", "1001"]).await;
    assert!(success, "mirror-cli show failed");
    assert!(stdout.contains("Subject: Lunch"));
    assert!(stdout.contains("Labels:  Friends"));
    assert!(stdout.contains("In:      [Gmail]/All Mail (UID 1)"));
    assert!(stdout.contains("See you at noon."));

    let (stdout, _, success) =
        run_cli(&server, dir.path(), PASS, &["show", "1001", "--raw"]).await;
    assert!(success, "mirror-cli show --raw failed");
    assert!(stdout.starts_with("From: alice@example.com\r\n"));
}

#[tokio::test]
async fn test_sync_json_reports_progress_per_mailbox() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (stdout, _, success) = run_cli(&server, dir.path(), PASS, &["--json", "sync"]).await;
    assert!(success, "mirror-cli --json sync failed");

    let reports: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout is not valid JSON");
    let arr = reports.as_array().expect("JSON output should be an array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["mailbox"], ALL_MAIL);
    assert_eq!(arr[0]["fetched"], 2);
    assert_eq!(arr[0]["checkpoint_after"], 2);

    // Nothing new on the second run.
    let (stdout, _, success) = run_cli(&server, dir.path(), PASS, &["--json", "sync"]).await;
    assert!(success);
    let reports: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(reports[0]["fetched"], 0);
    assert_eq!(reports[0]["refreshed"], 2);
}

#[tokio::test]
async fn test_sync_mailbox_override() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (_, stderr, success) = run_cli(
        &server,
        dir.path(),
        PASS,
        &["sync", "--mailbox", "[Gmail]/All Mail=everything"],
    )
    .await;
    assert!(success, "mirror-cli sync --mailbox failed: {stderr}");
    assert!(dir.path().join(USER).join("everything/cur/1001").is_file());
    assert!(!dir.path().join(USER).join("archive").exists());
}

#[tokio::test]
async fn test_wrong_password_fails() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (_, stderr, success) = run_cli(&server, dir.path(), "wrong", &["sync"]).await;
    assert!(!success);
    assert!(stderr.contains("Login rejected"));
}

#[tokio::test]
async fn test_remote_search_json() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (stdout, _, success) =
        run_cli(&server, dir.path(), PASS, &["--json", "remote-search", "label:Billing"]).await;
    assert!(success, "mirror-cli remote-search failed");

    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let arr = hits.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["uid"], 2);
    assert_eq!(arr[0]["global_id"], 1002);
    assert_eq!(arr[0]["mirrored"], false);
}

#[tokio::test]
async fn test_show_unknown_message_fails() {
    let server = FakeImapServer::start(mailbox().build()).await;
    let dir = tempfile::tempdir().unwrap();

    let (_, stderr, success) = run_cli(&server, dir.path(), PASS, &["show", "99"]).await;
    assert!(!success);
    assert!(stderr.contains("not mirrored"));
}

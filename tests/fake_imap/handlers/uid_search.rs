//! UID SEARCH command handler.
//!
//! Supports the criteria the mirror sends:
//!
//! - `ALL` -- every UID in the selected folder
//! - `UID <set>` -- UIDs inside a set such as `5:*`
//! - `X-GM-RAW "<query>"` -- Gmail's search syntax. The fake matches
//!   each whitespace separated term: `label:<name>` against the
//!   labels, `is:unread` / `is:read` against `\Seen`, anything else
//!   case-insensitively against the raw message text.
//!
//! The response format (RFC 3501 Section 7.2.5):
//!
//! ```text
//! * SEARCH 5 7 9
//! A0003 OK SEARCH completed (Success)
//! ```

use crate::fake_imap::command::{in_uid_set, parse_uid_set};
use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Folder, Mailbox, TestEmail};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle UID SEARCH. `criteria` is everything after `SEARCH`.
pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[String],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder) = selected_folder.and_then(|name| mailbox.get_folder(name)) else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let Some(uids) = matching_uids(folder, criteria) else {
        let resp = format!("{tag} BAD Could not parse command\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    // "* SEARCH\r\n" when nothing matches.
    let mut line = String::from("* SEARCH");
    for uid in uids {
        line.push_str(&format!(" {uid}"));
    }
    line.push_str("\r\n");
    let _ = write_line(stream, &line).await;
    let resp = format!("{tag} OK SEARCH completed (Success)\r\n");
    let _ = write_line(stream, &resp).await;
}

fn matching_uids(folder: &Folder, criteria: &[String]) -> Option<Vec<u32>> {
    let key = criteria.first()?.to_ascii_uppercase();
    let matches: Box<dyn Fn(&TestEmail) -> bool> = match (key.as_str(), criteria.get(1)) {
        ("ALL", None) => Box::new(|_| true),
        ("UID", Some(set)) => {
            let ranges = parse_uid_set(set, folder.max_uid())?;
            Box::new(move |e| in_uid_set(&ranges, e.uid))
        }
        ("X-GM-RAW", Some(query)) => {
            let query = query.clone();
            Box::new(move |e| matches_raw_query(e, &query))
        }
        _ => return None,
    };

    Some(
        folder
            .emails
            .iter()
            .filter(|e| matches(e))
            .map(|e| e.uid)
            .collect(),
    )
}

fn matches_raw_query(email: &TestEmail, query: &str) -> bool {
    let text = String::from_utf8_lossy(&email.raw).to_lowercase();
    query.split_whitespace().all(|term| {
        let term = term.to_lowercase();
        if let Some(label) = term.strip_prefix("label:") {
            email.labels.iter().any(|l| l.to_lowercase() == label)
        } else if term == "is:unread" {
            !email.is_seen()
        } else if term == "is:read" {
            email.is_seen()
        } else {
            text.contains(&term)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use crate::fake_imap::io::{pipe, received};

    fn mailbox() -> Mailbox {
        MailboxBuilder::new()
            .folder("[Gmail]/All Mail")
            .email(2, 200, true, b"Subject: Invoice\r\n\r\nPay me")
            .labels(&["Billing"])
            .email(4, 400, false, b"Subject: Hello\r\n\r\nHi there")
            .build()
    }

    async fn run(criteria: &[&str]) -> String {
        let (mut stream, client) = pipe();

        let criteria: Vec<String> = criteria.iter().map(ToString::to_string).collect();
        handle_uid_search("A1", &criteria, &mailbox(), Some("[Gmail]/All Mail"), &mut stream)
            .await;
        drop(stream);

        received(client).await
    }

    #[tokio::test]
    async fn all_returns_every_uid() {
        assert!(run(&["ALL"]).await.starts_with("* SEARCH 2 4\r\n"));
    }

    #[tokio::test]
    async fn open_range_above_highest_uid_echoes_highest() {
        assert!(run(&["UID", "5:*"]).await.starts_with("* SEARCH 4\r\n"));
        assert!(run(&["UID", "3:*"]).await.starts_with("* SEARCH 4\r\n"));
    }

    #[tokio::test]
    async fn raw_query_matches_labels_text_and_state() {
        assert!(run(&["X-GM-RAW", "label:billing"]).await.starts_with("* SEARCH 2\r\n"));
        assert!(run(&["X-GM-RAW", "hi there"]).await.starts_with("* SEARCH 4\r\n"));
        assert!(run(&["X-GM-RAW", "is:unread"]).await.starts_with("* SEARCH 4\r\n"));
        assert!(run(&["X-GM-RAW", "nothing-like-this"]).await.starts_with("* SEARCH\r\n"));
    }

    #[tokio::test]
    async fn unknown_criteria_are_bad() {
        assert!(run(&["UNSEEN"]).await.contains("A1 BAD"));
    }
}

//! LIST command handler.
//!
//! Responds with one `* LIST` line per folder, carrying the folder's
//! attributes, followed by the tagged OK (RFC 3501 Section 7.2.2):
//!
//! ```text
//! * LIST (\HasChildren \Noselect) "/" "[Gmail]"
//! * LIST (\HasNoChildren) "/" "[Gmail]/All Mail"
//! A0002 OK Success
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LIST command. The reference and pattern are ignored;
/// every folder is listed.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    for folder in &mailbox.folders {
        let line = format!(
            "* LIST ({}) \"/\" \"{}\"\r\n",
            folder.attributes.join(" "),
            folder.name
        );
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    let resp = format!("{tag} OK Success\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use crate::fake_imap::io::{pipe, received};

    async fn run(tag: &str, mailbox: &Mailbox) -> String {
        let (mut stream, client) = pipe();

        handle_list(tag, mailbox, &mut stream).await;
        drop(stream);

        received(client).await
    }

    #[tokio::test]
    async fn lists_gmail_hierarchy() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .noselect("[Gmail]")
            .folder("[Gmail]/All Mail")
            .build();

        let output = run("A1", &mailbox).await;

        assert!(output.contains("* LIST (\\HasNoChildren) \"/\" \"INBOX\""));
        assert!(output.contains("* LIST (\\HasChildren \\Noselect) \"/\" \"[Gmail]\""));
        assert!(output.contains("\"[Gmail]/All Mail\""));
        assert!(output.ends_with("A1 OK Success\r\n"));
    }

    #[tokio::test]
    async fn empty_mailbox_returns_only_ok() {
        let mailbox = MailboxBuilder::new().build();
        let output = run("T2", &mailbox).await;

        assert_eq!(output, "T2 OK Success\r\n");
    }
}

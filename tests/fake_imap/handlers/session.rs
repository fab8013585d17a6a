//! LOGIN and LOGOUT handlers.
//!
//! LOGIN checks the credentials against the mailbox's configured pair.
//! A rejection is a tagged `NO` with the `AUTHENTICATIONFAILED`
//! response code, which is how Gmail answers a wrong app password:
//!
//! ```text
//!   Client:  A0001 LOGIN "me@example.com" "wrong"
//!   Server:  A0001 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)
//! ```
//!
//! LOGOUT sends the untagged BYE before its tagged OK.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle LOGIN. Returns whether the client is now authenticated.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &[String],
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> bool {
    let [user, pass] = args else {
        let _ = write_line(stream, &format!("{tag} BAD LOGIN expects user and password\r\n")).await;
        return false;
    };

    if mailbox.accepts(user, pass) {
        let resp = format!("{tag} OK {user} authenticated (Success)\r\n");
        write_line(stream, &resp).await.is_ok()
    } else {
        let resp = format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n");
        let _ = write_line(stream, &resp).await;
        false
    }
}

/// Handle LOGOUT. Sends BYE + tagged OK.
pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* BYE LOGOUT Requested\r\n").await;
    let resp = format!("{tag} OK 73 good day (Success)\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use crate::fake_imap::io::{pipe, received};

    async fn login(args: &[&str], mailbox: &Mailbox) -> (String, bool) {
        let (mut stream, client) = pipe();

        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        let ok = handle_login("A1", &args, mailbox, &mut stream).await;
        drop(stream);

        let output = received(client).await;
        (output, ok)
    }

    #[tokio::test]
    async fn open_mailbox_accepts_anyone() {
        let mailbox = MailboxBuilder::new().build();
        let (output, ok) = login(&["anyone", "anything"], &mailbox).await;
        assert!(ok);
        assert!(output.starts_with("A1 OK"));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_with_no() {
        let mailbox = MailboxBuilder::new().credentials("me@example.com", "right").build();
        let (output, ok) = login(&["me@example.com", "wrong"], &mailbox).await;
        assert!(!ok);
        assert!(output.contains("A1 NO [AUTHENTICATIONFAILED]"));
    }

    #[tokio::test]
    async fn missing_password_is_bad() {
        let mailbox = MailboxBuilder::new().build();
        let (output, ok) = login(&["me@example.com"], &mailbox).await;
        assert!(!ok);
        assert!(output.contains("A1 BAD"));
    }

    #[tokio::test]
    async fn logout_says_bye_first() {
        let (mut stream, client) = pipe();
        handle_logout("Z9", &mut stream).await;
        drop(stream);

        let output = received(client).await;
        assert!(output.starts_with("* BYE"));
        assert!(output.ends_with("Z9 OK 73 good day (Success)\r\n"));
    }
}

//! IMAP connection and TLS helpers
//!
//! [`ImapConnector`] opens authenticated `async-imap` sessions over
//! implicit TLS or STARTTLS and wraps them as [`ImapSession`], the
//! production [`MailSession`].

use crate::config::{CredentialProvider, ImapConfig, Security};
use crate::error::{Error, Result};
use crate::folder::Mailbox;
use crate::parser::split_fetch_responses;
use crate::session::{Connector, FULL_SPEC, FullFetch, MailSession, UidRange, normalize_uids};
use async_imap::Session;
use async_imap::types::{Name, NameAttribute};
use futures::TryStreamExt;
use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

type Stream = Compat<TlsStream<TcpStream>>;

/// Connects to the configured server with the provider's credentials.
#[derive(Clone)]
pub struct ImapConnector {
    config: ImapConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl ImapConnector {
    pub fn new(config: ImapConfig, credentials: impl CredentialProvider + 'static) -> Self {
        Self {
            config,
            credentials: Arc::new(credentials),
        }
    }

    fn tls_connector(&self) -> Result<TlsConnector> {
        let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Transport(format!("TLS setup failed: {e}")))?;

        let config = if self.config.accept_invalid_certs {
            warn!(host = %self.config.host, "Certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
                .with_no_client_auth()
        } else {
            builder
                .with_root_certificates(native_roots()?)
                .with_no_client_auth()
        };
        Ok(TlsConnector::from(Arc::new(config)))
    }

    async fn handshake(&self, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| Error::Transport(format!("Invalid server name: {e}")))?;
        self.tls_connector()?
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Transport(format!("TLS handshake failed: {e}")))
    }

    async fn open_stream(&self) -> Result<Stream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("Connecting to IMAP server at {}", addr);

        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Transport(format!("connect to {addr}: {e}")))?;

        let tcp_stream = match self.config.security {
            Security::Tls => tcp_stream,
            Security::StartTls => {
                let mut client = async_imap::Client::new(tcp_stream.compat());
                client
                    .run_command_and_check_ok("STARTTLS", None)
                    .await
                    .map_err(|e| Error::Transport(format!("STARTTLS failed: {e}")))?;
                client.into_inner().into_inner()
            }
        };

        Ok(self.handshake(tcp_stream).await?.compat())
    }
}

impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self) -> Result<ImapSession> {
        let credentials = self.credentials.credentials()?;
        let client = async_imap::Client::new(self.open_stream().await?);

        let session = client
            .login(&credentials.identity, &credentials.secret)
            .await
            .map_err(|(e, _)| match e {
                async_imap::error::Error::No(message) => Error::Authentication(message),
                other => classify("LOGIN", other),
            })?;

        info!(identity = %credentials.identity, "Connected to IMAP server");
        Ok(ImapSession { inner: session })
    }
}

/// A logged-in `async-imap` session.
pub struct ImapSession {
    inner: Session<Stream>,
}

impl ImapSession {
    async fn raw(&mut self, command: &str) -> Result<Vec<u8>> {
        debug!(command, "IMAP command");
        self.inner
            .run_command_and_read_response(command)
            .await
            .map_err(|e| classify(command, e))
    }

    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        let uids = self
            .inner
            .uid_search(query)
            .await
            .map_err(|e| classify("UID SEARCH", e))?;
        Ok(normalize_uids(uids, 0))
    }
}

impl MailSession for ImapSession {
    async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<u32> {
        let (command, selected) = if read_only {
            ("EXAMINE", self.inner.examine(name).await)
        } else {
            ("SELECT", self.inner.select(name).await)
        };
        let mailbox = selected.map_err(|e| classify(command, e))?;
        debug!(mailbox = name, exists = mailbox.exists, "{command} completed");
        Ok(mailbox.exists)
    }

    async fn search_uids_above(&mut self, uid: u32) -> Result<Vec<u32>> {
        let found = self
            .uid_search(&format!("UID {}", UidRange::open(uid.saturating_add(1))))
            .await?;
        Ok(normalize_uids(found, uid))
    }

    async fn search_by_query(&mut self, criteria: &str) -> Result<Vec<u32>> {
        self.uid_search(&format!("X-GM-RAW {}", quote(criteria)))
            .await
    }

    async fn fetch_attributes(&mut self, range: UidRange, spec: &str) -> Result<Vec<String>> {
        let raw = self.raw(&format!("UID FETCH {range} {spec}")).await?;
        Ok(split_fetch_responses(&raw)?
            .into_iter()
            .map(|block| block.attributes)
            .collect())
    }

    async fn fetch_full(&mut self, uid: u32) -> Result<FullFetch> {
        let raw = self.raw(&format!("UID FETCH {uid} {FULL_SPEC}")).await?;
        split_fetch_responses(&raw)?
            .into_iter()
            .find_map(|block| {
                block.body.map(|body| FullFetch {
                    attributes: block.attributes,
                    body,
                })
            })
            .ok_or_else(|| Error::protocol("UID FETCH", format!("no message body for UID {uid}")))
    }

    async fn list_mailboxes(&mut self) -> Result<Vec<Mailbox>> {
        let names: Vec<Name> = self
            .inner
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| classify("LIST", e))?
            .try_collect()
            .await
            .map_err(|e| classify("LIST", e))?;
        debug!(count = names.len(), "LIST completed");
        Ok(names.iter().map(mailbox_from_name).collect())
    }

    async fn logout(&mut self) -> Result<()> {
        self.inner
            .logout()
            .await
            .map_err(|e| classify("LOGOUT", e))
    }
}

/// Sort an `async-imap` error into the crate's failure kinds.
fn classify(command: &str, err: async_imap::error::Error) -> Error {
    use async_imap::error::Error as ImapError;

    match err {
        ImapError::Io(e) => Error::Transport(format!("{command}: {e}")),
        ImapError::ConnectionLost => Error::Transport(format!("{command}: connection lost")),
        ImapError::Parse(e) => Error::Parse(format!("{command}: {e}")),
        ImapError::No(message) | ImapError::Bad(message) => Error::protocol(command, message),
        other => Error::protocol(command, other),
    }
}

fn mailbox_from_name(name: &Name) -> Mailbox {
    Mailbox {
        name: name.name().to_string(),
        delimiter: name.delimiter().map(str::to_string),
        attributes: name.attributes().iter().map(attribute_text).collect(),
    }
}

/// Render a `LIST` attribute the way it appears on the wire.
fn attribute_text(attribute: &NameAttribute<'_>) -> String {
    let text = match attribute {
        NameAttribute::NoInferiors => "\\Noinferiors",
        NameAttribute::NoSelect => "\\Noselect",
        NameAttribute::Marked => "\\Marked",
        NameAttribute::Unmarked => "\\Unmarked",
        NameAttribute::All => "\\All",
        NameAttribute::Archive => "\\Archive",
        NameAttribute::Drafts => "\\Drafts",
        NameAttribute::Flagged => "\\Flagged",
        NameAttribute::Junk => "\\Junk",
        NameAttribute::Sent => "\\Sent",
        NameAttribute::Trash => "\\Trash",
        NameAttribute::Extension(other) => return other.to_string(),
        other => return format!("\\{other:?}"),
    };
    text.to_string()
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn native_roots() -> Result<RootCertStore> {
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        warn!(error = %e, "Skipping unreadable native certificate");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(added, ignored, "Loaded native root certificates");

    if roots.is_empty() {
        return Err(Error::Transport("no usable root certificates".into()));
    }
    Ok(roots)
}

/// Certificate verifier that accepts all certificates
/// (for local bridges and self-signed test servers).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

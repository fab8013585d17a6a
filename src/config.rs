//! Connection, credential and mirror configuration

use crate::error::{Error, Result};
use crate::folder::{Folder, SyncTarget};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (port 993).
    Tls,
    /// Plain TCP upgraded with `STARTTLS`.
    StartTls,
}

impl FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Invalid IMAP_SECURITY: {other}"))),
        }
    }
}

/// IMAP server endpoint
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
    /// Skip certificate verification. Only for local bridges and test
    /// servers with self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            security: Security::Tls,
            accept_invalid_certs: false,
        }
    }
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `IMAP_HOST` (default: `imap.gmail.com`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_SECURITY`, `tls` or `starttls` (default: `tls`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a malformed port, security mode or flag.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or(defaults.host),
            port: env::var("IMAP_PORT")
                .map_or(Ok(defaults.port), |p| p.parse())
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            security: env::var("IMAP_SECURITY")
                .map_or(Ok(defaults.security), |s| s.parse())?,
            accept_invalid_certs: env::var("IMAP_ACCEPT_INVALID_CERTS")
                .map_or(Ok(false), |v| parse_bool(&v))?,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "Invalid IMAP_ACCEPT_INVALID_CERTS: {other}"
        ))),
    }
}

/// An `(identity, secret)` pair.
#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials on demand. How they are obtained (keychain,
/// prompt, environment) is up to the implementation.
pub trait CredentialProvider: Send + Sync {
    /// The identity and secret to log in with.
    ///
    /// # Errors
    ///
    /// Fails when the credentials are unavailable.
    fn credentials(&self) -> Result<Credentials>;
}

/// Reads `IMAP_USERNAME` and `IMAP_PASSWORD`, loading `.env` first.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        dotenvy::dotenv().ok();

        Ok(Credentials {
            identity: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            secret: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
        })
    }
}

/// Fixed credentials, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl StaticCredentials {
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self(Credentials {
            identity: identity.into(),
            secret: secret.into(),
        })
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

/// Where and what to mirror.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Parent of the per-account directories.
    pub root: PathBuf,
    pub targets: Vec<SyncTarget>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mail"),
            targets: Folder::defaults(),
        }
    }
}

impl MirrorConfig {
    /// Load mirror configuration from environment variables
    ///
    /// - `MIRROR_ROOT` (default: `./mail`)
    /// - `MIRROR_MAILBOXES`, `remote=local` pairs separated by `;`
    ///   (default: All Mail, Sent Mail and Drafts)
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when `MIRROR_MAILBOXES` is set but invalid.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            root: env::var("MIRROR_ROOT").map_or(defaults.root, PathBuf::from),
            targets: match env::var("MIRROR_MAILBOXES") {
                Ok(raw) => parse_targets(&raw)?,
                Err(_) => defaults.targets,
            },
        })
    }

    /// The account's directory: `<root>/<identity>`.
    #[must_use]
    pub fn account_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }
}

/// Parse `remote=local` pairs. A bare `remote` derives its local name
/// the same way [`Folder::local_name`] does.
///
/// # Errors
///
/// [`Error::Config`] when nothing is listed or an entry is
/// invalid.
pub fn parse_targets(raw: &str) -> Result<Vec<SyncTarget>> {
    let targets: Vec<SyncTarget> = raw
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_target)
        .collect::<Result<_>>()?;

    if targets.is_empty() {
        return Err(Error::Config("MIRROR_MAILBOXES is empty".into()));
    }
    Ok(targets)
}

/// Parse one `remote=local` pair.
///
/// # Errors
///
/// [`Error::Config`] for an empty name, or a local name that is
/// not a plain directory name.
pub fn parse_target(raw: &str) -> Result<SyncTarget> {
    match raw.split_once('=') {
        Some((remote, local)) => {
            let (remote, local) = (remote.trim(), local.trim());
            if remote.is_empty()
                || local.is_empty()
                || local.starts_with('.')
                || local.contains(['/', '\\'])
            {
                return Err(Error::Config(format!("Invalid mailbox mapping: {raw}")));
            }
            Ok(SyncTarget::new(remote, local))
        }
        None => Ok(SyncTarget::from(&Folder::from(raw))),
    }
}

//! Shared secret resolution
//!
//! Two sources feed the store, both plain text with lines of the form
//! `<key> <secret words...>` and `#` comments:
//!
//! - `secrets`: the first line whose key starts with `127.0.0.1` supplies the
//!   single default secret.
//! - `clients`: every line maps a textual address prefix to a secret. The key
//!   `0.0.0.0` is a catch-all tried only after every literal prefix failed.
//!
//! Matching is a plain string prefix test on the host part of the source
//! address, not a subnet match: `10.0.0.` matches `10.0.0.9` but also
//! `10.0.0.99`, and `10.1` matches `10.12.0.1`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key of the default secret line in the secrets file
pub const LOCAL_KEY: &str = "127.0.0.1";
/// Catch-all key in the client mapping file
pub const WILDCARD_KEY: &str = "0.0.0.0";

pub const SECRETS_FILE: &str = "secrets";
pub const CLIENTS_FILE: &str = "clients";

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("no shared secret configured")]
    NoSecretConfigured,
    #[error("no client address available for secret lookup")]
    NoClientAddress,
    #[error("client {0} matches no configured secret")]
    NoMatchingSecret(String),
    #[error("packet does not match the shared secret")]
    Mismatch,
    #[error("packet carries no Message-Authenticator")]
    MissingAuthenticator,
    #[error("no decoded packet to check")]
    NoPacket,
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Immutable secret table consulted by every pass
#[derive(Clone, Default)]
pub struct SecretStore {
    default_secret: Option<Vec<u8>>,
    secrets_by_prefix: HashMap<String, Vec<u8>>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material
        f.debug_struct("SecretStore")
            .field("has_default", &self.default_secret.is_some())
            .field("prefixes", &self.secrets_by_prefix.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore {
    /// Single-tenant store: every client shares `secret`
    pub fn single(secret: impl Into<Vec<u8>>) -> Self {
        SecretStore {
            default_secret: Some(secret.into()),
            secrets_by_prefix: HashMap::new(),
        }
    }

    pub fn new(default_secret: Option<Vec<u8>>, secrets_by_prefix: HashMap<String, Vec<u8>>) -> Self {
        SecretStore {
            default_secret,
            secrets_by_prefix,
        }
    }

    /// Load `<dir>/secrets` (required) and `<dir>/clients` (optional)
    pub fn load(dir: &Path) -> Result<Self, SecretError> {
        let secrets_path = dir.join(SECRETS_FILE);
        let contents = read(&secrets_path)?;
        let default_secret = parse_secret_file(&contents)?;

        let clients_path = dir.join(CLIENTS_FILE);
        let secrets_by_prefix = if clients_path.exists() {
            parse_client_mappings(&read(&clients_path)?)
        } else {
            HashMap::new()
        };

        Ok(SecretStore::new(Some(default_secret), secrets_by_prefix))
    }

    /// Whether per-client mappings are in effect (the default secret is then ignored)
    pub fn is_mapped(&self) -> bool {
        !self.secrets_by_prefix.is_empty()
    }

    pub fn default_secret(&self) -> Option<&[u8]> {
        self.default_secret.as_deref()
    }

    /// Mapping keys, for diagnostics
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.secrets_by_prefix.keys().map(String::as_str)
    }

    /// Most specific secret that applies to a packet from `addr`
    pub fn resolve(&self, addr: Option<SocketAddr>) -> Result<&[u8], SecretError> {
        self.candidates(addr)?
            .into_iter()
            .next()
            .ok_or(SecretError::NoSecretConfigured)
    }

    /// Every secret a packet from `addr` may be signed with, most specific first
    pub fn candidates(&self, addr: Option<SocketAddr>) -> Result<Vec<&[u8]>, SecretError> {
        if !self.is_mapped() {
            let secret = self.default_secret().ok_or(SecretError::NoSecretConfigured)?;
            return Ok(vec![secret]);
        }

        let addr = addr.ok_or(SecretError::NoClientAddress)?;
        self.candidates_for_host(&addr.ip().to_canonical().to_string())
    }

    /// Mapping lookup for a textual host
    ///
    /// Literal prefixes of `host` come longest first; the wildcard entry, if
    /// any, comes last.
    pub fn candidates_for_host(&self, host: &str) -> Result<Vec<&[u8]>, SecretError> {
        let mut literal: Vec<(&String, &Vec<u8>)> = self
            .secrets_by_prefix
            .iter()
            .filter(|(key, _)| key.as_str() != WILDCARD_KEY && host.starts_with(key.as_str()))
            .collect();
        literal.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let candidates: Vec<&[u8]> = literal
            .into_iter()
            .map(|(_, secret)| secret.as_slice())
            .chain(self.secrets_by_prefix.get(WILDCARD_KEY).map(Vec::as_slice))
            .collect();

        if candidates.is_empty() {
            return Err(SecretError::NoMatchingSecret(host.to_string()));
        }
        Ok(candidates)
    }
}

fn read(path: &Path) -> Result<String, SecretError> {
    fs::read_to_string(path).map_err(|source| SecretError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Split a `<key> <secret words...>` line; comments and lines without a secret yield None
fn split_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('#') {
        return None;
    }
    let (key, secret) = line.split_once(' ')?;
    let secret = secret.trim();
    if key.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key, secret))
}

/// Default secret from the contents of a secrets file
pub fn parse_secret_file(contents: &str) -> Result<Vec<u8>, SecretError> {
    contents
        .lines()
        .filter_map(split_line)
        .find(|(key, _)| key.starts_with(LOCAL_KEY))
        .map(|(_, secret)| secret.as_bytes().to_vec())
        .ok_or(SecretError::NoSecretConfigured)
}

/// Prefix to secret entries from the contents of a client mapping file
///
/// A key listed twice keeps its last secret.
pub fn parse_client_mappings(contents: &str) -> HashMap<String, Vec<u8>> {
    contents
        .lines()
        .filter_map(split_line)
        .map(|(key, secret)| (key.to_string(), secret.as_bytes().to_vec()))
        .collect()
}

//! Cached TLS credential pair on disk.
//!
//! # Responsibilities
//! - Return the cached pair from `<cert_dir>` when it is present and valid
//! - Otherwise generate a fresh pair and persist it
//!
//! # Design Decisions
//! - Blocking file I/O and key generation; call from `spawn_blocking`
//! - Persistence failures are logged, not fatal: the pair is still usable

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::TlsConfig;

use super::generate::generate_self_signed;

/// File name of the cached certificate.
pub const CERT_FILE: &str = "ssl.cert";
/// File name of the cached private key.
pub const KEY_FILE: &str = "ssl.key";

/// PEM-encoded key and certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsCredentialPair {
    pub private_key: Vec<u8>,
    pub certificate: Vec<u8>,
}

impl std::fmt::Debug for TlsCredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCredentialPair")
            .field("private_key", &"<redacted>")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .finish()
    }
}

/// Errors obtaining a credential pair.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to generate TLS credentials: {0}")]
    Generate(#[from] openssl::error::ErrorStack),

    #[error("invalid PEM in {path}: {reason}")]
    InvalidPem { path: PathBuf, reason: String },

    #[error("credential task failed: {0}")]
    Task(String),
}

/// Loads or creates the TLS credential pair.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    common_name: String,
    validity_days: u32,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>, common_name: impl Into<String>, validity_days: u32) -> Self {
        Self {
            dir: dir.into(),
            common_name: common_name.into(),
            validity_days,
        }
    }

    pub fn from_config(config: &TlsConfig) -> Self {
        Self::new(&config.cert_dir, &config.common_name, config.validity_days)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    /// The cached pair, or a newly generated and persisted one.
    pub fn get_credential_pair(&self) -> Result<TlsCredentialPair, CredentialError> {
        match self.read_cached() {
            Ok(pair) => {
                tracing::info!(dir = %self.dir.display(), "Loaded cached TLS credentials");
                return Ok(pair);
            }
            Err(e) => {
                tracing::debug!(dir = %self.dir.display(), error = %e, "No usable cached TLS credentials");
            }
        }

        tracing::info!(
            common_name = %self.common_name,
            validity_days = self.validity_days,
            "Generating self-signed TLS credentials"
        );
        let pair = generate_self_signed(&self.common_name, self.validity_days)?;

        if let Err(e) = self.persist(&pair) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to persist TLS credentials");
        }
        Ok(pair)
    }

    /// Async wrapper running the blocking work on the blocking pool.
    pub async fn load(self) -> Result<TlsCredentialPair, CredentialError> {
        tokio::task::spawn_blocking(move || self.get_credential_pair())
            .await
            .map_err(|e| CredentialError::Task(e.to_string()))?
    }

    fn read_cached(&self) -> Result<TlsCredentialPair, CredentialError> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();
        let invalid = |path: &Path, reason: String| CredentialError::InvalidPem {
            path: path.to_path_buf(),
            reason,
        };

        let certificate = fs::read(&cert_path).map_err(|e| invalid(&cert_path, e.to_string()))?;
        let private_key = fs::read(&key_path).map_err(|e| invalid(&key_path, e.to_string()))?;

        let certs = rustls_pemfile::certs(&mut certificate.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(&cert_path, e.to_string()))?;
        if certs.is_empty() {
            return Err(invalid(&cert_path, "no certificate found".to_string()));
        }
        match rustls_pemfile::private_key(&mut private_key.as_slice()) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(invalid(&key_path, "no private key found".to_string())),
            Err(e) => return Err(invalid(&key_path, e.to_string())),
        }

        Ok(TlsCredentialPair {
            private_key,
            certificate,
        })
    }

    fn persist(&self, pair: &TlsCredentialPair) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.cert_path(), &pair.certificate)?;
        fs::write(self.key_path(), &pair.private_key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> CredentialStore {
        CredentialStore::new(dir.join("certs"), "station.local", 30)
    }

    #[test]
    fn generates_and_persists_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let pair = store.get_credential_pair().unwrap();

        assert_eq!(fs::read(store.cert_path()).unwrap(), pair.certificate);
        assert_eq!(fs::read(store.key_path()).unwrap(), pair.private_key);
        assert!(String::from_utf8_lossy(&pair.certificate).starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn second_call_returns_cached_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let first = store.get_credential_pair().unwrap();
        let second = store.get_credential_pair().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn invalid_cache_is_regenerated() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        fs::create_dir_all(tmp.path().join("certs")).unwrap();
        fs::write(store.cert_path(), "not a certificate").unwrap();
        fs::write(store.key_path(), "not a key").unwrap();

        let pair = store.get_credential_pair().unwrap();

        assert_ne!(pair.certificate, b"not a certificate".to_vec());
        assert_eq!(fs::read(store.cert_path()).unwrap(), pair.certificate);
    }

    #[test]
    fn unwritable_dir_still_returns_a_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = CredentialStore::new(blocker.join("certs"), "station.local", 30);

        let pair = store.get_credential_pair().unwrap();

        assert!(!pair.private_key.is_empty());
        assert!(!store.cert_path().exists());
    }

    #[test]
    fn debug_output_hides_the_key() {
        let pair = TlsCredentialPair {
            private_key: b"secret".to_vec(),
            certificate: b"cert".to_vec(),
        };
        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("4 bytes"));
    }
}

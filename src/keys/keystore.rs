// src/keys/keystore.rs
//! Server signing key management.
//!
//! The response signer always signs with the *currently active* key pair.
//! The pair is loaded once and cached; administrative rotation replaces it
//! atomically under a write lock so a request never observes a torn pair.

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

/// The server's signing material: the private key and the certificate
/// (DER bytes) distributed to relying parties in the KeyInfo element.
pub struct SigningKeyPair {
    pub certificate_der: Vec<u8>,
    pub private_key: RsaPrivateKey,
}

/// Source of the active signing key pair.
pub trait KeyProvider: Send + Sync {
    /// Gets the currently active key pair, or `None` when no signing key is
    /// configured. Responders treat absence as a fatal signing error.
    fn active_key_pair(&self) -> Option<Arc<SigningKeyPair>>;
}

/// File-backed [`KeyProvider`] with in-memory caching and atomic rotation.
pub struct FileKeyStore {
    active: RwLock<Option<Arc<SigningKeyPair>>>,
}

impl FileKeyStore {
    /// Creates a key store with no active key pair.
    pub fn empty() -> Self {
        FileKeyStore {
            active: RwLock::new(None),
        }
    }

    /// Loads the key pair from a PKCS#8 PEM private key file and a
    /// certificate file (PEM or raw DER).
    pub fn load(key_file: &Path, cert_file: &Path) -> anyhow::Result<Self> {
        let key_pem = fs::read_to_string(key_file)
            .with_context(|| format!("cannot read signing key {}", key_file.display()))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&key_pem)
            .map_err(|e| anyhow!("cannot parse signing key {}: {}", key_file.display(), e))?;
        let cert_bytes = fs::read(cert_file)
            .with_context(|| format!("cannot read certificate {}", cert_file.display()))?;
        let certificate_der = decode_certificate(&cert_bytes)
            .with_context(|| format!("cannot parse certificate {}", cert_file.display()))?;
        Ok(FileKeyStore {
            active: RwLock::new(Some(Arc::new(SigningKeyPair {
                certificate_der,
                private_key,
            }))),
        })
    }

    /// Installs a new active key pair (administrative rotation). Requests
    /// already holding the previous pair finish with it; new requests see
    /// the replacement.
    pub fn install_key_pair(&self, pair: SigningKeyPair) {
        *self.active.write().unwrap() = Some(Arc::new(pair));
    }
}

impl KeyProvider for FileKeyStore {
    fn active_key_pair(&self) -> Option<Arc<SigningKeyPair>> {
        self.active.read().unwrap().clone()
    }
}

/// Decodes a certificate file: PEM armour is stripped and base64-decoded,
/// anything else is taken as DER.
fn decode_certificate(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let text = String::from_utf8_lossy(bytes);
    if text.contains("-----BEGIN CERTIFICATE-----") {
        let body: String = text
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect::<Vec<_>>()
            .join("");
        Ok(base64::decode(body.trim())
            .map_err(|e| anyhow!("invalid PEM certificate body: {}", e))?)
    } else {
        Ok(bytes.to_vec())
    }
}

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Certificate identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the leaf certificate
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the certificate from explicit paths, falling back to `certs/`
    pub async fn load(cert_path: Option<&str>, key_path: Option<&str>) -> Result<Self> {
        let (cert_path, key_path) = resolve_paths(cert_path, key_path, |path| {
            Path::new(path).exists()
        })?;

        info!("Loading TLS certificate from {}", cert_path);
        let identity = Identity::load_pemfiles(&cert_path, &key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| hash_der(cert.der()))
            .unwrap_or_default();
        info!("Certificate hash: {}", cert_hash);

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Pick configured paths when both are set, else the dev pair if present
fn resolve_paths(
    cert_path: Option<&str>,
    key_path: Option<&str>,
    exists: impl Fn(&str) -> bool,
) -> Result<(String, String)> {
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok((cert.to_string(), key.to_string())),
        (Some(_), None) | (None, Some(_)) => Err(anyhow!(
            "TLS_CERT_PATH and TLS_KEY_PATH must be set together"
        )),
        (None, None) if exists(DEV_CERT_FILE) && exists(DEV_KEY_FILE) => {
            Ok((DEV_CERT_FILE.to_string(), DEV_KEY_FILE.to_string()))
        }
        (None, None) => Err(anyhow!(
            "TLS certificate not found. Place a dev pair in certs/ or set TLS_CERT_PATH and TLS_KEY_PATH."
        )),
    }
}

fn hash_der(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_win() {
        let (cert, key) = resolve_paths(Some("a.pem"), Some("b.pem"), |_| true).unwrap();
        assert_eq!(cert, "a.pem");
        assert_eq!(key, "b.pem");
    }

    #[test]
    fn test_half_configured_is_error() {
        assert!(resolve_paths(Some("a.pem"), None, |_| true).is_err());
        assert!(resolve_paths(None, Some("b.pem"), |_| true).is_err());
    }

    #[test]
    fn test_dev_fallback() {
        let (cert, _) = resolve_paths(None, None, |_| true).unwrap();
        assert_eq!(cert, DEV_CERT_FILE);

        let err = resolve_paths(None, None, |_| false).unwrap_err();
        assert!(err.to_string().contains("certificate not found"));
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_der(b"certificate");
        let decoded = STANDARD.decode(&hash).unwrap();
        // SHA-256 produces 32 bytes
        assert_eq!(decoded.len(), 32);
    }
}

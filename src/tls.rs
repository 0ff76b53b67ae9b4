//! TLS settings for the REST transport and for SOAP service clients.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Certificate material given either as a file path or as raw bytes.
///
/// Relative paths are resolved against the current working directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TlsMaterial {
    /// Read the material from this file.
    Path(PathBuf),
    /// Use these bytes as-is.
    Bytes(Vec<u8>),
}

impl TlsMaterial {
    /// Loads the material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientBadConfiguration`] if the file cannot be read.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            TlsMaterial::Path(path) => std::fs::read(path).map_err(|e| {
                Error::ClientBadConfiguration(format!(
                    "Cannot read TLS material {}: {}",
                    path.display(),
                    e
                ))
            }),
            TlsMaterial::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMaterial::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TlsMaterial::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl From<PathBuf> for TlsMaterial {
    fn from(path: PathBuf) -> Self {
        TlsMaterial::Path(path)
    }
}

impl From<&str> for TlsMaterial {
    fn from(path: &str) -> Self {
        TlsMaterial::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for TlsMaterial {
    fn from(bytes: Vec<u8>) -> Self {
        TlsMaterial::Bytes(bytes)
    }
}

/// How to establish TLS connections.
///
/// # Examples
///
/// ```
/// use duplex::SslConfig;
///
/// let ssl: SslConfig = serde_json::from_str(
///     r#"{"type": "ssl-pfx-security", "pfx": "certs/client.p12", "passphrase": "secret"}"#,
/// )
/// .unwrap();
/// assert!(ssl.rejects_unauthorized());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SslConfig {
    /// Server verification toggle only.
    #[serde(rename = "plain")]
    Plain {
        /// Reject servers whose certificate does not verify.
        #[serde(default = "default_reject_unauthorized")]
        reject_unauthorized: bool,
    },
    /// PEM client certificate and key, with an optional extra CA.
    #[serde(rename = "ssl-security")]
    ClientCertificate {
        /// Client certificate chain.
        cert: TlsMaterial,
        /// Client private key, when not bundled with `cert`.
        #[serde(default)]
        key: Option<TlsMaterial>,
        /// Additional trusted root.
        #[serde(default)]
        ca: Option<TlsMaterial>,
        /// Reject servers whose certificate does not verify.
        #[serde(default = "default_reject_unauthorized")]
        reject_unauthorized: bool,
    },
    /// PKCS#12 bundle holding the client identity.
    #[serde(rename = "ssl-pfx-security")]
    Pfx {
        /// The DER-encoded bundle.
        pfx: TlsMaterial,
        /// Bundle passphrase.
        #[serde(default)]
        passphrase: Option<String>,
        /// Reject servers whose certificate does not verify.
        #[serde(default = "default_reject_unauthorized")]
        reject_unauthorized: bool,
    },
}

fn default_reject_unauthorized() -> bool {
    true
}

impl SslConfig {
    /// Whether server certificates are verified.
    pub fn rejects_unauthorized(&self) -> bool {
        match self {
            SslConfig::Plain {
                reject_unauthorized,
            }
            | SslConfig::ClientCertificate {
                reject_unauthorized,
                ..
            }
            | SslConfig::Pfx {
                reject_unauthorized,
                ..
            } => *reject_unauthorized,
        }
    }

    /// Applies these settings to a `reqwest` client builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientBadConfiguration`] if the material cannot be
    /// read or is not a valid certificate, key or bundle.
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        let builder = builder.danger_accept_invalid_certs(!self.rejects_unauthorized());
        match self {
            SslConfig::Plain { .. } => Ok(builder),
            SslConfig::ClientCertificate { cert, key, ca, .. } => {
                let mut pem = cert.read()?;
                if let Some(key) = key {
                    pem.push(b'\n');
                    pem.extend(key.read()?);
                }
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    Error::ClientBadConfiguration(format!("Invalid client certificate: {}", e))
                })?;
                let mut builder = builder.use_rustls_tls().identity(identity);
                if let Some(ca) = ca {
                    let root = reqwest::Certificate::from_pem(&ca.read()?).map_err(|e| {
                        Error::ClientBadConfiguration(format!("Invalid CA certificate: {}", e))
                    })?;
                    builder = builder.add_root_certificate(root);
                }
                Ok(builder)
            }
            SslConfig::Pfx {
                pfx, passphrase, ..
            } => {
                let der = pfx.read()?;
                let identity =
                    reqwest::Identity::from_pkcs12_der(&der, passphrase.as_deref().unwrap_or(""))
                        .map_err(|e| {
                            Error::ClientBadConfiguration(format!("Invalid PFX bundle: {}", e))
                        })?;
                Ok(builder.use_native_tls().identity(identity))
            }
        }
    }
}

impl fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslConfig::Plain {
                reject_unauthorized,
            } => f
                .debug_struct("Plain")
                .field("reject_unauthorized", reject_unauthorized)
                .finish(),
            SslConfig::ClientCertificate {
                cert,
                key,
                ca,
                reject_unauthorized,
            } => f
                .debug_struct("ClientCertificate")
                .field("cert", cert)
                .field("key", &key.as_ref().map(|_| "<redacted>"))
                .field("ca", ca)
                .field("reject_unauthorized", reject_unauthorized)
                .finish(),
            SslConfig::Pfx {
                pfx,
                passphrase,
                reject_unauthorized,
            } => f
                .debug_struct("Pfx")
                .field("pfx", pfx)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .field("reject_unauthorized", reject_unauthorized)
                .finish(),
        }
    }
}

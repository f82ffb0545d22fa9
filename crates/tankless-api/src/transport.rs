// Shared transport configuration for building reqwest::Client instances.
//
// The session manager and the cloud client share timeout and TLS
// settings through this module, avoiding duplicated builder logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for every cloud round-trip.
    pub timeout: Duration,
    /// Extra CA certificate (PEM) to trust, for proxies in front of the cloud.
    pub ca_cert: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            ca_cert: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(concat!("tankless/", env!("CARGO_PKG_VERSION")));

        if let Some(ref path) = self.ca_cert {
            let pem = std::fs::read(path)
                .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Classify a failed cloud round-trip. A timeout reports the bound it hit.
pub(crate) fn request_error(err: reqwest::Error, timeout: Duration) -> Error {
    if !err.is_timeout() {
        return Error::Transport(err);
    }
    let endpoint = err
        .url()
        .map_or_else(|| "cloud".into(), |u| u.origin().ascii_serialization());
    Error::Timeout {
        endpoint,
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

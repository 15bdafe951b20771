//! Server configuration
//!
//! This module provides configuration options for the connection engine,
//! including listener placement, admission and capacity limits, TLS material,
//! and the optional diagnostics sink.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use http::Uri;
use wharf_core::error::{ConfigError, Error};

use crate::handshake::HttpRequestHandler;
use crate::logging::LogSink;

#[cfg(feature = "tls-transport")]
use rustls::server::AllowAnyAuthenticatedClient;
#[cfg(feature = "tls-transport")]
use rustls::{
    Certificate as RustlsCert, PrivateKey as RustlsKey, RootCertStore,
    ServerConfig as RustlsServerConfig,
};
#[cfg(feature = "tls-transport")]
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
#[cfg(feature = "tls-transport")]
use std::fs::File;
#[cfg(feature = "tls-transport")]
use std::io::BufReader;

/// Default listen port
pub const DEFAULT_PORT: u16 = 9000;

/// Default cap on concurrently registered connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Default maximum message size (64 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default maximum frame size (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Addresses to listen on; one listener is opened per address
    pub listen_addresses: Vec<IpAddr>,
    /// Port shared by every listener
    pub port: u16,
    /// Serve over TLS
    pub secure: bool,
    /// TLS material, required when `secure` is set
    pub tls: Option<TlsConfig>,
    /// Skip client certificate verification (the default)
    ///
    /// When cleared, peers must present a certificate signed by the CA bundle
    /// in [`TlsConfig::ca_file`].
    pub accept_invalid_certificates: bool,
    /// Maintain message and byte counters
    pub enable_statistics: bool,
    /// Peer addresses admitted at accept time; empty admits everyone
    pub permitted_addresses: Vec<IpAddr>,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Maximum frame size in bytes
    pub max_frame_size: usize,
    /// Handshake timeout
    pub handshake_timeout: Duration,
    /// Optional callback receiving engine diagnostics
    pub logger: Option<LogSink>,
    /// Optional handler for HTTP requests that are not upgrade requests
    pub http_handler: Option<Arc<dyn HttpRequestHandler>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addresses: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            port: DEFAULT_PORT,
            secure: false,
            tls: None,
            accept_invalid_certificates: true,
            enable_statistics: true,
            permitted_addresses: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            logger: None,
            http_handler: None,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from a `ws://` or `wss://` listen URI
    ///
    /// The host must be an IP literal or `localhost`. A missing port falls
    /// back to 80 for `ws` and 443 for `wss`. All other fields take their
    /// defaults.
    pub fn from_uri(uri: &str) -> wharf_core::Result<Self> {
        let parsed: Uri = uri.parse().map_err(|e| {
            Error::Config(ConfigError::InvalidUri(format!("{uri}: {e}")))
        })?;

        let (secure, default_port) = match parsed.scheme_str() {
            Some("ws") => (false, 80),
            Some("wss") => (true, 443),
            other => {
                return Err(Error::Config(ConfigError::InvalidUri(format!(
                    "scheme must be ws or wss, got {}",
                    other.unwrap_or("none")
                ))));
            }
        };

        let host = parsed.host().ok_or_else(|| {
            Error::Config(ConfigError::InvalidUri(format!("{uri}: missing host")))
        })?;
        // http::Uri keeps the brackets on IPv6 hosts
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let address = if host == "localhost" {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse::<IpAddr>().map_err(|_| {
                Error::Config(ConfigError::InvalidUri(format!(
                    "host must be an IP literal or localhost, got {host}"
                )))
            })?
        };

        Ok(Self {
            listen_addresses: vec![address],
            port: parsed.port_u16().unwrap_or(default_port),
            secure,
            ..Self::default()
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> wharf_core::Result<()> {
        if self.listen_addresses.is_empty() {
            return Err(Error::Config(ConfigError::MissingField {
                field: "listen_addresses".to_string(),
            }));
        }

        if self.max_connections == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_connections must be greater than 0".to_string(),
            )));
        }

        if self.max_frame_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_frame_size must be greater than 0".to_string(),
            )));
        }

        if self.max_message_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_message_size must be greater than 0".to_string(),
            )));
        }

        if self.max_message_size < self.max_frame_size {
            return Err(Error::Config(ConfigError::Validation(
                "max_message_size must be greater than or equal to max_frame_size".to_string(),
            )));
        }

        if self.secure {
            let tls = self.tls.as_ref().ok_or_else(|| {
                Error::Config(ConfigError::MissingField {
                    field: "tls".to_string(),
                })
            })?;
            if !self.accept_invalid_certificates && tls.ca_file.is_none() {
                return Err(Error::Config(ConfigError::MissingField {
                    field: "tls.ca_file".to_string(),
                }));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addresses", &self.listen_addresses)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("tls", &self.tls)
            .field("accept_invalid_certificates", &self.accept_invalid_certificates)
            .field("enable_statistics", &self.enable_statistics)
            .field("permitted_addresses", &self.permitted_addresses)
            .field("max_connections", &self.max_connections)
            .field("max_message_size", &self.max_message_size)
            .field("max_frame_size", &self.max_frame_size)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("logger", &self.logger)
            .field("http_handler", &self.http_handler.as_ref().map(|_| "…"))
            .finish()
    }
}

/// TLS configuration
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to certificate file
    pub cert_file: String,
    /// Path to private key file
    pub key_file: String,
    /// CA bundle for client certificate verification (optional)
    pub ca_file: Option<String>,
}

impl TlsConfig {
    /// Create a new TLS configuration
    pub fn new(cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        Self {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_file: None,
        }
    }

    /// Set the CA bundle used to verify client certificates
    pub fn ca_file(mut self, file: impl Into<String>) -> Self {
        self.ca_file = Some(file.into());
        self
    }
}

#[cfg(feature = "tls-transport")]
fn load_certs(path: &str) -> wharf_core::Result<Vec<RustlsCert>> {
    let file = File::open(path).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Failed to open certificate file {}: {}",
            path, e
        )))
    })?;
    let mut reader = BufReader::new(file);
    let cert_vec = certs(&mut reader).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Failed to parse certificate file {}: {}",
            path, e
        )))
    })?;
    if cert_vec.is_empty() {
        return Err(Error::Config(ConfigError::Tls(format!(
            "No certificates found in {}",
            path
        ))));
    }
    Ok(cert_vec.into_iter().map(RustlsCert).collect())
}

#[cfg(feature = "tls-transport")]
fn load_private_key(path: &str) -> wharf_core::Result<RustlsKey> {
    let file = File::open(path).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Failed to open private key file {}: {}",
            path, e
        )))
    })?;
    let mut reader = BufReader::new(file);

    if let Ok(keys) = pkcs8_private_keys(&mut reader) {
        if let Some(key) = keys.into_iter().next() {
            return Ok(RustlsKey(key));
        }
    }

    // Not PKCS#8; rewind by reopening and try the RSA framing
    let file = File::open(path).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Failed to reopen private key file {}: {}",
            path, e
        )))
    })?;
    let mut reader = BufReader::new(file);
    let keys = rsa_private_keys(&mut reader).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Failed to parse private key file {}: {}",
            path, e
        )))
    })?;

    if let Some(key) = keys.into_iter().next() {
        Ok(RustlsKey(key))
    } else {
        Err(Error::Config(ConfigError::Tls(format!(
            "No private keys found in {}",
            path
        ))))
    }
}

/// Assemble a rustls server configuration from TLS material on disk
///
/// With `require_client_auth`, peers must present a certificate signed by the
/// CA bundle in `tls.ca_file`.
#[cfg(feature = "tls-transport")]
pub fn build_rustls_server_config(
    tls: &TlsConfig,
    require_client_auth: bool,
) -> wharf_core::Result<RustlsServerConfig> {
    let certs = load_certs(&tls.cert_file)?;
    let key = load_private_key(&tls.key_file)?;

    let builder = RustlsServerConfig::builder().with_safe_defaults();
    let builder = if require_client_auth {
        let ca_file = tls.ca_file.as_ref().ok_or_else(|| {
            Error::Config(ConfigError::MissingField {
                field: "tls.ca_file".to_string(),
            })
        })?;
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_file)? {
            roots.add(&cert).map_err(|e| {
                Error::Config(ConfigError::Tls(format!(
                    "Invalid CA certificate in {}: {}",
                    ca_file, e
                )))
            })?;
        }
        builder.with_client_cert_verifier(AllowAnyAuthenticatedClient::new(roots).boxed())
    } else {
        builder.with_no_client_auth()
    };

    builder.with_single_cert(certs, key).map_err(|e| {
        Error::Config(ConfigError::Tls(format!(
            "Invalid TLS certificate/key: {}",
            e
        )))
    })
}

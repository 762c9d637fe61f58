//! Transport for the IRC session: plain TCP or TLS over TCP.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::common::error::ConnectionError;

/// Time allowed for TCP connect and TLS handshake together.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Any byte stream the session can run over.
pub trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

pub type BoxedStream = Box<dyn IrcStream>;

/// Open a connection to `host:port`, wrapped in TLS when `use_ssl` is set.
pub async fn connect(host: &str, port: u16, use_ssl: bool) -> Result<BoxedStream, ConnectionError> {
    tokio::time::timeout(CONNECT_TIMEOUT, open(host, port, use_ssl))
        .await
        .map_err(|_| ConnectionError::Timeout)?
}

async fn open(host: &str, port: u16, use_ssl: bool) -> Result<BoxedStream, ConnectionError> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|source| ConnectionError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        })?;
    tcp.set_nodelay(true)?;
    debug!(host = %host, port, "TCP connected");

    if !use_ssl {
        return Ok(Box::new(tcp));
    }

    let tls_error = |message: String| ConnectionError::Tls {
        host: host.to_string(),
        message,
    };

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error(e.to_string()))?
        .with_root_certificates(native_roots())
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| tls_error(e.to_string()))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| tls_error(e.to_string()))?;
    debug!(host = %host, "TLS handshake complete");

    Ok(Box::new(stream))
}

/// System trust anchors. Unreadable certificates are skipped with a warning.
fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "Failed to add root cert");
        }
    }
    for e in &certs.errors {
        warn!(error = %e, "Error loading native certs");
    }
    roots
}

//! Instrumented HTTP probe implementation.
//!
//! The transport is dialed step by step so each phase can be timed:
//! resolve, connect, TLS handshake, then an HTTP/1 exchange until the
//! response head arrives.

use super::{round_millis, ProbeError, ProbeResult};

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::Request;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::{Host, Url};

const USER_AGENT_VALUE: &str = concat!("uptime-probe/", env!("CARGO_PKG_VERSION"));

/// HTTP prober. Owns the TLS client configuration shared by all probes.
#[derive(Clone)]
pub struct Prober {
    tls: TlsConnector,
}

impl Prober {
    /// Create a prober trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, ProbeError> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(format!("protocol version error: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Create a prober from a pre-built `rustls` client configuration.
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    /// Issue one GET request against `url`.
    ///
    /// Fails with [`ProbeError::Timeout`] when no response head arrives
    /// within `timeout`. No retries are attempted.
    pub async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResult, ProbeError> {
        let parsed =
            Url::parse(url).map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", url, e)))?;

        match tokio::time::timeout(timeout, self.exchange(&parsed)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    async fn exchange(&self, url: &Url) -> Result<ProbeResult, ProbeError> {
        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(ProbeError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        let host = url
            .host()
            .ok_or_else(|| ProbeError::InvalidUrl(format!("missing host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidUrl(format!("missing port: {}", url)))?;
        let request = build_request(url)?;

        // All phases are measured from here.
        let conn_start = Instant::now();

        let (addrs, dns_lookup) = resolve(&host, port).await?;
        let tcp = connect(&addrs).await?;

        let (status_code, tls_handshake) = if secure {
            let server_name = server_name(&host)?;
            let tls_start = Instant::now();
            let stream = self
                .tls
                .connect(server_name, tcp)
                .await
                .map_err(|e| ProbeError::Tls(e.to_string()))?;
            let tls_handshake = tls_start.elapsed();
            (first_response(stream, request).await?, tls_handshake)
        } else {
            (first_response(tcp, request).await?, Duration::ZERO)
        };
        let ttfb = conn_start.elapsed();

        debug!(
            %url,
            status_code,
            ttfb = ?ttfb,
            dns_lookup = ?dns_lookup,
            tls_handshake = ?tls_handshake,
            "probe completed"
        );

        Ok(ProbeResult {
            status_code,
            ttfb_ms: round_millis(ttfb),
            dns_lookup_ms: round_millis(dns_lookup),
            tls_handshake_ms: round_millis(tls_handshake),
        })
    }
}

/// Resolve the host. IP literals skip the lookup and report zero duration.
async fn resolve(host: &Host<&str>, port: u16) -> Result<(Vec<SocketAddr>, Duration), ProbeError> {
    match host {
        Host::Ipv4(ip) => Ok((vec![SocketAddr::new(IpAddr::V4(*ip), port)], Duration::ZERO)),
        Host::Ipv6(ip) => Ok((vec![SocketAddr::new(IpAddr::V6(*ip), port)], Duration::ZERO)),
        Host::Domain(name) => {
            let start = Instant::now();
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((*name, port))
                .await
                .map_err(|e| ProbeError::Dns(format!("{}: {}", name, e)))?
                .collect();
            let elapsed = start.elapsed();

            if addrs.is_empty() {
                return Err(ProbeError::Dns(format!("{}: no addresses", name)));
            }
            Ok((addrs, elapsed))
        }
    }
}

/// Connect to the first reachable address, in resolver order.
async fn connect(addrs: &[SocketAddr]) -> Result<TcpStream, ProbeError> {
    let mut last_err = None;

    for addr in addrs {
        match TcpStream::connect(*addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "probe connect attempt failed");
                last_err = Some(format!("{}: {}", addr, e));
            }
        }
    }

    Err(ProbeError::Connect(
        last_err.unwrap_or_else(|| "no addresses to connect to".to_string()),
    ))
}

fn server_name(host: &Host<&str>) -> Result<ServerName<'static>, ProbeError> {
    match host {
        Host::Domain(name) => ServerName::try_from(name.to_string())
            .map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", name, e))),
        Host::Ipv4(ip) => Ok(ServerName::from(IpAddr::V4(*ip))),
        Host::Ipv6(ip) => Ok(ServerName::from(IpAddr::V6(*ip))),
    }
}

fn build_request(url: &Url) -> Result<Request<Empty<Bytes>>, ProbeError> {
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let authority = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(ProbeError::InvalidUrl(format!("missing host: {}", url))),
    };

    Request::get(target)
        .header(HOST, authority)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .body(Empty::new())
        .map_err(|e| ProbeError::InvalidUrl(e.to_string()))
}

/// Run the HTTP/1 exchange and return once the response head is in.
async fn first_response<S>(stream: S, request: Request<Empty<Bytes>>) -> Result<u16, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ProbeError::Http(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "probe connection closed with error");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ProbeError::Http(e.to_string()))?;

    Ok(response.status().as_u16())
}

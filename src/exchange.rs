//! Per-exchange request/response snapshots.
//!
//! The middleware captures one `RequestInfo` when an exchange starts and one
//! `ResponseInfo` when the response headers are produced. Token extractors
//! only ever see these snapshots, never the live axum types, so an exchange's
//! timing state is an explicit record owned by that exchange instead of ad hoc
//! fields attached to host objects.

use axum::extract::{ConnectInfo, OriginalUri};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Explicit client IP override, attached as a request extension by upstream
/// middleware (e.g. a proxy-header resolver). Takes precedence over the
/// transport peer address, mirroring how frameworks expose a resolved `ip`
/// field separate from the raw connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Snapshot of an inbound request, taken before the inner service runs.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    /// Pre-rewrite URI, if the router preserved one (axum's `OriginalUri`).
    pub original_uri: Option<Uri>,
    pub version: Version,
    pub headers: HeaderMap,
    /// Explicit IP override from a `ClientIp` extension.
    pub client_ip: Option<IpAddr>,
    /// Peer address captured from the transport connection.
    pub remote_addr: Option<SocketAddr>,
    /// Stamped when the exchange starts.
    pub start_at: Option<Instant>,
}

impl RequestInfo {
    /// Capture a snapshot from an in-flight request and stamp the start time.
    pub fn capture<B>(req: &http::Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            original_uri: req
                .extensions()
                .get::<OriginalUri>()
                .map(|orig| orig.0.clone()),
            version: req.version(),
            headers: req.headers().clone(),
            client_ip: req.extensions().get::<ClientIp>().map(|ip| ip.0),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
            start_at: Some(Instant::now()),
        }
    }

    /// A bare snapshot with nothing stamped, useful for direct renderer calls.
    pub fn empty() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            original_uri: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            client_ip: None,
            remote_addr: None,
            start_at: None,
        }
    }

    /// First value of the given request header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The effective URI: the pre-rewrite original when available.
    pub fn effective_uri(&self) -> &Uri {
        self.original_uri.as_ref().unwrap_or(&self.uri)
    }

    /// Path plus query of the effective URI, as it appeared on the wire.
    pub fn path_and_query(&self) -> &str {
        let uri = self.effective_uri();
        uri.path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path())
    }

    /// HTTP version as `"{major}.{minor}"`.
    pub fn http_version(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "0.9",
            Version::HTTP_10 => "1.0",
            Version::HTTP_11 => "1.1",
            Version::HTTP_2 => "2.0",
            Version::HTTP_3 => "3.0",
            _ => "?",
        }
    }

    /// Resolved client IP: explicit override first, then the captured peer
    /// address.
    pub fn client_addr(&self) -> Option<IpAddr> {
        self.client_ip.or_else(|| self.remote_addr.map(|a| a.ip()))
    }
}

/// Snapshot of the response side of an exchange.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Whether response headers have gone out. Status- and header-derived
    /// tokens resolve to `None` until this is set.
    pub headers_sent: bool,
    /// Stamped right before the first header bytes are written.
    pub start_at: Option<Instant>,
}

impl ResponseInfo {
    /// Capture a snapshot from a produced response and stamp the header-send
    /// time. By the time the line is rendered the headers are on the wire, so
    /// `headers_sent` is true here.
    pub fn capture<B>(res: &http::Response<B>) -> Self {
        Self {
            status: res.status(),
            headers: res.headers().clone(),
            headers_sent: true,
            start_at: Some(Instant::now()),
        }
    }

    /// A snapshot for an exchange whose headers have not been sent yet.
    pub fn pending() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            headers_sent: false,
            start_at: None,
        }
    }

    /// Given response header, joined with `", "` when multi-valued. Gated on
    /// `headers_sent`.
    pub fn header_joined(&self, name: &str) -> Option<String> {
        if !self.headers_sent {
            return None;
        }
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

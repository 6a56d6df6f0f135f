//! Shared hyper client for provider and model endpoints.
//!
//! Trusts the bundled web PKI roots and still allows plain `http://`, since
//! providers and model gateways often run on localhost.

use std::sync::Arc;
use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

/// Client returned by [`https_client`].
pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Connection settings for [`https_client`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpClientOptions {
    connect_timeout: Option<Duration>,
    max_idle_per_host: Option<usize>,
}

impl HttpClientOptions {
    /// Options with hyper's defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives up on TCP connects after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Keeps at most `max` idle connections per host.
    #[must_use]
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = Some(max);
        self
    }

    /// Connect timeout, if any.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Idle pool limit, if any.
    #[must_use]
    pub fn max_idle_per_host(&self) -> Option<usize> {
        self.max_idle_per_host
    }
}

/// Builds a client that speaks both `http://` and `https://`.
#[must_use]
pub fn https_client(options: HttpClientOptions) -> HttpsClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(options.connect_timeout);

    let mut builder = Client::builder();
    if let Some(max) = options.max_idle_per_host {
        builder.pool_max_idle_per_host(max);
    }
    builder.build::<_, Body>(HttpsConnector::from((http, Arc::new(tls))))
}

#[cfg(test)]
mod tests {
    use hyper::body::to_bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn options_start_empty() {
        let options = HttpClientOptions::new();
        assert_eq!(options.connect_timeout(), None);
        assert_eq!(options.max_idle_per_host(), None);

        let options = options
            .with_connect_timeout(Duration::from_secs(3))
            .with_max_idle_per_host(1);
        assert_eq!(options.connect_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(options.max_idle_per_host(), Some(1));
    }

    #[tokio::test]
    async fn plain_http_is_allowed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let client = https_client(HttpClientOptions::new().with_max_idle_per_host(1));
        let uri = format!("http://{addr}/").parse().unwrap();
        let response = client.get(uri).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(to_bytes(response.into_body()).await.unwrap(), "ok");
        server.await.unwrap();
    }
}

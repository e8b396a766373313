//! Real probe transport
//!
//! Opens a TCP connection to the proxy, performs the protocol handshake and
//! drives a single HTTP/1 request over the resulting stream.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request};
use http_body_util::{BodyExt, Empty, Limited};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::{debug, instrument};

use super::probe::{ProbeResponse, ProxyProbe, TestSite};
use crate::config::DEFAULT_USER_AGENT;
use crate::error::{Result, ScoutError};
use crate::models::{ProxyProtocol, ProxyRecord};
use crate::retry::io_is_transient;

/// Cap on echo response bodies
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Probe that talks to proxies over real sockets
#[derive(Debug, Clone)]
pub struct TunnelProbe {
    user_agent: String,
}

impl Default for TunnelProbe {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl TunnelProbe {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    async fn send(
        &self,
        stream: TcpStream,
        site: &TestSite,
        target: &str,
    ) -> Result<ProbeResponse> {
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| hyper_error("HTTP handshake failed", &e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Probe connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(target)
            .header(header::HOST, site.authority())
            .header(header::USER_AGENT, self.user_agent.as_str())
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ScoutError::InvalidRequest(format!("bad probe request: {}", e)))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| hyper_error("request failed", &e))?;
        let status = response.status();

        let body = Limited::new(response.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| ScoutError::ValidationConnect {
                message: format!("failed to read response body: {}", e),
                transient: false,
            })?
            .to_bytes();

        Ok(ProbeResponse::new(status, body))
    }
}

#[async_trait]
impl ProxyProbe for TunnelProbe {
    #[instrument(skip(self, site), fields(site = %site.url))]
    async fn fetch_direct(&self, site: &TestSite) -> Result<ProbeResponse> {
        let stream = TcpStream::connect((site.host.as_str(), site.port))
            .await
            .map_err(|e| ScoutError::Http(format!("direct connect to {} failed: {}", site.host, e)))?;
        self.send(stream, site, &site.path_and_query).await
    }

    #[instrument(skip(self, proxy, site), fields(proxy = %proxy.key(), site = %site.url))]
    async fn fetch_via(&self, proxy: &ProxyRecord, site: &TestSite) -> Result<ProbeResponse> {
        let proxy_addr = SocketAddr::from((proxy.ip, proxy.port));

        let opened = match proxy.protocol {
            ProxyProtocol::Http => TcpStream::connect(proxy_addr)
                .await
                .map_err(anyhow::Error::from),
            ProxyProtocol::Https => connect_tunnel(proxy_addr, site).await,
            ProxyProtocol::Socks4 => connect_socks4(proxy_addr, site).await,
            ProxyProtocol::Socks5 => connect_socks5(proxy_addr, site).await,
        };
        let stream = opened.map_err(|e| tunnel_error(proxy, &e))?;
        debug!("{} tunnel established", proxy.protocol);

        // Plain HTTP proxies take the absolute URL; tunnels carry origin-form
        let target = match proxy.protocol {
            ProxyProtocol::Http => site.url.as_str(),
            _ => site.path_and_query.as_str(),
        };
        self.send(stream, site, target).await
    }
}

async fn connect_tunnel(
    proxy_addr: SocketAddr,
    site: &TestSite,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let mut stream = TcpStream::connect(proxy_addr).await?;

    let authority = format!("{}:{}", site.host, site.port);
    let request = format!(
        "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n\r\n",
        authority, authority
    );
    stream.write_all(request.as_bytes()).await?;

    // Read the response head byte-wise so no tunneled bytes are consumed
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            anyhow::bail!("CONNECT response head too large");
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            anyhow::bail!("empty CONNECT response");
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    if !connect_succeeded(status_line) {
        anyhow::bail!("CONNECT failed: {}", status_line);
    }

    Ok(stream)
}

fn connect_succeeded(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(parts.next(), Some(v) if v.starts_with("HTTP/1."))
        && matches!(parts.next(), Some(code) if code.starts_with('2'))
}

async fn connect_socks4(
    proxy_addr: SocketAddr,
    site: &TestSite,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let stream = Socks4Stream::connect(proxy_addr, (site.host.as_str(), site.port)).await?;
    Ok(stream.into_inner())
}

async fn connect_socks5(
    proxy_addr: SocketAddr,
    site: &TestSite,
) -> std::result::Result<TcpStream, anyhow::Error> {
    let socket = TcpStream::connect(proxy_addr).await?;
    let stream = Socks5Stream::connect_with_socket(socket, (site.host.as_str(), site.port)).await?;
    Ok(stream.into_inner())
}

fn tunnel_error(proxy: &ProxyRecord, err: &anyhow::Error) -> ScoutError {
    let transient = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .map(io_is_transient)
        .unwrap_or(false);
    ScoutError::ValidationConnect {
        message: format!("{} connect via {} failed: {}", proxy.protocol, proxy.address(), err),
        transient,
    }
}

fn hyper_error(context: &str, err: &hyper::Error) -> ScoutError {
    ScoutError::ValidationConnect {
        message: format!("{}: {}", context, err),
        transient: err.is_incomplete_message() || err.is_closed() || err.is_timeout(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[test]
    fn test_connect_status_line() {
        assert!(connect_succeeded("HTTP/1.1 200 Connection established"));
        assert!(connect_succeeded("HTTP/1.0 200 OK"));
        assert!(!connect_succeeded("HTTP/1.1 407 Proxy Authentication Required"));
        assert!(!connect_succeeded("SSH-2.0-OpenSSH"));
        assert!(!connect_succeeded(""));
    }

    #[test]
    fn test_tunnel_error_transience() {
        let proxy = ProxyRecord::new(Ipv4Addr::new(10, 0, 0, 1), 8080, ProxyProtocol::Https, "t");

        let reset = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(tunnel_error(&proxy, &reset).is_transient());

        let refused =
            anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(!tunnel_error(&proxy, &refused).is_transient());

        let rejected = anyhow::anyhow!("CONNECT failed: HTTP/1.1 403 Forbidden");
        assert!(!tunnel_error(&proxy, &rejected).is_transient());
    }

    /// Minimal HTTP proxy: answers every request with a JSON echo of the
    /// request line it received.
    async fn spawn_echo_proxy() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let request_line = head.lines().next().unwrap_or_default().to_string();
            let body = serde_json::json!({ "origin": "10.0.0.1", "line": request_line }).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_http_proxy_gets_absolute_form() {
        let addr = spawn_echo_proxy().await;
        let proxy = ProxyRecord::new(Ipv4Addr::LOCALHOST, addr.port(), ProxyProtocol::Http, "t");
        let site = TestSite::parse("http://echo.test/get").unwrap();

        let response = TunnelProbe::default().fetch_via(&proxy, &site).await.unwrap();
        assert_eq!(response.status, http::StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["line"], "GET http://echo.test/get HTTP/1.1");
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = ProxyRecord::new(Ipv4Addr::LOCALHOST, port, ProxyProtocol::Socks5, "t");
        let site = TestSite::parse("http://echo.test/").unwrap();
        let err = TunnelProbe::default().fetch_via(&proxy, &site).await.unwrap_err();
        assert!(matches!(err, ScoutError::ValidationConnect { .. }));
    }
}

//! Shared utilities for integration tests: stub upstreams and a running proxy.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use forward_proxy::config::ProxyConfig;
use forward_proxy::observability::ProxyMetrics;
use forward_proxy::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub metrics: Arc<ProxyMetrics>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `/p/<base64(target)>`
    pub fn encoded(&self, target: &str) -> String {
        self.url(&format!("/p/{}", encode(target)))
    }
}

/// Config suitable for tests: no static files, short timeouts.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.request_timeout_ms = 2000;
    config.static_files.enabled = false;
    config.lifecycle.drain_timeout_secs = 1;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = server.shutdown_handle();
    let metrics = server.metrics();

    let handle = tokio::spawn(async move { server.run(listener).await });

    TestProxy {
        addr,
        shutdown,
        metrics,
        handle,
    }
}

/// Non-pooled client that ignores proxy environment variables and shows
/// redirects as the proxy relayed them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

pub fn encode(target: &str) -> String {
    STANDARD.encode(target)
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually<F: Fn() -> bool>(within: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Read a request head (up to the blank line). Bodies are not read.
pub async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match socket.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Accept connections forever, handling each with `handler`.
pub async fn start_backend<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handler(socket));
        }
    });

    addr
}

/// Upstream answering every request with the same raw response.
pub async fn start_mock_backend(
    status_line: &'static str,
    headers: &'static [(&'static str, &'static str)],
    body: &'static str,
) -> SocketAddr {
    start_backend(move |mut socket| async move {
        read_head(&mut socket).await;
        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status_line,
            body.len()
        );
        for (name, value) in headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");
        response.push_str(body);
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// Upstream that counts connections and answers 200.
pub async fn start_spy_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = start_backend(move |mut socket| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            read_head(&mut socket).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    })
    .await;
    (addr, hits)
}

/// Upstream that reads the request and never answers.
///
/// Each connection reports on the returned channel once the peer closes it.
pub async fn start_hanging_backend() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let addr = start_backend(move |mut socket| {
        let closed_tx = closed_tx.clone();
        async move {
            read_head(&mut socket).await;
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = closed_tx.send(());
        }
    })
    .await;
    (addr, closed_rx)
}

/// Upstream that declares `declared` bytes, sends `sent`, then hangs up.
pub async fn start_truncating_backend(declared: usize, sent: usize) -> SocketAddr {
    start_backend(move |mut socket| async move {
        read_head(&mut socket).await;
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", declared);
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&vec![b'x'; sent]).await;
        let _ = socket.flush().await;
        drop(socket);
    })
    .await
}

/// Upstream answering every request with `302 Found` to `location`.
pub async fn start_redirect_backend(location: String) -> SocketAddr {
    start_backend(move |mut socket| {
        let location = location.clone();
        async move {
            read_head(&mut socket).await;
            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n",
                location
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    })
    .await
}

/// Upstream that streams chunks every `interval` until writing fails, then
/// reports on the returned channel.
pub async fn start_endless_backend(
    interval: Duration,
) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (released_tx, released_rx) = mpsc::unbounded_channel();
    let addr = start_backend(move |mut socket| {
        let released_tx = released_tx.clone();
        async move {
            read_head(&mut socket).await;
            let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head).await.is_ok() {
                loop {
                    if socket.write_all(b"400\r\n").await.is_err()
                        || socket.write_all(&[b'z'; 0x400]).await.is_err()
                        || socket.write_all(b"\r\n").await.is_err()
                    {
                        break;
                    }
                    tokio::time::sleep(interval).await;
                }
            }
            let _ = released_tx.send(());
        }
    })
    .await;
    (addr, released_rx)
}

/// Upstream serving `total` bytes in `chunk`-sized writes, holding back the
/// final chunk until `release` fires.
pub async fn start_gated_backend(total: usize, chunk: usize) -> (SocketAddr, oneshot::Sender<()>) {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let gate = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    let addr = start_backend(move |mut socket| {
        let gate = gate.clone();
        async move {
            read_head(&mut socket).await;
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total);
            let _ = socket.write_all(head.as_bytes()).await;

            let payload = vec![b'a'; chunk];
            let mut remaining = total;
            while remaining > chunk {
                if socket.write_all(&payload).await.is_err() {
                    return;
                }
                remaining -= chunk;
            }

            if let Some(release) = gate.lock().await.take() {
                let _ = release.await;
            }
            let _ = socket.write_all(&payload[..remaining]).await;
            let _ = socket.shutdown().await;
        }
    })
    .await;
    (addr, release_tx)
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

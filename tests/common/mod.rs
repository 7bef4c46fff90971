//! Shared utilities for gateway integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use arr_gateway::config::GatewayConfig;
use arr_gateway::http::GatewayServer;
use arr_gateway::lifecycle::Shutdown;
use arr_gateway::routing::{ReloadTrigger, Reloader};
use arr_gateway::store::FileStore;
use arr_gateway::templates::TemplateStore;

pub const CLIENT_KEY: &str = "abc123";
pub const UPSTREAM_KEY: &str = "UPSTREAMKEY";

pub const OVERSEERR_TEMPLATE: &str = r#"{
    "id": "overseerr",
    "name": "Overseerr",
    "url": "https://overseerr.dev",
    "endpoints": {
        "sonarr": {
            "/api/v3/queue": ["GET"],
            "/api/v3/series/{id}": ["GET", "PUT"]
        }
    }
}"#;

/// A request as seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Path and query exactly as received.
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case(name)).count()
    }
}

pub type Captured = Arc<Mutex<Vec<CapturedRequest>>>;

/// Start a mock upstream on an ephemeral port that records every request
/// and answers `200 upstream:<target>`, after `delay`.
pub async fn start_recording_backend(delay: Duration) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::default();
    let store = Arc::clone(&captured);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        handle_connection(socket, store, delay).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}

async fn handle_connection(mut socket: TcpStream, store: Captured, delay: Duration) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    store.lock().unwrap().push(CapturedRequest {
        method,
        target: target.clone(),
        headers,
    });

    tokio::time::sleep(delay).await;

    let body = format!("upstream:{target}");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock upstream that answers with a head promising `Content-Length: 100`,
/// sends five bytes and then stalls for `stall`.
pub async fn start_stalling_backend(stall: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 100\r\n\r\nhello";
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(stall).await;
            });
        }
    });

    addr
}

/// Accept one connection and report whether its first byte opens a TLS
/// handshake record. The connection is then closed.
pub async fn start_tls_sniffer() -> (SocketAddr, tokio::sync::oneshot::Receiver<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut first = [0u8; 1];
            let is_tls = matches!(socket.read(&mut first).await, Ok(1)) && first[0] == 0x16;
            let _ = tx.send(is_tls);
        }
    });

    (addr, rx)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Store document with one Sonarr service, one app and one route.
pub fn store_toml(upstream: &str, active: bool) -> String {
    format!(
        r#"
[[services]]
id = 1
kind = "sonarr"
name = "Sonarr"
url = "{upstream}"
api_key = "{UPSTREAM_KEY}"

[[apps]]
id = 1
template = "overseerr"
name = "Overseerr"
is_active = {active}

[[routes]]
id = 1
api_key = "{CLIENT_KEY}"
app_id = 1
service_id = 1
"#
    )
}

/// A gateway running on an ephemeral port over files in a temp directory.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub reloader: Arc<Reloader>,
    pub reload_tx: mpsc::UnboundedSender<ReloadTrigger>,
    pub shutdown: Shutdown,
    pub dir: tempfile::TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("store.toml")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    /// Rewrite the store file and wait for the new table to be published.
    pub async fn rewrite_store(&self, content: &str) {
        let before = self.reloader.table().generation();
        std::fs::write(self.store_path(), content).unwrap();
        self.reload_tx.send(ReloadTrigger::StoreChanged).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while self.reloader.table().generation() <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reload published");
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(store: &str, configure: impl FnOnce(&mut GatewayConfig)) -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), store);

    let mut config = GatewayConfig::default();
    config.store.path = dir.path().join("store.toml");
    config.store.watch = false;
    config.templates.directory = dir.path().join("templates");
    config.audit.directory = dir.path().join("logs");
    configure(&mut config);

    let templates = Arc::new(TemplateStore::load_dir(&config.templates.directory).unwrap());
    let reloader = Arc::new(Reloader::new(Arc::new(FileStore::new(&config.store.path)), templates));
    reloader.reload().unwrap();

    let server = GatewayServer::new(config, Arc::clone(&reloader)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, reload_rx, server_shutdown).await;
    });

    TestGateway {
        addr,
        reloader,
        reload_tx,
        shutdown,
        dir,
    }
}

fn write_fixtures(dir: &Path, store: &str) {
    std::fs::write(dir.join("store.toml"), store).unwrap();
    std::fs::create_dir_all(dir.join("templates")).unwrap();
    std::fs::write(dir.join("templates").join("overseerr.json"), OVERSEERR_TEMPLATE).unwrap();
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_forwarder::config::{ListenerKind, ProxyConfig, TargetSpec};
use http_forwarder::http::{build_router, upstream_client, ForwardingEngine};
use http_forwarder::net::ConnectionTracker;
use http_forwarder::observability::{EventSink, ForwardEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a mock upstream does with the n-th request it receives.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with status, extra headers and body, then close.
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    /// Never answer; hold the connection until the peer closes it.
    Stall,
    /// Close the connection without answering.
    Close,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Reply::Respond {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            body: "",
        }
    }
}

/// A running mock upstream.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Stalled connections the peer has closed.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock upstream on an ephemeral port. `reply` gets the 1-based
/// request number.
pub async fn start_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = MockUpstream {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        disconnects: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let reply = Arc::new(reply);

    let state = upstream.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let state = state.clone();
            let reply = reply.clone();
            tokio::spawn(async move { serve_one(socket, state, reply).await });
        }
    });

    upstream
}

/// Start a mock upstream that always answers 200 with `body`.
pub async fn start_static_upstream(body: &'static str) -> MockUpstream {
    start_upstream(move |_| Reply::ok(body)).await
}

async fn serve_one<F>(mut socket: TcpStream, state: MockUpstream, reply: Arc<F>)
where
    F: Fn(usize) -> Reply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    state.requests.lock().unwrap().push(request);

    match reply(n) {
        Reply::Respond { status, headers, body } => {
            let mut response = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                status,
                reason(status),
                body.len()
            );
            for (name, value) in headers {
                response.push_str(&format!("{}: {}\r\n", name, value));
            }
            response.push_str("\r\n");
            response.push_str(body);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Reply::Stall => {
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            state.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Reply::Close => {}
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let body_start = head_end + 4;
    while buf.len() < body_start + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
        body: buf[body_start..body_start + length].to_vec(),
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// A plain-HTTP proxy serving one engine, with its event stream exposed.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<ForwardEvent>,
    pub tracker: ConnectionTracker,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Collect events until `count` have arrived or a second passes.
    pub async fn collect_events(&mut self, count: usize) -> Vec<ForwardEvent> {
        let mut events = Vec::new();
        while events.len() < count {
            match tokio::time::timeout(Duration::from_secs(1), self.events.recv()).await {
                Ok(Some(event)) => events.push(event),
                _ => break,
            }
        }
        events
    }
}

pub async fn start_proxy(config: &ProxyConfig) -> TestProxy {
    let (sink, events) = EventSink::channel();
    let tracker = ConnectionTracker::new();
    let engine = ForwardingEngine::from_config(
        ListenerKind::Http,
        config,
        upstream_client(),
        sink,
        tracker.clone(),
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::new(engine));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    TestProxy { addr, events, tracker }
}

/// Config forwarding to `urls` with no delay between retries.
pub fn config_for(urls: &[String], max_retries: i64) -> ProxyConfig {
    let mut config = ProxyConfig {
        target_hosts: urls.iter().map(|u| TargetSpec::from(u.as_str())).collect(),
        ..Default::default()
    };
    config.target_retry.max_retries = Some(max_retries);
    config.target_retry.delay = Some(0);
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `check` until it holds or `deadline` passes.
pub async fn eventually<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

//! Loopback HTTP backend for tests: canned JSON per route, every request recorded.

use crate::api::ApiClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) struct Route {
    method: &'static str,
    path: &'static str,
    status: u16,
    body: String,
}

pub(crate) fn route(method: &'static str, path: &'static str, status: u16, body: &str) -> Route {
    Route {
        method,
        path,
        status,
        body: body.to_string(),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl Hit {
    pub fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub(crate) struct StubBackend {
    pub api: ApiClient,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl StubBackend {
    /// Bind an ephemeral port and answer from `routes`. Unmatched requests get 404.
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let accept_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&accept_hits);
                tokio::spawn(async move {
                    let _ = serve(socket, &routes, &hits).await;
                });
            }
        });

        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let api = ApiClient::with_http(&format!("http://{addr}"), http).unwrap();
        Self { api, hits }
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.hits().iter().map(Hit::line).collect()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: &[Route],
    hits: &Mutex<Vec<Hit>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.parse().unwrap_or(0),
            "transfer-encoding" => chunked = value.eq_ignore_ascii_case("chunked"),
            _ => {}
        }
    }

    let mut body = buf[header_end..].to_vec();
    loop {
        let complete = if chunked {
            body.ends_with(b"0\r\n\r\n")
        } else {
            body.len() >= content_length
        };
        if complete {
            break;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    hits.lock().unwrap().push(Hit {
        method: method.clone(),
        path: path.clone(),
        body,
    });

    let (status, reply) = routes
        .iter()
        .find(|r| r.method == method && r.path == path)
        .map(|r| (r.status, r.body.clone()))
        .unwrap_or((404, r#"{"detail":"Not Found"}"#.to_string()));

    let response = format!(
        "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
        if status < 400 { "OK" } else { "Error" },
        reply.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

use anyhow::Context;
use dir_mimic_core::{CatalogService, Confirm};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
const MAX_HEADERS: usize = 100;
const MAX_LINE_BYTES: usize = 16 * 1024;

pub const CHECKSUM_HEADER: &str = "x-plan-checksum";

/// Shared by every connection.
pub struct AppState {
    service: Arc<CatalogService>,
    confirm: Arc<dyn Confirm>,
}

impl AppState {
    pub fn new(service: Arc<CatalogService>, confirm: Arc<dyn Confirm>) -> Self {
        Self { service, confirm }
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request body exceeds 64 MiB")]
    TooLarge,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: Some("application/json"),
                body,
            },
            Err(e) => Self::text(500, &format!("Could not encode response: {}", e)),
        }
    }

    pub fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: format!("{}\n", message).into_bytes(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Payload Too Large",
            _ => "Internal Server Error",
        }
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason());
        if let Some(content_type) = self.content_type {
            head.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        head.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
        head.push_str("Access-Control-Allow-Headers: Content-Type, X-Plan-Checksum\r\n");
        head.push_str("Connection: close\r\n\r\n");

        writer.write_all(head.as_bytes()).await?;
        writer.write_all(&self.body).await?;
        writer.flush().await
    }
}

/// Accept connections until the listener fails. Bind errors are returned
/// before anything is served.
pub async fn run(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr()?;
    info!("Serving {} on http://{}", state.service.root().display(), local);
    println!("http://localhost:{}", local.port());

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                debug!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, stream: TcpStream) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let response = match read_request(&mut reader).await {
        Ok(Some(request)) => route(&state, request).await,
        Ok(None) => return Ok(()),
        Err(RequestError::TooLarge) => Response::text(413, &RequestError::TooLarge.to_string()),
        Err(RequestError::Malformed(message)) => Response::text(400, &message),
        Err(RequestError::Io(e)) => return Err(e),
    };

    response.write_to(&mut write_half).await?;
    write_half.shutdown().await
}

/// Read one HTTP/1.1 request. Returns `None` if the peer closed the
/// connection before sending anything.
pub async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request>, RequestError> {
    let mut line = String::new();
    if read_line(reader, &mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/1.") => {
            (method.to_string(), target.to_string())
        }
        _ => {
            return Err(RequestError::Malformed(format!(
                "bad request line '{}'",
                line.trim_end()
            )))
        }
    };
    let path = target.split('?').next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    loop {
        line.clear();
        if read_line(reader, &mut line).await? == 0 {
            return Err(RequestError::Malformed("unexpected end of headers".to_string()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(RequestError::Malformed("too many headers".to_string()));
        }
        let (name, value) = trimmed
            .split_once(':')
            .ok_or_else(|| RequestError::Malformed(format!("bad header '{}'", trimmed)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut request = Request {
        method,
        path,
        headers,
        body: Vec::new(),
    };

    if request
        .header("transfer-encoding")
        .is_some_and(|te| !te.eq_ignore_ascii_case("identity"))
    {
        return Err(RequestError::Malformed(
            "chunked request bodies are not supported".to_string(),
        ));
    }

    let length = match request.header("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed(format!("bad content-length '{}'", value)))?,
        None => 0,
    };
    if length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    request.body = body;

    Ok(Some(request))
}

async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
) -> Result<usize, RequestError> {
    let read = reader.read_line(line).await?;
    if line.len() > MAX_LINE_BYTES {
        return Err(RequestError::Malformed("line too long".to_string()));
    }
    Ok(read)
}

pub async fn route(state: &AppState, request: Request) -> Response {
    debug!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", "/catalog") | ("OPTIONS", "/apply") => Response::empty(204),
        ("GET", "/catalog") => Response::json(200, &state.service.catalog()),
        (_, "/catalog") => Response::text(405, "Method not allowed"),
        ("POST", "/apply") => apply(state, request).await,
        (_, "/apply") => Response::text(405, "Method not allowed"),
        ("GET", "/") => Response::text(
            200,
            "dir-mimic: GET /catalog for the target catalog, POST /apply to submit a plan",
        ),
        _ => Response::text(404, "Not found"),
    }
}

async fn apply(state: &AppState, request: Request) -> Response {
    let expected = request.header(CHECKSUM_HEADER).map(str::to_string);
    let service = state.service.clone();
    let confirm = state.confirm.clone();
    let payload = request.body;

    let result = tokio::task::spawn_blocking(move || {
        service.submit(payload, expected.as_deref(), confirm.as_ref())
    })
    .await;

    match result {
        Ok(Ok(outcome)) => Response::json(200, &outcome),
        Ok(Err(e)) if e.is_rejection() => {
            warn!("Rejected plan: {}", e);
            Response::text(400, &e.to_string())
        }
        Ok(Err(e)) => {
            error!("Failed to apply plan: {}", e);
            Response::text(500, &e.to_string())
        }
        Err(e) => {
            error!("Apply task failed: {}", e);
            Response::text(500, "Apply task failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dir_mimic_core::integrity::digest;
    use dir_mimic_core::{PlanReview, ScanOptions, SilentReporter};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Always(bool);

    impl Confirm for Always {
        fn confirm(&self, _review: &PlanReview<'_>) -> io::Result<bool> {
            Ok(self.0)
        }
    }

    fn state_with(approve: bool) -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("old")).unwrap();
        fs::write(dir.path().join("old/a.txt"), "a").unwrap();
        let service =
            CatalogService::open(dir.path(), ScanOptions::default(), Box::new(SilentReporter))
                .unwrap();
        let state = AppState::new(Arc::new(service), Arc::new(Always(approve)));
        (dir, state)
    }

    fn request(method: &str, path: &str, headers: &[(&str, &str)], body: &[u8]) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_read_request_with_body() {
        let raw = b"POST /apply?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 2\r\nX-Plan-Checksum: abc\r\n\r\n[]";
        let mut reader = &raw[..];
        let request = read_request(&mut reader).await.unwrap().unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/apply");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header(CHECKSUM_HEADER), Some("abc"));
        assert_eq!(request.body, b"[]");
    }

    #[tokio::test]
    async fn test_read_request_without_body_and_eof() {
        let raw = b"GET /catalog HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut reader = &raw[..];
        let request = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.body.is_empty());

        let mut empty: &[u8] = b"";
        assert!(read_request(&mut empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_request_rejects_bad_input() {
        let mut garbage: &[u8] = b"HELLO\r\n\r\n";
        assert!(matches!(
            read_request(&mut garbage).await,
            Err(RequestError::Malformed(_))
        ));

        let huge = format!(
            "POST /apply HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let mut reader = huge.as_bytes();
        assert!(matches!(
            read_request(&mut reader).await,
            Err(RequestError::TooLarge)
        ));

        let mut chunked: &[u8] =
            b"POST /apply HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
        assert!(matches!(
            read_request(&mut chunked).await,
            Err(RequestError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_response_carries_cors_headers() {
        let mut out = Vec::new();
        Response::empty(204).write_to(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_routes() {
        let (_dir, state) = state_with(false);

        let preflight = route(&state, request("OPTIONS", "/apply", &[], b"")).await;
        assert_eq!(preflight.status, 204);
        assert!(preflight.body.is_empty());

        let catalog = route(&state, request("GET", "/catalog", &[], b"")).await;
        assert_eq!(catalog.status, 200);
        let value: serde_json::Value = serde_json::from_slice(&catalog.body).unwrap();
        assert_eq!(value["file_count"], 1);
        assert_eq!(value["files"][0]["path"], "old/a.txt");

        assert_eq!(
            route(&state, request("DELETE", "/catalog", &[], b"")).await.status,
            405
        );
        assert_eq!(
            route(&state, request("GET", "/apply", &[], b"")).await.status,
            405
        );
        assert_eq!(
            route(&state, request("GET", "/nope", &[], b"")).await.status,
            404
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_declined_and_approved() {
        let body = br#"[{"type":"mv","from":"old/a.txt","to":"new/a.txt"}]"#;

        let (dir, declining) = state_with(false);
        let response = route(&declining, request("POST", "/apply", &[], body)).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"status":"aborted"}"#);
        assert!(dir.path().join("old/a.txt").exists());

        let (dir, approving) = state_with(true);
        let checksum = digest(body);
        let response = route(
            &approving,
            request("POST", "/apply", &[("X-Plan-Checksum", checksum.as_str())], body),
        )
        .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"status":"completed","errors":[]}"#);
        assert!(dir.path().join("new/a.txt").exists());

        let catalog = route(&approving, request("GET", "/catalog", &[], b"")).await;
        let value: serde_json::Value = serde_json::from_slice(&catalog.body).unwrap();
        assert_eq!(value["files"][0]["path"], "new/a.txt");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_rejects_bad_payloads() {
        let (dir, state) = state_with(true);
        let body = br#"[{"type":"rm","from":"old/a.txt"}]"#;

        let mismatch = route(
            &state,
            request("POST", "/apply", &[("X-Plan-Checksum", "deadbeef")], body),
        )
        .await;
        assert_eq!(mismatch.status, 400);

        let garbage = route(&state, request("POST", "/apply", &[], b"{oops")).await;
        assert_eq!(garbage.status, 400);

        assert!(dir.path().join("old/a.txt").exists());
    }
}

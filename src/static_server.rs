use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STATIC_PORT: u16 = 3000;

/// Request heads larger than this are dropped without a response.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum StaticSiteError {
    #[error("page file not found: {0}")]
    PageMissing(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 404 body: the serialized read error, mirroring what a client would get
/// from the reference deployment.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Serves exactly one HTML page at `/` over TLS. Stateless: the file is
/// re-read per request so it can be replaced without a restart.
#[derive(Debug)]
pub struct StaticServer {
    page: PathBuf,
}

impl StaticServer {
    /// The page must exist at startup even though it is re-read per request;
    /// refusing to boot beats serving 404s forever.
    pub fn new(page: impl Into<PathBuf>) -> Result<Self, StaticSiteError> {
        let page = page.into();
        if !page.is_file() {
            return Err(StaticSiteError::PageMissing(page));
        }
        Ok(Self { page })
    }

    pub async fn run(&self, addr: &str, acceptor: TlsAcceptor) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Static server listening on https://{}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let acceptor = acceptor.clone();
            let page = self.page.clone();

            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, peer, acceptor, page).await {
                    error!("Static request error from {}: {}", peer, e);
                }
            });
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    page: PathBuf,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut tls = acceptor.accept(stream).await?;

    let Some(head) = read_request_head(&mut tls).await? else {
        debug!("Request from {} had no parseable head", peer);
        return Ok(());
    };
    let Some(target) = request_target(&head) else {
        debug!("Request from {} had no request line", peer);
        return Ok(());
    };

    if target != "/" {
        // no handler for other paths: hold the connection until the peer
        // gives up, matching the transport-default behavior
        debug!("Unhandled path {} from {}", target, peer);
        drain(&mut tls).await;
        return Ok(());
    }

    match tokio::fs::read(&page).await {
        Ok(body) => {
            debug!("Serving {} bytes to {}", body.len(), peer);
            write_response(&mut tls, "200 OK", "text/html", &body).await?;
        }
        Err(e) => {
            warn!("Failed to read {}: {}", page.display(), e);
            let body = serde_json::to_vec(&ErrorBody {
                error: e.to_string(),
            })?;
            write_response(&mut tls, "404 Not Found", "application/json", &body).await?;
        }
    }

    tls.shutdown().await?;
    Ok(())
}

/// Read until the end of the request head, bounded by MAX_REQUEST_HEAD.
/// Returns None if the peer closed or overflowed the bound first.
async fn read_request_head<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> std::io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buf) {
            return Ok(Some(String::from_utf8_lossy(&buf[..end]).into_owned()));
        }
        if buf.len() > MAX_REQUEST_HEAD {
            return Ok(None);
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extract the request target from the request line, e.g.
/// `GET /index.html HTTP/1.1` yields `/index.html`.
fn request_target(head: &str) -> Option<&str> {
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    parts.next()
}

async fn write_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

/// Sit on the connection until the peer closes it.
async fn drain<S: AsyncRead + Unpin>(stream: &mut S) {
    let mut sink = [0u8; 1024];
    while let Ok(n) = stream.read(&mut sink).await {
        if n == 0 {
            break;
        }
    }
}

use crate::dispatch::Dispatcher;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const API_PREFIX: &str = "/api/";
pub const TOKEN_PARAM: &str = "token";

pub struct HttpServer {
    dispatcher: Dispatcher,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher, addr: SocketAddr) -> Self {
        Self { dispatcher, addr }
    }

    pub async fn start(&self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accepts connections on an already bound listener until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("HTTP server shutting down on {}", self.addr);
                    break;
                }
                result = listener.accept() => {
                    let (stream, peer_addr) = result?;
                    debug!("HTTP client connected from {}", peer_addr);

                    stream.set_nodelay(true)?;

                    let dispatcher = self.dispatcher.clone();
                    let client_shutdown = shutdown.child_token();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, dispatcher, client_shutdown).await {
                            error!("Error handling HTTP client {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(handle_request(&dispatcher, req).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

async fn handle_request(dispatcher: &Dispatcher, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return empty_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let Some(op_name) = req.uri().path().strip_prefix(API_PREFIX) else {
        return empty_response(StatusCode::NOT_FOUND);
    };

    let mut args = parse_query(req.uri().query().unwrap_or(""));
    let token = args
        .remove(TOKEN_PARAM)
        .map(|raw| percent_decode_str(&raw).decode_utf8_lossy().into_owned());

    let response = dispatcher.handle(token.as_deref(), op_name, &args).await;

    let body = match response.to_bytes() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize {} response: {:?}", op_name, e);
            match crate::protocol::Response::error().to_bytes() {
                Ok(body) => body,
                Err(_) => return empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    };

    let mut http_response = Response::new(Full::new(body.clone()));
    let headers = http_response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, body.len().into());
    http_response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Splits a raw query string into key/value pairs. Keys are decoded, values
/// stay percent-encoded so each argument is decoded exactly once downstream.
/// The first occurrence of a key wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode_str(key).decode_utf8_lossy().into_owned();
        args.entry(key).or_insert_with(|| value.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InodeFs;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_parse_query_keeps_values_encoded() {
        let args = parse_query("token=abc&name=a%20b&buf=%00%01&name=second&flag");
        assert_eq!(args.get("token").map(String::as_str), Some("abc"));
        assert_eq!(args.get("name").map(String::as_str), Some("a%20b"));
        assert_eq!(args.get("buf").map(String::as_str), Some("%00%01"));
        assert_eq!(args.get("flag").map(String::as_str), Some(""));
        assert!(parse_query("").is_empty());
    }

    async fn request(addr: SocketAddr, target: &str) -> Vec<u8> {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let header_end = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has a header block");
        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        assert!(head.starts_with("HTTP/1.1 200"), "unexpected response: {head}");
        raw[header_end + 4..].to_vec()
    }

    #[tokio::test]
    async fn test_serves_frames_over_http() {
        let fs = Arc::new(InodeFs::new_in_memory().await.unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(Dispatcher::new(fs), addr);

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(listener, server_shutdown).await });

        let body = request(addr, "/api/getattr?token=http&id=1000").await;
        assert_eq!(body.len(), 8 + 16);
        assert_eq!(&body[..8], &0i64.to_le_bytes());
        assert_eq!(&body[8..12], &1000u32.to_le_bytes());

        let body = request(addr, "/api/create?token=http&parent_id=1000&name=f&mode=33188").await;
        assert_eq!(&body[8..12], &1001u32.to_le_bytes());

        let body = request(addr, "/api/write?token=http&id=1001&offset=0&buf=hi%00").await;
        assert_eq!(body, 3i64.to_le_bytes().to_vec());

        let body = request(addr, "/api/read?token=http&id=1001&offset=0&size=10").await;
        assert_eq!(&body[..8], &3i64.to_le_bytes());
        assert_eq!(&body[8..], b"hi\0");

        let body = request(addr, "/api/getattr?id=1000").await;
        assert_eq!(body, (-1i64).to_le_bytes().to_vec());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}

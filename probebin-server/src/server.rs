use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};

use probebin_core::{Body, BodyStream, Request, Response, Scheme};
use probebin_net::{
    Header, HttpVersion, LAST_CHUNK, Limits, ParseErrorKind, ParseStatus, RequestParser,
    StatusLine, encode_chunk, encode_response_head,
};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::router::Router;

const READ_BUFFER: usize = 8192;

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    stats: ServerStats,
}

struct ServerState {
    router: Router,
    limits: Limits,
}

/// Counters shared between the accept loop and whoever holds a clone.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    active: Arc<AtomicUsize>,
}

impl ServerStats {
    /// Connections whose task has not finished yet.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn open(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            stats: self.clone(),
        }
    }
}

struct ConnectionGuard {
    stats: ServerStats,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| ServerError::Runtime(format!("bind {addr}: {err}")))?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState {
                router: Router::new(&config),
                limits: config.limits.parser_limits(),
            }),
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Accepts connections until the listener fails. Each connection is served
    /// on its own task.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|err| ServerError::Runtime(err.to_string()))?;
            let state = Arc::clone(&self.state);
            let guard = self.stats.open();
            tokio::spawn(
                async move {
                    if let Err(err) = serve(state, stream, peer).await {
                        debug!(%err, "connection closed with error");
                    }
                    drop(guard);
                    debug!("connection closed");
                }
                .instrument(info_span!("connection", %peer)),
            );
        }
    }
}

/// What happened to the connection while a response was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    PeerGone,
}

/// How the body length is communicated to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked,
    /// HTTP/1.0 clients get unknown-length bodies delimited by closing.
    UntilClose,
    NoBody,
}

struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    /// Bytes read while a response was streaming, not yet parsed.
    pending: Vec<u8>,
    /// Reading pauses while `pending` holds this much.
    max_pending: usize,
    /// The peer shut down its sending side.
    peer_done: bool,
}

async fn serve(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ServerError> {
    let (reader, writer) = stream.into_split();
    let mut conn = Connection {
        reader,
        writer,
        pending: Vec::new(),
        max_pending: state
            .limits
            .max_header_bytes
            .saturating_add(state.limits.max_body_bytes),
        peer_done: false,
    };
    let mut parser = RequestParser::with_limits(state.limits);
    let mut temp = vec![0u8; READ_BUFFER];

    loop {
        let input = std::mem::take(&mut conn.pending);
        match parser.push(&input) {
            ParseStatus::NeedMore { .. } => {
                if conn.peer_done {
                    return Ok(());
                }
                let n = conn.reader.read(&mut temp).await?;
                if n == 0 {
                    if parser.buffered() > 0 {
                        debug!(buffered = parser.buffered(), "peer closed mid-request");
                    }
                    return Ok(());
                }
                conn.pending.extend_from_slice(&temp[..n]);
            }
            ParseStatus::Error { error, .. } => {
                warn!(kind = ?error.kind, offset = error.offset, "rejecting malformed request");
                let response = Response::text(framing_status(&error.kind), "bad request\n");
                conn.respond(response, false, true, false).await?;
                return Ok(());
            }
            ParseStatus::Complete { message, warnings } => {
                for warning in &warnings {
                    debug!(kind = ?warning.kind, offset = warning.offset, "parse warning");
                }
                let close = message.should_close();
                let legacy = message.line.version == HttpVersion::Http10;
                let request = match into_core_request(message, peer) {
                    Ok(request) => request,
                    Err(reason) => {
                        warn!(%reason, "rejecting request");
                        let response = Response::text(400, format!("{reason}\n"));
                        conn.respond(response, false, true, legacy).await?;
                        return Ok(());
                    }
                };

                let response = state.router.handle(&request);
                info!(
                    method = %request.method,
                    target = %request.target(),
                    status = response.status,
                    "request"
                );
                let head_only = request.method == Method::HEAD;
                let (delivery, closing) = conn.respond(response, head_only, close, legacy).await?;
                if closing || delivery == Delivery::PeerGone {
                    return Ok(());
                }
            }
        }
    }
}

fn framing_status(kind: &ParseErrorKind) -> u16 {
    match kind {
        ParseErrorKind::HeaderTooLarge => 431,
        ParseErrorKind::BodyTooLarge => 413,
        _ => 400,
    }
}

fn into_core_request(message: probebin_net::Request, peer: SocketAddr) -> Result<Request, String> {
    let method = Method::from_bytes(message.line.method.as_bytes())
        .map_err(|_| format!("invalid method {:?}", message.line.method))?;
    if !message.line.target.starts_with('/') {
        return Err(format!("unsupported request target {:?}", message.line.target));
    }

    let mut headers = HeaderMap::new();
    for header in &message.headers {
        let name = HeaderName::from_bytes(header.name.as_bytes());
        let value = HeaderValue::from_str(&header.value);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(name = %header.name, "dropping unrepresentable header"),
        }
    }

    Ok(Request::builder(method, &message.line.target)
        .headers(headers)
        .body(Bytes::from(message.body))
        .remote_addr(peer.ip().to_string())
        .scheme(Scheme::Http)
        .build())
}

/// Informational, 204 and 304 responses never carry a body.
fn allows_body(status: u16) -> bool {
    !(100..200).contains(&status) && status != 204 && status != 304
}

fn choose_framing(response: &Response, legacy: bool) -> Framing {
    if !allows_body(response.status) {
        return Framing::NoBody;
    }
    match response.body.length() {
        Some(length) => Framing::Length(length),
        None if legacy => Framing::UntilClose,
        None => Framing::Chunked,
    }
}

fn response_head(response: &Response, framing: Framing, close: bool) -> Vec<u8> {
    let line = StatusLine {
        version: HttpVersion::Http11,
        status_code: response.status,
        reason: StatusCode::from_u16(response.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown")
            .to_string(),
    };

    let mut headers: Vec<Header> = response
        .headers
        .iter()
        .map(|(name, value)| {
            Header::new(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    match framing {
        Framing::Length(length) => headers.push(Header::new("content-length", length.to_string())),
        Framing::Chunked => headers.push(Header::new("transfer-encoding", "chunked")),
        Framing::UntilClose | Framing::NoBody => {}
    }
    if close {
        headers.push(Header::new("connection", "close"));
    }
    encode_response_head(&line, &headers)
}

impl Connection {
    /// Writes `response` and reports whether the connection must close
    /// afterwards.
    async fn respond(
        &mut self,
        response: Response,
        head_only: bool,
        close: bool,
        legacy: bool,
    ) -> Result<(Delivery, bool), ServerError> {
        let framing = choose_framing(&response, legacy);
        let close = close || framing == Framing::UntilClose;
        self.writer
            .write_all(&response_head(&response, framing, close))
            .await?;
        if head_only || framing == Framing::NoBody {
            return Ok((Delivery::Delivered, close));
        }

        let delivery = match response.body {
            Body::Empty => Delivery::Delivered,
            Body::Full(bytes) => {
                self.writer.write_all(&bytes).await?;
                Delivery::Delivered
            }
            Body::Stream(stream) => self.stream_body(stream, framing == Framing::Chunked).await?,
        };
        Ok((delivery, close))
    }

    /// Forwards stream chunks while watching the socket. A failed read or
    /// write drops the stream, which cancels its timers. A peer that only
    /// shut down its sending side still receives the whole body.
    async fn stream_body(
        &mut self,
        stream: BodyStream,
        chunked: bool,
    ) -> Result<Delivery, ServerError> {
        let mut chunks = stream.chunks;
        let mut scratch = vec![0u8; READ_BUFFER];
        let mut sent = 0usize;

        loop {
            let listening = !self.peer_done && self.pending.len() < self.max_pending;
            tokio::select! {
                next = chunks.next() => {
                    let Some(chunk) = next else {
                        break;
                    };
                    let framed = if chunked { encode_chunk(&chunk) } else { chunk.to_vec() };
                    if let Err(err) = self.writer.write_all(&framed).await {
                        debug!(%err, sent, "write failed mid-stream");
                        return Ok(Delivery::PeerGone);
                    }
                    sent += chunk.len();
                }
                read = self.reader.read(&mut scratch), if listening => {
                    match read {
                        Ok(0) => {
                            debug!(sent, "peer finished sending mid-stream");
                            self.peer_done = true;
                        }
                        Ok(n) => {
                            self.pending.extend_from_slice(&scratch[..n]);
                            if self.pending.len() >= self.max_pending {
                                debug!(buffered = self.pending.len(), "pausing reads until the stream ends");
                            }
                        }
                        Err(err) => {
                            debug!(%err, sent, "read failed mid-stream");
                            return Ok(Delivery::PeerGone);
                        }
                    }
                }
            }
        }

        if chunked {
            self.writer.write_all(LAST_CHUNK).await?;
        }
        Ok(Delivery::Delivered)
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use http::header::{AsHeaderName, CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt};

/// Query parameters keyed by name; a key may repeat.
pub type Query = BTreeMap<String, Vec<String>>;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if raw.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub raw_query: Option<String>,
    pub query: Query,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: String,
    pub scheme: Scheme,
}

impl Request {
    pub fn builder(method: Method, target: &str) -> RequestBuilder {
        RequestBuilder::new(method, target)
    }

    /// First value of a header, if it is valid visible ASCII.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The request-target as it appeared on the request line.
    pub fn target(&self) -> String {
        match &self.raw_query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Scheme the client used, preferring `X-Forwarded-Proto` over the transport.
    pub fn effective_scheme(&self) -> Scheme {
        self.header("x-forwarded-proto")
            .and_then(|value| value.split(',').next())
            .and_then(|value| Scheme::parse(value.trim()))
            .unwrap_or(self.scheme)
    }

    pub fn url(&self) -> String {
        let host = self.header(http::header::HOST).unwrap_or("localhost");
        format!(
            "{}://{}{}",
            self.effective_scheme().as_str(),
            host,
            self.target()
        )
    }
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    raw_query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: String,
    scheme: Scheme,
}

impl RequestBuilder {
    pub fn new(method: Method, target: &str) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            raw_query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: "127.0.0.1".to_string(),
            scheme: Scheme::Http,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = remote_addr.into();
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn build(self) -> Request {
        let query = self
            .raw_query
            .as_deref()
            .map(parse_query)
            .unwrap_or_default();
        Request {
            method: self.method,
            path: self.path,
            raw_query: self.raw_query,
            query,
            headers: self.headers,
            body: self.body,
            remote_addr: self.remote_addr,
            scheme: self.scheme,
        }
    }
}

pub fn parse_query(raw: &str) -> Query {
    let mut query = Query::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}

pub struct BodyStream {
    pub chunks: ChunkStream,
    /// Total length when known up front; unknown lengths are sent chunked.
    pub length: Option<u64>,
}

impl BodyStream {
    pub fn new(chunks: ChunkStream, length: Option<u64>) -> Self {
        Self { chunks, length }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Body {
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len() as u64),
            Body::Stream(stream) => stream.length,
        }
    }

    /// Drains the body into memory.
    pub async fn collect(self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Full(bytes) => bytes,
            Body::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.chunks.next().await {
                    buffer.extend_from_slice(&chunk);
                }
                buffer.freeze()
            }
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn with_body(status: u16, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response.body = Body::Full(body.into());
        response
    }

    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self::with_body(status, "text/plain; charset=utf-8", message.into())
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(mut body) => {
                body.push(b'\n');
                Self::with_body(status, "application/json", body)
            }
            Err(err) => Self::text(500, err.to_string()),
        }
    }

    pub fn streaming(status: u16, content_type: &'static str, stream: BodyStream) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response.body = Body::Stream(stream);
        response
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

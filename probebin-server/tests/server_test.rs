use std::net::SocketAddr;
use std::time::{Duration, Instant};

use probebin_codec::{base64_encode_str, md5_hex};
use probebin_core::parse_auth_params;
use probebin_net::{
    Header, HttpVersion, ParseStatus, Request, RequestLine, Response, ResponseParser,
    encode_request,
};
use probebin_server::{Server, ServerConfig, ServerStats};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start_test_server(config: ServerConfig) -> SocketAddr {
    start_counted_server(config).await.0
}

async fn start_counted_server(mut config: ServerConfig) -> (SocketAddr, ServerStats) {
    config.listen.port = 0;
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let stats = server.stats();
    tokio::spawn(server.run());
    (addr, stats)
}

fn request_bytes(target: &str, version: HttpVersion, headers: &[(&str, &str)]) -> Vec<u8> {
    let mut all = vec![Header::new("Host", "bin.test")];
    all.extend(headers.iter().map(|(name, value)| Header::new(*name, *value)));
    encode_request(&Request {
        line: RequestLine {
            method: "GET".to_string(),
            target: target.to_string(),
            version,
        },
        headers: all,
        body: Vec::new(),
    })
}

async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    raw
}

struct Client {
    stream: TcpStream,
    parser: ResponseParser,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            parser: ResponseParser::new(),
        }
    }

    async fn send(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.unwrap();
    }

    async fn response(&mut self) -> Response {
        let mut buffer = [0u8; 4096];
        let mut status = self.parser.push(&[]);
        loop {
            match status {
                ParseStatus::Complete { message, .. } => return message,
                ParseStatus::Error { error, .. } => panic!("unparseable response: {error:?}"),
                ParseStatus::NeedMore { .. } => {}
            }
            let n = self.stream.read(&mut buffer).await.unwrap();
            assert!(n > 0, "connection closed before a full response");
            status = self.parser.push(&buffer[..n]);
        }
    }

    async fn get(&mut self, target: &str, headers: &[(&str, &str)]) -> Response {
        self.send(&request_bytes(target, HttpVersion::Http11, headers))
            .await;
        self.response().await
    }
}

async fn get(addr: SocketAddr, target: &str) -> Response {
    Client::connect(addr).await.get(target, &[]).await
}

fn challenge_param(response: &Response, key: &str) -> String {
    let header = response.header("www-authenticate").unwrap();
    let (_, params) = header.split_once(' ').unwrap();
    parse_auth_params(params)
        .unwrap()
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
        .unwrap_or_else(|| panic!("missing {key}"))
}

fn json(response: &Response) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn digest_auth_round_trip() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    let uri = "/digest-auth/auth/user/passwd";

    let challenge = client.get(uri, &[]).await;
    assert_eq!(challenge.line.status_code, 401);
    assert!(challenge.header("www-authenticate").unwrap().starts_with("Digest "));

    let realm = challenge_param(&challenge, "realm");
    let nonce = challenge_param(&challenge, "nonce");
    let opaque = challenge_param(&challenge, "opaque");
    assert_eq!(challenge_param(&challenge, "qop"), "auth");

    let ha1 = md5_hex(format!("user:{realm}:passwd").as_bytes());
    let ha2 = md5_hex(format!("GET:{uri}").as_bytes());
    let response = md5_hex(format!("{ha1}:{nonce}:00000001:0a4f113b:auth:{ha2}").as_bytes());
    let authorization = format!(
        "Digest username=\"user\", realm=\"{realm}\", nonce=\"{nonce}\", \
         uri=\"{uri}\", qop=auth, nc=00000001, cnonce=\"0a4f113b\", \
         response=\"{response}\", opaque=\"{opaque}\""
    );

    let accepted = client.get(uri, &[("Authorization", authorization.as_str())]).await;
    assert_eq!(accepted.line.status_code, 200);
    let body = json(&accepted);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"], "user");
}

#[tokio::test]
async fn digest_auth_rejects_wrong_response() {
    let addr = start_test_server(ServerConfig::default()).await;
    let authorization = "Digest username=\"user\",realm=\"wrong\",nonce=\"wrong\",\
                         uri=\"/digest-auth/user/passwd\",response=\"wrong\",opaque=\"wrong\"";
    let response = Client::connect(addr)
        .await
        .get("/digest-auth/auth/user/passwd", &[("Authorization", authorization)])
        .await;
    assert_eq!(response.line.status_code, 401);
    assert!(response.header("www-authenticate").unwrap().starts_with("Digest "));
}

#[tokio::test]
async fn drip_honours_delay_and_duration() {
    let addr = start_test_server(ServerConfig::default()).await;
    let started = Instant::now();
    let response = get(addr, "/drip?numbytes=400&duration=2&delay=1").await;
    let elapsed = started.elapsed();

    assert_eq!(response.line.status_code, 200);
    assert_eq!(response.header("content-length"), Some("400"));
    assert_eq!(response.body, vec![b'*'; 400]);
    assert!(elapsed >= Duration::from_millis(2900), "finished after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "finished after {elapsed:?}");
}

#[tokio::test]
async fn drip_uses_requested_status() {
    let addr = start_test_server(ServerConfig::default()).await;
    let response = get(addr, "/drip?numbytes=400&duration=2&code=500").await;
    assert_eq!(response.line.status_code, 500);
    assert_eq!(response.body.len(), 400);
}

#[tokio::test]
async fn drip_rejects_negative_parameters() {
    let addr = start_test_server(ServerConfig::default()).await;
    for target in ["/drip?numbytes=-1", "/drip?duration=-1", "/drip?delay=-2"] {
        let response = get(addr, target).await;
        assert_eq!(response.line.status_code, 400, "{target}");
        assert!(response.header("transfer-encoding").is_none());
    }
}

#[tokio::test]
async fn drip_is_capped_by_configuration() {
    let mut config = ServerConfig::default();
    config.limits.max_drip_bytes = 32;
    let addr = start_test_server(config).await;
    let response = get(addr, "/drip?numbytes=1000&duration=0").await;
    assert_eq!(response.body.len(), 32);
}

#[tokio::test]
async fn cors_headers_on_every_response() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;

    let plain = client.get("/get", &[]).await;
    assert_eq!(plain.header("access-control-allow-origin"), Some("*"));
    assert_eq!(plain.header("access-control-allow-credentials"), Some("true"));

    let with_origin = client.get("/get", &[("Origin", "origin")]).await;
    assert_eq!(with_origin.header("access-control-allow-origin"), Some("origin"));

    let missing = client.get("/missing", &[]).await;
    assert_eq!(missing.line.status_code, 404);
    assert_eq!(missing.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn preflight_headers() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    client
        .send(b"OPTIONS /get HTTP/1.1\r\nHost: bin.test\r\nAccess-Control-Request-Headers: X-Test-Header\r\n\r\n")
        .await;
    let response = client.response().await;
    assert_eq!(response.line.status_code, 200);
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    assert_eq!(response.header("access-control-allow-credentials"), Some("true"));
    assert_eq!(
        response.header("access-control-allow-methods"),
        Some("GET, POST, PUT, DELETE, PATCH, OPTIONS")
    );
    assert_eq!(response.header("access-control-max-age"), Some("3600"));
    assert_eq!(
        response.header("access-control-allow-headers"),
        Some("X-Test-Header")
    );
}

#[tokio::test]
async fn forwarded_proto_changes_echoed_url() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;

    let plain = client.get("/get?a=1", &[]).await;
    assert_eq!(json(&plain)["url"], "http://bin.test/get?a=1");

    let forwarded = client.get("/get", &[("X-Forwarded-Proto", "https")]).await;
    let url = json(&forwarded)["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("https://"), "{url}");
    assert_eq!(json(&forwarded)["origin"], "127.0.0.1");
}

#[tokio::test]
async fn seeded_bytes_match_across_endpoints() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;

    let buffered = client.get("/bytes/10?seed=0", &[]).await;
    assert_eq!(buffered.header("content-type"), Some("application/octet-stream"));
    assert_eq!(buffered.header("content-length"), Some("10"));
    assert_eq!(
        buffered.body,
        vec![0x6c_u8, 0x3b, 0x9a, 0xa7, 0x67, 0xf7, 0x85, 0xb5, 0x37, 0xc0]
    );

    let streamed = client.get("/stream-bytes/10?seed=0&chunk_size=3", &[]).await;
    assert_eq!(streamed.header("transfer-encoding"), Some("chunked"));
    assert_eq!(streamed.body, buffered.body);

    let again = client.get("/bytes/10?seed=0", &[]).await;
    assert_eq!(again.body, buffered.body);
}

#[tokio::test]
async fn status_route_and_keep_alive() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    client
        .send(b"POST /status/418 HTTP/1.1\r\nHost: bin.test\r\nContent-Length: 3\r\n\r\nabcGET /status/201 HTTP/1.1\r\nHost: bin.test\r\n\r\n")
        .await;
    assert_eq!(client.response().await.line.status_code, 418);
    assert_eq!(client.response().await.line.status_code, 201);
}

#[tokio::test]
async fn head_requests_get_headers_only() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"HEAD /bytes/10 HTTP/1.1\r\nHost: bin.test\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("content-length: 10\r\n"));
    assert!(text.contains("connection: close\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn http10_closes_after_response() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status/200 HTTP/1.0\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let mut parser = ResponseParser::new();
    let ParseStatus::Complete { message, .. } = parser.push(&raw) else {
        panic!("incomplete response");
    };
    assert_eq!(message.line.status_code, 200);
    assert_eq!(message.header("connection"), Some("close"));
}

#[tokio::test]
async fn malformed_requests_get_400_and_close() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GARBAGE\r\n\r\n").await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    assert!(raw.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn oversized_headers_get_431() {
    let mut config = ServerConfig::default();
    config.limits.max_header_bytes = 128;
    let addr = start_test_server(config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /get HTTP/1.1\r\nHost: bin.test\r\nX-Padding: {}\r\n\r\n",
        "a".repeat(200)
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    assert!(raw.starts_with(b"HTTP/1.1 431 "));
}

#[tokio::test]
async fn basic_auth_challenge_and_success() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;

    let missing = client.get("/basic-auth/foo/bar", &[]).await;
    assert_eq!(missing.line.status_code, 401);
    assert_eq!(
        missing.header("www-authenticate"),
        Some("Basic realm=\"Fake Realm\"")
    );
    assert_eq!(missing.header("access-control-allow-credentials"), Some("true"));

    let wrong = format!("Basic {}", base64_encode_str("foo:baz"));
    let rejected = client
        .get("/basic-auth/foo/bar", &[("Authorization", wrong.as_str())])
        .await;
    assert_eq!(rejected.line.status_code, 401);
    assert!(rejected.header("www-authenticate").unwrap().starts_with("Basic "));

    let right = format!("Basic {}", base64_encode_str("foo:bar"));
    let accepted = client
        .get("/basic-auth/foo/bar", &[("Authorization", right.as_str())])
        .await;
    assert_eq!(accepted.line.status_code, 200);
    assert_eq!(json(&accepted), serde_json::json!({"authenticated": true, "user": "foo"}));
}

#[tokio::test]
async fn disconnect_mid_drip_ends_the_connection_task() {
    let (addr, stats) = start_counted_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&request_bytes("/drip?numbytes=100&duration=10", HttpVersion::Http11, &[]))
        .await
        .unwrap();
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await.unwrap();
    assert!(buffer[..n].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(stats.active_connections(), 1);

    let dropped = Instant::now();
    drop(stream);
    while stats.active_connections() > 0 {
        assert!(
            dropped.elapsed() < Duration::from_secs(3),
            "drip kept running after the client left"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let response = get(addr, "/get").await;
    assert_eq!(response.line.status_code, 200);
}

#[tokio::test]
async fn pipelined_input_is_bounded_while_streaming() {
    let mut config = ServerConfig::default();
    config.limits.max_header_bytes = 1024;
    config.limits.max_body_bytes = 1024;
    let addr = start_test_server(config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&request_bytes("/drip?numbytes=10&duration=2", HttpVersion::Http11, &[]))
        .await
        .unwrap();
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await.unwrap();
    assert!(buffer[..n].starts_with(b"HTTP/1.1 200 OK\r\n"));

    // Once the server stops reading, socket buffers fill and the writer stalls.
    let flood = vec![b'x'; 64 * 1024 * 1024];
    let written = tokio::time::timeout(Duration::from_secs(1), stream.write_all(&flood)).await;
    assert!(written.is_err(), "server accepted 64 MiB while streaming");
    drop(stream);

    let response = get(addr, "/get").await;
    assert_eq!(response.line.status_code, 200);
}

#[tokio::test]
async fn half_closed_client_receives_the_whole_drip() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&request_bytes("/drip?numbytes=50&duration=0.5", HttpVersion::Http11, &[]))
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    let raw = read_all(&mut stream).await;
    let ParseStatus::Complete { message, .. } = ResponseParser::new().push(&raw) else {
        panic!("incomplete response");
    };
    assert_eq!(message.line.status_code, 200);
    assert_eq!(message.body, vec![b'*'; 50]);
}

#[tokio::test]
async fn http10_streams_are_close_delimited() {
    let addr = start_test_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&request_bytes(
            "/stream-bytes/10?seed=0&chunk_size=3",
            HttpVersion::Http10,
            &[],
        ))
        .await
        .unwrap();

    let raw = read_all(&mut stream).await;
    let split = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .unwrap();
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!head.contains("transfer-encoding"));
    assert!(!head.contains("content-length"));
    assert!(head.contains("connection: close"));
    assert_eq!(
        raw[split + 4..].to_vec(),
        vec![0x6c_u8, 0x3b, 0x9a, 0xa7, 0x67, 0xf7, 0x85, 0xb5, 0x37, 0xc0]
    );
}

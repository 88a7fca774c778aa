use http::Method;
use probebin_codec::path_segments;
use probebin_core::{
    BasicAuth, DEFAULT_CHUNK_SIZE, DigestAuth, DigestHash, Expected, ProbeError, Qop, Request, Response,
    apply_cors, drip, echo, parse_count, parse_seed, parse_status, random_bytes,
    stream_random_bytes,
};

use crate::config::{LimitsConfig, ServerConfig};

/// Maps request paths onto the diagnostic handlers.
#[derive(Debug, Clone)]
pub struct Router {
    basic: BasicAuth,
    digest: DigestAuth,
    limits: LimitsConfig,
}

impl Router {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            basic: BasicAuth::new(config.basic.realm.clone()),
            digest: DigestAuth::new(config.digest.realm.clone()),
            limits: config.limits,
        }
    }

    /// Dispatches `request` and decorates the result with CORS headers.
    pub fn handle(&self, request: &Request) -> Response {
        let mut response = self.dispatch(request);
        apply_cors(request, &mut response);
        response
    }

    fn dispatch(&self, request: &Request) -> Response {
        if request.method == Method::OPTIONS {
            return Response::new(200);
        }
        let segments = match path_segments(&request.path) {
            Ok(segments) => segments,
            Err(err) => return ProbeError::invalid("path", err.to_string()).into_response(),
        };
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match segments.as_slice() {
            ["get"] => echo(request),
            ["status", code] => match parse_status(Some(*code), 200) {
                Ok(code) => Response::new(code),
                Err(err) => err.into_response(),
            },
            ["bytes", count] => self.bytes(request, count),
            ["stream-bytes", count] => self.stream_bytes(request, count),
            ["drip"] => drip(request, self.limits.max_drip_bytes),
            ["basic-auth", user, password] => self.basic.authenticate(request, user, password),
            ["digest-auth", qop, user, password] => {
                self.digest_auth(request, qop, user, password, None)
            }
            ["digest-auth", qop, user, password, algorithm] => {
                self.digest_auth(request, qop, user, password, Some(*algorithm))
            }
            _ => Response::text(404, "not found\n"),
        }
    }

    fn bytes(&self, request: &Request, count: &str) -> Response {
        let parsed = parse_count("n", Some(count), 0)
            .and_then(|count| Ok((count, parse_seed(request.query_value("seed"))?)));
        match parsed {
            Ok((count, seed)) => random_bytes(self.clamp(count), seed),
            Err(err) => err.into_response(),
        }
    }

    fn stream_bytes(&self, request: &Request, count: &str) -> Response {
        let parsed = parse_count("n", Some(count), 0).and_then(|count| {
            let chunk_size = parse_count(
                "chunk_size",
                request.query_value("chunk_size"),
                DEFAULT_CHUNK_SIZE as u64,
            )?;
            Ok((count, chunk_size, parse_seed(request.query_value("seed"))?))
        });
        match parsed {
            Ok((count, chunk_size, seed)) => {
                let chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
                stream_random_bytes(self.clamp(count), chunk_size, seed)
            }
            Err(err) => err.into_response(),
        }
    }

    fn digest_auth(
        &self,
        request: &Request,
        qop: &str,
        user: &str,
        password: &str,
        algorithm: Option<&str>,
    ) -> Response {
        let expected = Expected {
            user,
            password,
            qop: Qop::from_token(qop),
            algorithm: algorithm
                .and_then(DigestHash::from_token)
                .unwrap_or(DigestHash::Md5),
        };
        self.digest.authenticate(request, expected)
    }

    fn clamp(&self, count: u64) -> usize {
        usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(self.limits.max_bytes)
    }
}

//! RFC 2617 Digest authentication.
//!
//! The engine is stateless: a challenge is never stored, and any nonce the
//! client presents back is accepted as long as the response hash checks out.
//! There is no replay protection.

use std::fmt;

use chrono::Utc;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, Method};
use probebin_codec::DigestHash;
use rand::RngCore;
use serde::Serialize;

use crate::error::ProbeError;
use crate::model::{Request, Response};

pub const DEFAULT_REALM: &str = "me@probebin.local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
    AuthInt,
}

impl Qop {
    pub fn as_str(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
        }
    }

    /// Anything other than `auth` or `auth-int` means no qop is advertised.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("auth") {
            Some(Qop::Auth)
        } else if token.eq_ignore_ascii_case("auth-int") {
            Some(Qop::AuthInt)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: String,
    pub qop: Option<Qop>,
    pub algorithm: DigestHash,
}

impl fmt::Display for DigestChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest realm=\"{}\", nonce=\"{}\"",
            self.realm, self.nonce
        )?;
        if let Some(qop) = self.qop {
            write!(f, ", qop=\"{}\"", qop.as_str())?;
        }
        write!(
            f,
            ", opaque=\"{}\", algorithm={}",
            self.opaque,
            self.algorithm.token()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestCredentials {
    pub fn parse(header: &str) -> Result<Self, ProbeError> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace).ok_or_else(|| {
            ProbeError::MalformedAuthorization("missing credentials".to_string())
        })?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(ProbeError::MalformedAuthorization(format!(
                "unsupported scheme {scheme}"
            )));
        }

        let mut credentials = DigestCredentials::default();
        let mut seen = [false; 5];
        for (key, value) in parse_auth_params(params)? {
            match key.to_ascii_lowercase().as_str() {
                "username" => {
                    credentials.username = value;
                    seen[0] = true;
                }
                "realm" => {
                    credentials.realm = value;
                    seen[1] = true;
                }
                "nonce" => {
                    credentials.nonce = value;
                    seen[2] = true;
                }
                "uri" => {
                    credentials.uri = value;
                    seen[3] = true;
                }
                "response" => {
                    credentials.response = value;
                    seen[4] = true;
                }
                "opaque" => credentials.opaque = Some(value),
                "qop" => credentials.qop = Some(value),
                "nc" => credentials.nc = Some(value),
                "cnonce" => credentials.cnonce = Some(value),
                "algorithm" => credentials.algorithm = Some(value),
                _ => {}
            }
        }

        const REQUIRED: [&str; 5] = ["username", "realm", "nonce", "uri", "response"];
        if let Some(index) = seen.iter().position(|present| !present) {
            return Err(ProbeError::MalformedAuthorization(format!(
                "missing {}",
                REQUIRED[index]
            )));
        }
        Ok(credentials)
    }

    /// `Ok(None)` when the request carries no `Authorization` header at all.
    pub fn from_request(request: &Request) -> Result<Option<Self>, ProbeError> {
        match request.headers.get(http::header::AUTHORIZATION) {
            None => Ok(None),
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    ProbeError::MalformedAuthorization("header is not ASCII".to_string())
                })?;
                Self::parse(value).map(Some)
            }
        }
    }
}

/// Splits `key=value, key="quoted, value"` lists. Quoted strings may contain
/// commas and backslash escapes.
pub fn parse_auth_params(input: &str) -> Result<Vec<(String, String)>, ProbeError> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_string();
        if key.is_empty() || chars.next() != Some('=') {
            return Err(ProbeError::MalformedAuthorization(format!(
                "expected key=value near {key:?}"
            )));
        }

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(ProbeError::MalformedAuthorization(format!(
                    "unterminated quoted value for {key}"
                )));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.push((key, value));
    }

    Ok(params)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownUser,
    RealmMismatch,
    UriMismatch,
    MissingClientNonce,
    ResponseMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected(RejectReason),
}

/// The credentials an endpoint will accept.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub qop: Option<Qop>,
    pub algorithm: DigestHash,
}

#[derive(Debug, Serialize)]
pub(crate) struct Authenticated<'a> {
    pub(crate) authenticated: bool,
    pub(crate) user: &'a str,
}

#[derive(Debug, Clone)]
pub struct DigestAuth {
    realm: String,
}

impl Default for DigestAuth {
    fn default() -> Self {
        Self::new(DEFAULT_REALM)
    }
}

impl DigestAuth {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Builds a fresh challenge. The nonce mixes the client address, the
    /// current time and random bytes so it differs per call.
    pub fn challenge(
        &self,
        request: &Request,
        qop: Option<Qop>,
        algorithm: DigestHash,
    ) -> DigestChallenge {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 16];
        rng.fill_bytes(&mut salt);
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let nonce_material = format!(
            "{}:{}:{}",
            request.remote_addr,
            timestamp,
            algorithm.hex(&salt)
        );
        rng.fill_bytes(&mut salt);

        DigestChallenge {
            realm: self.realm.clone(),
            nonce: algorithm.hex(nonce_material.as_bytes()),
            opaque: algorithm.hex(&salt),
            qop,
            algorithm,
        }
    }

    pub fn issue_challenge(
        &self,
        request: &Request,
        qop: Option<Qop>,
        algorithm: DigestHash,
    ) -> (Response, DigestChallenge) {
        let challenge = self.challenge(request, qop, algorithm);
        let mut response = Response::text(401, "Unauthorized\n");
        match HeaderValue::from_str(&challenge.to_string()) {
            Ok(value) => {
                response.headers.insert(WWW_AUTHENTICATE, value);
            }
            Err(err) => {
                tracing::warn!(realm = %self.realm, %err, "digest challenge is not a valid header value");
            }
        }
        (response, challenge)
    }

    pub fn check(
        &self,
        request: &Request,
        credentials: &DigestCredentials,
        expected: Expected<'_>,
    ) -> Verification {
        if credentials.username != expected.user {
            return Verification::Rejected(RejectReason::UnknownUser);
        }
        if credentials.realm != self.realm {
            return Verification::Rejected(RejectReason::RealmMismatch);
        }
        if credentials.uri != request.target() {
            return Verification::Rejected(RejectReason::UriMismatch);
        }
        match expected_response(
            credentials,
            &request.method,
            expected.password,
            expected.algorithm,
            &request.body,
        ) {
            Ok(digest) if digest == credentials.response => Verification::Verified,
            Ok(_) => Verification::Rejected(RejectReason::ResponseMismatch),
            Err(reason) => Verification::Rejected(reason),
        }
    }

    /// 200 with the authenticated user on success, otherwise a fresh 401
    /// challenge.
    pub fn verify(
        &self,
        request: &Request,
        credentials: &DigestCredentials,
        expected: Expected<'_>,
    ) -> Response {
        match self.check(request, credentials, expected) {
            Verification::Verified => {
                tracing::debug!(user = expected.user, "digest credentials accepted");
                Response::json(
                    200,
                    &Authenticated {
                        authenticated: true,
                        user: expected.user,
                    },
                )
            }
            Verification::Rejected(reason) => {
                tracing::debug!(user = %credentials.username, ?reason, "digest credentials rejected");
                self.issue_challenge(request, expected.qop, expected.algorithm)
                    .0
            }
        }
    }

    /// Runs one step of the challenge/response exchange for `request`.
    pub fn authenticate(&self, request: &Request, expected: Expected<'_>) -> Response {
        match DigestCredentials::from_request(request) {
            Ok(Some(credentials)) => self.verify(request, &credentials, expected),
            Ok(None) => self.issue_challenge(request, expected.qop, expected.algorithm).0,
            Err(err) => {
                tracing::debug!(%err, "unusable authorization header");
                self.issue_challenge(request, expected.qop, expected.algorithm).0
            }
        }
    }
}

/// Response hash the client should have sent. The formula follows the qop the
/// client chose: none gives `H(HA1:nonce:HA2)`, `auth`/`auth-int` give
/// `H(HA1:nonce:nc:cnonce:qop:HA2)`.
pub fn expected_response(
    credentials: &DigestCredentials,
    method: &Method,
    password: &str,
    algorithm: DigestHash,
    body: &[u8],
) -> Result<String, RejectReason> {
    let ha1 = algorithm.hex(
        format!(
            "{}:{}:{}",
            credentials.username, credentials.realm, password
        )
        .as_bytes(),
    );

    let qop = credentials.qop.as_deref().and_then(Qop::from_token);
    let ha2 = match qop {
        Some(Qop::AuthInt) => algorithm.hex(
            format!(
                "{}:{}:{}",
                method.as_str(),
                credentials.uri,
                algorithm.hex(body)
            )
            .as_bytes(),
        ),
        _ => algorithm.hex(format!("{}:{}", method.as_str(), credentials.uri).as_bytes()),
    };

    let response = match qop {
        Some(qop) => {
            let (Some(nc), Some(cnonce)) = (&credentials.nc, &credentials.cnonce) else {
                return Err(RejectReason::MissingClientNonce);
            };
            algorithm.hex(
                format!(
                    "{ha1}:{}:{nc}:{cnonce}:{}:{ha2}",
                    credentials.nonce,
                    qop.as_str()
                )
                .as_bytes(),
            )
        }
        None => algorithm.hex(format!("{ha1}:{}:{ha2}", credentials.nonce).as_bytes()),
    };
    Ok(response)
}

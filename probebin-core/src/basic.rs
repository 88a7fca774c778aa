//! HTTP Basic authentication against a fixed user and password.

use http::HeaderValue;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use probebin_codec::base64_decode_str;

use crate::digest::Authenticated;
use crate::error::ProbeError;
use crate::model::{Request, Response};

pub const DEFAULT_BASIC_REALM: &str = "Fake Realm";

#[derive(Debug, Clone)]
pub struct BasicAuth {
    realm: String,
}

impl Default for BasicAuth {
    fn default() -> Self {
        Self::new(DEFAULT_BASIC_REALM)
    }
}

impl BasicAuth {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn challenge(&self) -> Response {
        let mut response = Response::text(401, "Unauthorized\n");
        match HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm)) {
            Ok(value) => {
                response.headers.insert(WWW_AUTHENTICATE, value);
            }
            Err(err) => {
                tracing::warn!(realm = %self.realm, %err, "basic challenge is not a valid header value");
            }
        }
        response
    }

    /// 200 with the user when the request carries exactly `user:password`,
    /// otherwise a 401 challenge.
    pub fn authenticate(&self, request: &Request, user: &str, password: &str) -> Response {
        match BasicCredentials::from_request(request) {
            Ok(Some(credentials)) if credentials.matches(user, password) => {
                tracing::debug!(user, "basic credentials accepted");
                Response::json(
                    200,
                    &Authenticated {
                        authenticated: true,
                        user,
                    },
                )
            }
            Ok(Some(credentials)) => {
                tracing::debug!(user = %credentials.user, "basic credentials rejected");
                self.challenge()
            }
            Ok(None) => self.challenge(),
            Err(err) => {
                tracing::debug!(%err, "unusable authorization header");
                self.challenge()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parses `Basic <base64(user:password)>`. The password may contain `:`.
    pub fn parse(header: &str) -> Result<Self, ProbeError> {
        let (scheme, encoded) = header.trim().split_once(' ').ok_or_else(|| {
            ProbeError::MalformedAuthorization("missing credentials".to_string())
        })?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(ProbeError::MalformedAuthorization(format!(
                "unsupported scheme {scheme}"
            )));
        }
        let decoded = base64_decode_str(encoded)
            .map_err(|err| ProbeError::MalformedAuthorization(err.to_string()))?;
        let (user, password) = decoded.split_once(':').ok_or_else(|| {
            ProbeError::MalformedAuthorization("credentials lack a ':'".to_string())
        })?;
        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_request(request: &Request) -> Result<Option<Self>, ProbeError> {
        match request.headers.get(AUTHORIZATION) {
            None => Ok(None),
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    ProbeError::MalformedAuthorization("header is not ASCII".to_string())
                })?;
                Self::parse(value).map(Some)
            }
        }
    }

    pub fn matches(&self, user: &str, password: &str) -> bool {
        self.user == user && self.password == password
    }
}

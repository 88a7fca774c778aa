use thiserror::Error;

use crate::model::Response;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("malformed authorization header: {0}")]
    MalformedAuthorization(String),
}

impl ProbeError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ProbeError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ProbeError::InvalidParameter { .. } => 400,
            ProbeError::MalformedAuthorization(_) => 401,
        }
    }

    pub fn into_response(self) -> Response {
        Response::text(self.status(), format!("{self}\n"))
    }
}

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ORIGIN,
};
use http::{HeaderName, HeaderValue, Method};

use crate::model::{Request, Response};

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
pub const MAX_AGE: &str = "3600";

/// Adds the CORS headers every response carries. Headers a handler already
/// set are left alone.
pub fn apply_cors(request: &Request, response: &mut Response) {
    let origin = request
        .headers
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    set_default(response, ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    set_default(
        response,
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );

    if request.method == Method::OPTIONS {
        set_default(
            response,
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        set_default(
            response,
            ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(MAX_AGE),
        );
        if let Some(requested) = request.headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
            set_default(response, ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
    }
}

fn set_default(response: &mut Response, name: HeaderName, value: HeaderValue) {
    response.headers.entry(name).or_insert(value);
}

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::model::{Request, Response};

#[derive(Debug, Serialize)]
struct Echo {
    args: BTreeMap<String, Value>,
    headers: BTreeMap<String, String>,
    origin: String,
    url: String,
}

/// JSON description of the request: query arguments, headers, client
/// address and the URL the client used.
pub fn echo(request: &Request) -> Response {
    let args = request
        .query
        .iter()
        .map(|(key, values)| {
            let value = match values.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            (key.clone(), value)
        })
        .collect();

    let mut headers = BTreeMap::new();
    for name in request.headers.keys() {
        let joined = request
            .headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        headers.insert(title_case(name.as_str()), joined);
    }

    Response::json(
        200,
        &Echo {
            args,
            headers,
            origin: request.remote_addr.clone(),
            url: request.url(),
        },
    )
}

/// `x-forwarded-proto` → `X-Forwarded-Proto`.
pub(crate) fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

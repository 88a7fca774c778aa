use super::types::{Header, Request, StatusLine};

const CRLF: &[u8] = b"\r\n";

/// Terminator of a chunked body (no trailers).
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

pub fn encode_response_head(line: &StatusLine, headers: &[Header]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(line.version.as_str().as_bytes());
    bytes.push(b' ');
    bytes.extend_from_slice(line.status_code.to_string().as_bytes());
    bytes.push(b' ');
    bytes.extend_from_slice(line.reason.as_bytes());
    bytes.extend_from_slice(CRLF);
    encode_headers(&mut bytes, headers);
    bytes
}

/// Frames one chunk of a `Transfer-Encoding: chunked` body. An empty payload
/// encodes to nothing so it never terminates the body early.
pub fn encode_chunk(payload: &[u8]) -> Vec<u8> {
    if payload.is_empty() {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(payload.len() + 12);
    bytes.extend_from_slice(format!("{:x}", payload.len()).as_bytes());
    bytes.extend_from_slice(CRLF);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(CRLF);
    bytes
}

pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut bytes = Vec::new();
    let line = &request.line;
    bytes.extend_from_slice(
        format!("{} {} {}", line.method, line.target, line.version.as_str()).as_bytes(),
    );
    bytes.extend_from_slice(CRLF);
    encode_headers(&mut bytes, &request.headers);
    bytes.extend_from_slice(&request.body);
    bytes
}

fn encode_headers(bytes: &mut Vec<u8>, headers: &[Header]) {
    for header in headers {
        bytes.extend_from_slice(header.raw_name.as_bytes());
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(header.value.as_bytes());
        bytes.extend_from_slice(CRLF);
    }
    bytes.extend_from_slice(CRLF);
}

use std::marker::PhantomData;

use super::types::{
    Header, HttpVersion, Limits, ParseError, ParseErrorKind, ParseWarning, ParseWarningKind,
    Request, RequestLine, Response, StatusLine, find_header, header_has_token,
};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus<T> {
    NeedMore {
        warnings: Vec<ParseWarning>,
    },
    Complete {
        message: T,
        warnings: Vec<ParseWarning>,
    },
    Error {
        error: ParseError,
        warnings: Vec<ParseWarning>,
    },
}

/// First line of a message; decides what kind of message the parser yields.
pub trait StartLine: Sized {
    type Message;

    /// Error reported when the head is not a well-formed message of this kind.
    const MALFORMED: ParseErrorKind;

    fn parse(line: &str, warnings: &mut Vec<ParseWarning>) -> Result<Self, ParseError>;

    fn into_message(self, headers: Vec<Header>, body: Vec<u8>) -> Self::Message;
}

impl StartLine for RequestLine {
    type Message = Request;

    const MALFORMED: ParseErrorKind = ParseErrorKind::InvalidStartLine;

    fn parse(line: &str, warnings: &mut Vec<ParseWarning>) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (method, target, version) = match parts.as_slice() {
            [method, target] => (*method, *target, "HTTP/1.1"),
            [method, target, version] => (*method, *target, *version),
            _ => return Err(malformed::<Self>()),
        };
        Ok(RequestLine {
            method: method.to_string(),
            target: target.to_string(),
            version: parse_http_version(version, warnings),
        })
    }

    fn into_message(self, headers: Vec<Header>, body: Vec<u8>) -> Request {
        Request {
            line: self,
            headers,
            body,
        }
    }
}

impl StartLine for StatusLine {
    type Message = Response;

    const MALFORMED: ParseErrorKind = ParseErrorKind::InvalidStatusLine;

    fn parse(line: &str, warnings: &mut Vec<ParseWarning>) -> Result<Self, ParseError> {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or("HTTP/1.1");
        let status_code = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(malformed::<Self>)?;
        Ok(StatusLine {
            version: parse_http_version(version, warnings),
            status_code,
            reason: parts.next().unwrap_or("").to_string(),
        })
    }

    fn into_message(self, headers: Vec<Header>, body: Vec<u8>) -> Response {
        Response {
            line: self,
            headers,
            body,
        }
    }
}

/// Buffers input until a whole message is available. Bytes past the end of a
/// message stay buffered for the next call (pipelining).
#[derive(Debug)]
pub struct MessageParser<L> {
    buffer: Vec<u8>,
    limits: Limits,
    kind: PhantomData<L>,
}

pub type RequestParser = MessageParser<RequestLine>;
pub type ResponseParser = MessageParser<StatusLine>;

impl<L: StartLine> Default for MessageParser<L> {
    fn default() -> Self {
        Self::with_limits(Limits::default())
    }
}

impl<L: StartLine> MessageParser<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            buffer: Vec::new(),
            limits,
            kind: PhantomData,
        }
    }

    /// Appends `bytes` and tries to take one message off the front of the
    /// buffer. Pushing nothing retries the buffered bytes.
    pub fn push(&mut self, bytes: &[u8]) -> ParseStatus<L::Message> {
        self.buffer.extend_from_slice(bytes);
        let mut warnings = Vec::new();
        match parse_message::<L>(&self.buffer, self.limits, &mut warnings) {
            Ok(Some((message, consumed))) => {
                self.buffer.drain(..consumed);
                ParseStatus::Complete { message, warnings }
            }
            Ok(None) => ParseStatus::NeedMore { warnings },
            Err(error) => ParseStatus::Error { error, warnings },
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn malformed<L: StartLine>() -> ParseError {
    ParseError {
        kind: L::MALFORMED,
        offset: 0,
    }
}

fn parse_message<L: StartLine>(
    buffer: &[u8],
    limits: Limits,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Option<(L::Message, usize)>, ParseError> {
    let Some(head_len) = locate_head(buffer, limits)? else {
        return Ok(None);
    };
    let head = std::str::from_utf8(&buffer[..head_len]).map_err(|_| malformed::<L>())?;

    let mut lines = head.split("\r\n");
    let start = lines.next().unwrap_or("");
    let line = L::parse(start, warnings)?;
    let headers = parse_headers(lines, start.len() + CRLF.len(), warnings);

    let body_start = head_len + HEADER_TERMINATOR.len();
    let framing = framing(&headers, body_start)?;
    let Some((body, body_len)) = read_body(&buffer[body_start..], framing, body_start, limits)?
    else {
        return Ok(None);
    };
    Ok(Some((line.into_message(headers, body), body_start + body_len)))
}

/// Length of the head (start line plus headers), once its terminator arrived.
fn locate_head(buffer: &[u8], limits: Limits) -> Result<Option<usize>, ParseError> {
    let found = twoway::find_bytes(buffer, HEADER_TERMINATOR);
    if found.unwrap_or(buffer.len()) > limits.max_header_bytes {
        return Err(ParseError {
            kind: ParseErrorKind::HeaderTooLarge,
            offset: limits.max_header_bytes,
        });
    }
    Ok(found)
}

fn parse_http_version(raw: &str, warnings: &mut Vec<ParseWarning>) -> HttpVersion {
    match raw {
        "HTTP/1.0" => HttpVersion::Http10,
        "HTTP/1.1" => HttpVersion::Http11,
        other => {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::UnknownVersion(other.to_string()),
                offset: 0,
            });
            HttpVersion::Other(other.to_string())
        }
    }
}

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
    mut offset: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<Header> {
    let mut headers: Vec<Header> = Vec::new();
    for line in lines {
        let line_offset = offset;
        offset += line.len() + CRLF.len();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::ObsFoldDetected,
                offset: line_offset,
            });
            if let Some(previous) = headers.last_mut() {
                previous.value.push(' ');
                previous.value.push_str(line.trim());
                continue;
            }
        }

        let (raw_name, value) = line.split_once(':').unwrap_or((line, ""));
        if raw_name.trim().is_empty() {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::InvalidHeaderName,
                offset: line_offset,
            });
        }
        if value.contains(|c: char| c == '\r' || c == '\n') {
            warnings.push(ParseWarning {
                kind: ParseWarningKind::InvalidHeaderValue,
                offset: line_offset,
            });
        }
        headers.push(Header {
            name: raw_name.trim().to_string(),
            raw_name: raw_name.to_string(),
            value: value.trim().to_string(),
        });
    }
    headers
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Chunked,
    Length(usize),
    Empty,
}

fn framing(headers: &[Header], offset: usize) -> Result<Framing, ParseError> {
    if header_has_token(headers, "transfer-encoding", "chunked") {
        return Ok(Framing::Chunked);
    }
    match find_header(headers, "content-length") {
        Some(raw) => raw.parse::<usize>().map(Framing::Length).map_err(|_| ParseError {
            kind: ParseErrorKind::InvalidContentLength,
            offset,
        }),
        None => Ok(Framing::Empty),
    }
}

/// `None` until the whole body is buffered; otherwise the decoded body and
/// the number of bytes it occupied on the wire.
fn read_body(
    input: &[u8],
    framing: Framing,
    base: usize,
    limits: Limits,
) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    match framing {
        Framing::Empty => Ok(Some((Vec::new(), 0))),
        Framing::Length(length) if length > limits.max_body_bytes => Err(ParseError {
            kind: ParseErrorKind::BodyTooLarge,
            offset: base,
        }),
        Framing::Length(length) => Ok(input
            .get(..length)
            .map(|body| (body.to_vec(), length))),
        Framing::Chunked => decode_chunked(input, base, limits),
    }
}

fn decode_chunked(
    input: &[u8],
    base: usize,
    limits: Limits,
) -> Result<Option<(Vec<u8>, usize)>, ParseError> {
    let error = |kind, at: usize| ParseError {
        kind,
        offset: base + at,
    };
    let mut body = Vec::new();
    let mut cursor = 0;

    loop {
        let Some(size_end) = twoway::find_bytes(&input[cursor..], CRLF).map(|at| cursor + at)
        else {
            return Ok(None);
        };
        let size = chunk_size(&input[cursor..size_end])
            .ok_or_else(|| error(ParseErrorKind::InvalidChunkSize, cursor))?;
        let data_start = size_end + CRLF.len();

        // Trailers are not supported: the last chunk ends with an empty line.
        if size == 0 {
            return match input.get(data_start..data_start + CRLF.len()) {
                None => Ok(None),
                Some(CRLF) => Ok(Some((body, data_start + CRLF.len()))),
                Some(_) => Err(error(ParseErrorKind::InvalidChunkTerminator, data_start)),
            };
        }
        if body.len() + size > limits.max_body_bytes {
            return Err(error(ParseErrorKind::BodyTooLarge, cursor));
        }

        let data_end = data_start + size;
        match input.get(data_end..data_end + CRLF.len()) {
            None => return Ok(None),
            Some(CRLF) => {}
            Some(_) => return Err(error(ParseErrorKind::InvalidChunkTerminator, data_end)),
        }
        body.extend_from_slice(&input[data_start..data_end]);
        cursor = data_end + CRLF.len();
    }
}

fn chunk_size(line: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(line).ok()?;
    let digits = text.split(';').next()?.trim().trim_start_matches("0x");
    usize::from_str_radix(digits, 16).ok()
}

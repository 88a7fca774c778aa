mod encoder;
mod parser;
mod types;

pub use encoder::{LAST_CHUNK, encode_chunk, encode_request, encode_response_head};
pub use parser::{MessageParser, ParseStatus, RequestParser, ResponseParser, StartLine};
pub use types::{
    Header, HttpVersion, Limits, ParseError, ParseErrorKind, ParseWarning, ParseWarningKind,
    Request, RequestLine, Response, StatusLine,
};

mod http1;

pub use http1::{
    Header, HttpVersion, LAST_CHUNK, Limits, MessageParser, ParseError, ParseErrorKind,
    ParseStatus, ParseWarning, ParseWarningKind, Request, RequestLine, RequestParser, Response,
    ResponseParser, StartLine, StatusLine, encode_chunk, encode_request, encode_response_head,
};

use percent_encoding::percent_decode_str;

use crate::CodecError;

/// Percent-decodes `input`, rejecting sequences that do not decode to UTF-8.
pub fn url_decode_str(input: &str) -> Result<String, CodecError> {
    percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|err| CodecError::Url(err.to_string()))
}

/// Splits an absolute path on `/` and decodes each segment. Empty segments
/// (leading, trailing or doubled slashes) are dropped.
pub fn path_segments(path: &str) -> Result<Vec<String>, CodecError> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(url_decode_str)
        .collect()
}

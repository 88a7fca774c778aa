use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::CodecError;

pub fn base64_encode_str(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

/// Decodes standard padded base64 into UTF-8 text.
pub fn base64_decode_str(input: &str) -> Result<String, CodecError> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|err| CodecError::Base64(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| CodecError::Base64(err.to_string()))
}

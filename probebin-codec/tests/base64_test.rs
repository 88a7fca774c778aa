use assert_matches::assert_matches;
use probebin_codec::{CodecError, base64_decode_str, base64_encode_str};

#[test]
fn encodes_credentials() {
    assert_eq!(base64_encode_str("user:passwd"), "dXNlcjpwYXNzd2Q=");
}

#[test]
fn decodes_credentials() {
    assert_eq!(base64_decode_str("dXNlcjpwYXNzd2Q=").unwrap(), "user:passwd");
    assert_eq!(base64_decode_str(" Zm9vOmJhcg== ").unwrap(), "foo:bar");
}

#[test]
fn rejects_bad_input() {
    assert_matches!(base64_decode_str("not base64!"), Err(CodecError::Base64(_)));
    assert_matches!(base64_decode_str("/w=="), Err(CodecError::Base64(_)));
}

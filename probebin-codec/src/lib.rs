mod encode;
mod error;
mod hash;
mod path;

pub use encode::{base64_decode_str, base64_encode_str};
pub use error::CodecError;
pub use hash::{DigestHash, md5_hex, sha256_hex, sha512_hex};
pub use path::{path_segments, url_decode_str};

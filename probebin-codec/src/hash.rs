use sha2::Digest;

/// Hash functions a Digest challenge may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestHash {
    Md5,
    Sha256,
    Sha512,
}

impl DigestHash {
    pub fn hex(self, input: &[u8]) -> String {
        match self {
            DigestHash::Md5 => md5_hex(input),
            DigestHash::Sha256 => sha256_hex(input),
            DigestHash::Sha512 => sha512_hex(input),
        }
    }

    /// Token used for the `algorithm` parameter.
    pub fn token(self) -> &'static str {
        match self {
            DigestHash::Md5 => "MD5",
            DigestHash::Sha256 => "SHA-256",
            DigestHash::Sha512 => "SHA-512",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("MD5") {
            Some(DigestHash::Md5)
        } else if token.eq_ignore_ascii_case("SHA-256") {
            Some(DigestHash::Sha256)
        } else if token.eq_ignore_ascii_case("SHA-512") {
            Some(DigestHash::Sha512)
        } else {
            None
        }
    }
}

pub fn md5_hex(input: &[u8]) -> String {
    format!("{:x}", md5::compute(input))
}

pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

pub fn sha512_hex(input: &[u8]) -> String {
    let mut hasher = sha2::Sha512::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

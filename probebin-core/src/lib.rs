mod basic;
mod cors;
mod digest;
mod drip;
mod echo;
mod error;
mod model;
mod params;
mod seeded;

pub use basic::{BasicAuth, BasicCredentials, DEFAULT_BASIC_REALM};
pub use cors::{ALLOWED_METHODS, MAX_AGE, apply_cors};
pub use digest::{
    DEFAULT_REALM, DigestAuth, DigestChallenge, DigestCredentials, Expected, Qop, RejectReason,
    Verification, expected_response, parse_auth_params,
};
pub use drip::{
    DripPlan, DripSpec, FILL_BYTE, MIN_INTERVAL, drip, respond as drip_response,
    stream as drip_stream,
};
pub use echo::echo;
pub use error::ProbeError;
pub use model::{
    Body, BodyStream, ChunkStream, Query, Request, RequestBuilder, Response, Scheme, parse_query,
};
pub use params::{parse_count, parse_seconds, parse_seed, parse_status};
pub use probebin_codec::DigestHash;
pub use seeded::{
    ByteSource, DEFAULT_CHUNK_SIZE, generate, random_bytes, stream_random_bytes,
};

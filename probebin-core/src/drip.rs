use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, sleep, sleep_until};

use crate::error::ProbeError;
use crate::model::{BodyStream, Request, Response};
use crate::params::{parse_count, parse_seconds, parse_seed, parse_status};
use crate::seeded::ByteSource;

pub const FILL_BYTE: u8 = b'*';

/// Chunks are never scheduled closer together than this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct DripSpec {
    pub numbytes: u64,
    pub duration: Duration,
    pub delay: Duration,
    pub code: u16,
    /// Pseudo-random payload instead of the fill byte.
    pub seed: Option<u64>,
}

impl Default for DripSpec {
    fn default() -> Self {
        Self {
            numbytes: 10,
            duration: Duration::from_secs(2),
            delay: Duration::ZERO,
            code: 200,
            seed: None,
        }
    }
}

impl DripSpec {
    /// Reads `numbytes`, `duration`, `delay`, `code` and `seed` from the
    /// query. `numbytes` is clamped to `max_bytes`.
    pub fn from_request(request: &Request, max_bytes: u64) -> Result<Self, ProbeError> {
        let defaults = Self::default();
        let numbytes = parse_count("numbytes", request.query_value("numbytes"), defaults.numbytes)?;
        Ok(Self {
            numbytes: numbytes.min(max_bytes),
            duration: parse_seconds("duration", request.query_value("duration"), defaults.duration)?,
            delay: parse_seconds("delay", request.query_value("delay"), defaults.delay)?,
            code: parse_status(request.query_value("code"), defaults.code)?,
            seed: parse_seed(request.query_value("seed"))?,
        })
    }

    pub fn plan(&self) -> DripPlan {
        if self.numbytes == 0 {
            return DripPlan {
                chunks: 0,
                base: 0,
                remainder: 0,
                interval: Duration::ZERO,
            };
        }
        if self.duration.is_zero() {
            return DripPlan {
                chunks: 1,
                base: self.numbytes,
                remainder: 0,
                interval: Duration::ZERO,
            };
        }

        let ticks = (self.duration.as_nanos() / MIN_INTERVAL.as_nanos()).max(1);
        let chunks = u64::try_from(ticks)
            .unwrap_or(u64::MAX)
            .min(self.numbytes);
        DripPlan {
            chunks,
            base: self.numbytes / chunks,
            remainder: self.numbytes % chunks,
            interval: self.duration.div_f64(chunks as f64),
        }
    }
}

/// How a drip payload is cut up: `chunks` pieces, `interval` apart, the first
/// `remainder` of them one byte longer than `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DripPlan {
    pub chunks: u64,
    pub base: u64,
    pub remainder: u64,
    pub interval: Duration,
}

impl DripPlan {
    pub fn chunk_len(&self, index: u64) -> u64 {
        if index < self.remainder {
            self.base + 1
        } else {
            self.base
        }
    }
}

/// Emits the payload after `delay`, with chunk `k` due at
/// `delay + k * interval`. Dropping the stream cancels any pending timer.
pub fn stream(spec: &DripSpec) -> BodyStream {
    let mut source = spec.seed.map(|seed| ByteSource::new(Some(seed)));
    stream_with(spec, move |len| match source.as_mut() {
        Some(source) => source.take(len),
        None => vec![FILL_BYTE; len],
    })
}

/// Drip schedule of `spec` with chunk contents produced by `fill`.
pub(crate) fn stream_with<F>(spec: &DripSpec, mut fill: F) -> BodyStream
where
    F: FnMut(usize) -> Vec<u8> + Send + 'static,
{
    let plan = spec.plan();
    let delay = spec.delay;
    let chunks = async_stream::stream! {
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let start = Instant::now();
        for index in 0..plan.chunks {
            if index > 0 {
                sleep_until(start + plan.interval.mul_f64(index as f64)).await;
            }
            yield Bytes::from(fill(plan.chunk_len(index) as usize));
        }
    };
    BodyStream::new(Box::pin(chunks), Some(spec.numbytes))
}

pub fn respond(spec: &DripSpec) -> Response {
    tracing::debug!(
        numbytes = spec.numbytes,
        duration_ms = spec.duration.as_millis() as u64,
        delay_ms = spec.delay.as_millis() as u64,
        code = spec.code,
        "starting drip"
    );
    Response::streaming(spec.code, "application/octet-stream", stream(spec))
}

/// Parses the drip parameters and builds the streaming response. Invalid
/// parameters produce a 400 before any streaming starts.
pub fn drip(request: &Request, max_bytes: u64) -> Response {
    match DripSpec::from_request(request, max_bytes) {
        Ok(spec) => respond(&spec),
        Err(err) => err.into_response(),
    }
}

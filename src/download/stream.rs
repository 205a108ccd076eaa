//! Chunked, range-based reading of a resolved media URL

use crate::core::video_info::StreamInfo;
use crate::platform::client::Transport;
use crate::utils::cancel::run_cancellable;
use crate::Result;
use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default size of one range request (10MB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Rate limiter for controlling read speed
#[derive(Debug)]
struct RateLimiter {
    bytes_per_second: u64,
    started: Instant,
    bytes_sent: u64,
}

impl RateLimiter {
    fn new(bytes_per_second: u64) -> Self {
        Self {
            bytes_per_second: bytes_per_second.max(1),
            started: Instant::now(),
            bytes_sent: 0,
        }
    }

    /// Time to wait so that `bytes` more keeps the average under the limit
    fn delay_for(&mut self, bytes: u64) -> Duration {
        self.bytes_sent += bytes;
        let allowed = Duration::from_secs_f64(self.bytes_sent as f64 / self.bytes_per_second as f64);
        allowed.saturating_sub(self.started.elapsed())
    }

    async fn wait_if_needed(&mut self, bytes: u64) {
        let wait_time = self.delay_for(bytes);
        if wait_time > Duration::from_millis(1) {
            tokio::time::sleep(wait_time).await;
        }
    }
}

/// Readable byte stream over one resolved [`StreamInfo`].
///
/// Each read issues one range request of at most `chunk_size` bytes.
pub struct MediaStream {
    transport: Arc<dyn Transport>,
    url: String,
    size: u64,
    position: u64,
    chunk_size: u64,
    rate_limiter: Option<RateLimiter>,
    token: CancellationToken,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("url", &self.url)
            .field("size", &self.size)
            .field("position", &self.position)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl MediaStream {
    pub fn new(transport: Arc<dyn Transport>, stream: &StreamInfo) -> Self {
        Self {
            transport,
            url: stream.url.clone(),
            size: stream.size,
            position: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rate_limiter: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Limit average read speed
    pub fn with_rate_limit(mut self, bytes_per_second: u64) -> Self {
        self.rate_limiter = Some(RateLimiter::new(bytes_per_second));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Total size in bytes
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }

    /// Move the read cursor, clamped to the stream size
    pub fn seek(&mut self, position: u64) {
        self.position = position.min(self.size);
    }

    /// Read the next chunk, or `None` at end of stream
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let length = self.remaining().min(self.chunk_size);
        if length == 0 {
            return Ok(None);
        }

        let transport = &self.transport;
        let (url, offset) = (self.url.as_str(), self.position);
        let bytes = run_cancellable(&self.token, async {
            Ok(transport.fetch_bytes_range(url, offset, length).await?)
        })
        .await?;

        if bytes.is_empty() {
            warn!(
                "Stream ended early at {} of {} bytes: {}",
                self.position, self.size, self.url
            );
            self.size = self.position;
            return Ok(None);
        }

        self.position += bytes.len() as u64;
        debug!(
            "Read {} bytes ({}/{}) from {}",
            bytes.len(),
            self.position,
            self.size,
            self.url
        );

        if let Some(limiter) = self.rate_limiter.as_mut() {
            let read = bytes.len() as u64;
            run_cancellable(&self.token, async {
                limiter.wait_if_needed(read).await;
                Ok(())
            })
            .await?;
        }

        Ok(Some(bytes))
    }

    /// Consume into a stream of byte chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> {
        stream::try_unfold(self, |mut media| async move {
            Ok(media.read_chunk().await?.map(|chunk| (chunk, media)))
        })
    }
}

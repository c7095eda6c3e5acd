use async_trait::async_trait;
use bytes::Bytes;
use derive_builder::Builder;
use reqwest::{
    Client, Proxy, Response, Url,
    header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA},
};
use tokio::time::{self, Duration};

use crate::error::{SessionInitError, TransferError, diagnostic};

/// Client identifier sent with every request.
pub const DEFAULT_USER_AGENT: &str = "GetAndRun";
/// Capacity of the reusable receive buffer.
pub const BUFFER_LEN: usize = 4096;

/// Control state of the receive/write loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    ReceiveData,
    WriteData,
    Complete,
    /// Idle state of a session that has not been initialised.
    #[default]
    Undefined,
}

/// Result of one read from a [ChunkSource].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Number of bytes placed in the buffer. Zero marks the end of the stream.
    Received(usize),
    /// No data arrived in time. Not an error, the caller polls again.
    Pending,
}

/// Something that fills a buffer with the next bytes of a download.
#[async_trait]
pub trait ChunkSource: Send {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransferError>;
}

/// Tuning for a fetch session and the loop driving it.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SessionOptions {
    /// Client identifier used as the user agent.
    #[builder(default = DEFAULT_USER_AGENT.to_string())]
    user_agent: String,
    /// Capacity of the receive buffer, fixed for the lifetime of a session.
    #[builder(default = BUFFER_LEN)]
    chunk_size: usize,
    /// A read that yields nothing for this long is reported as pending.
    #[builder(default = Duration::from_secs(5))]
    pending_timeout: Duration,
    /// Pause before polling again after a pending read.
    #[builder(default = Duration::from_millis(250))]
    pending_backoff: Duration,
    /// Consecutive pending reads tolerated before the transfer is considered stalled.
    #[builder(default = 24)]
    max_pending_polls: u32,
    #[builder(default = None)]
    connect_timeout: Option<Duration>,
    #[builder(default = None)]
    proxy: Option<Proxy>,
}

impl SessionOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if self.pending_timeout == Some(Duration::ZERO) {
            return Err("pending_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl SessionOptions {
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn pending_timeout(&self) -> Duration {
        self.pending_timeout
    }

    pub fn pending_backoff(&self) -> Duration {
        self.pending_backoff
    }

    pub fn max_pending_polls(&self) -> u32 {
        self.max_pending_polls
    }

    /// HTTP client bound to the client identifier that always bypasses caches.
    fn client(&self) -> Result<Client, SessionInitError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let mut client = Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(headers);
        if let Some(timeout) = self.connect_timeout {
            client = client.connect_timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            client = client.proxy(proxy.clone());
        }
        client.build().map_err(|e| {
            tracing::error!("Failed to create HTTP session: {}", diagnostic(&e));
            SessionInitError::Client { e }
        })
    }
}

/// Response body of a GET request, read in pieces of at most the caller's buffer size.
pub struct HttpSource {
    response: Response,
    /// Part of the last network frame that did not fit in the caller's buffer.
    leftover: Bytes,
    pending_timeout: Duration,
}

impl HttpSource {
    pub async fn open(url: &Url, options: &SessionOptions) -> Result<Self, SessionInitError> {
        let client = options.client()?;
        let response = client.get(url.clone()).send().await.map_err(|e| {
            tracing::error!("Failed to open {}: {}", url, diagnostic(&e));
            SessionInitError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Server answered {} for {}", status, url);
            return Err(SessionInitError::ResponseStatusNotSuccess {
                status_code: status.to_string(),
            });
        }
        tracing::debug!(
            content_length = ?response.content_length(),
            "Opened {}",
            url
        );

        Ok(Self {
            response,
            leftover: Bytes::new(),
            pending_timeout: options.pending_timeout,
        })
    }
}

#[async_trait]
impl ChunkSource for HttpSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransferError> {
        while self.leftover.is_empty() {
            let next = match time::timeout(self.pending_timeout, self.response.chunk()).await {
                Ok(next) => next.map_err(TransferError::from)?,
                Err(_) => return Ok(ReadOutcome::Pending),
            };
            match next {
                Some(frame) => self.leftover = frame,
                None => return Ok(ReadOutcome::Received(0)),
            }
        }

        let len = buf.len().min(self.leftover.len());
        let piece = self.leftover.split_to(len);
        buf[..len].copy_from_slice(&piece);
        Ok(ReadOutcome::Received(len))
    }
}

/// Owns one live download source, the reusable receive buffer and the loop state.
pub struct FetchSession<S> {
    source: S,
    buffer: Box<[u8]>,
    received: usize,
    state: DownloadState,
}

impl FetchSession<HttpSource> {
    /// Opens `url` with the client identifier and cache bypass, ready to receive.
    pub async fn open(url: &Url, options: &SessionOptions) -> Result<Self, SessionInitError> {
        let source = HttpSource::open(url, options).await?;
        Self::new(source, options.chunk_size)
    }
}

impl<S: ChunkSource> FetchSession<S> {
    pub fn new(source: S, chunk_size: usize) -> Result<Self, SessionInitError> {
        if chunk_size == 0 {
            return Err(SessionInitError::InvalidChunkSize);
        }
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(chunk_size).map_err(|e| {
            tracing::error!("Failed to allocate a {} byte buffer: {}", chunk_size, e);
            SessionInitError::BufferAllocation { size: chunk_size }
        })?;
        buffer.resize(chunk_size, 0u8);
        Ok(Self {
            source,
            buffer: buffer.into_boxed_slice(),
            received: 0,
            state: DownloadState::ReceiveData,
        })
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn set_state(&mut self, next: DownloadState) {
        self.state = next;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// One read of up to [Self::capacity] bytes into the session buffer.
    pub async fn receive_chunk(&mut self) -> Result<ReadOutcome, TransferError> {
        self.received = 0;
        match self.source.read_chunk(&mut self.buffer).await {
            Ok(ReadOutcome::Received(len)) => {
                self.received = len.min(self.buffer.len());
                Ok(ReadOutcome::Received(self.received))
            }
            Ok(ReadOutcome::Pending) => {
                tracing::warn!("Waiting for data from the server");
                Ok(ReadOutcome::Pending)
            }
            Err(e) => {
                tracing::error!("Failed to read response body: {}", diagnostic(&e));
                Err(e)
            }
        }
    }

    /// Size and bytes of the most recent read.
    pub fn last_response(&self) -> (usize, &[u8]) {
        (self.received, &self.buffer[..self.received])
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    pub enum ScriptedRead {
        Data(Vec<u8>),
        Pending,
        Fail,
    }

    /// Source replaying a fixed list of reads, then end of stream.
    pub struct ScriptedSource {
        reads: VecDeque<ScriptedRead>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        pub fn new(reads: Vec<ScriptedRead>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    reads: reads.into(),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }

        pub fn data(chunks: &[&[u8]]) -> Self {
            Self::new(
                chunks
                    .iter()
                    .map(|c| ScriptedRead::Data(c.to_vec()))
                    .collect(),
            )
            .0
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reads.pop_front() {
                Some(ScriptedRead::Data(data)) => {
                    assert!(data.len() <= buf.len(), "scripted chunk larger than buffer");
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(ReadOutcome::Received(data.len()))
                }
                Some(ScriptedRead::Pending) => Ok(ReadOutcome::Pending),
                Some(ScriptedRead::Fail) => Err(TransferError::ConnectionClosed),
                None => Ok(ReadOutcome::Received(0)),
            }
        }
    }
}

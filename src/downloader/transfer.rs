use tokio::time::{self, Duration};

use crate::{
    downloader::{
        output::ChunkSink,
        session::{ChunkSource, DownloadState, FetchSession, ReadOutcome, SessionOptions},
    },
    error::{TransferError, diagnostic},
};

/// Totals of one finished transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub bytes_received: u64,
    pub bytes_written: u64,
    /// Non-empty chunks moved from the session to the sink.
    pub chunks: u64,
    pub pending_polls: u64,
}

/// Result of handing the last received chunk to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(usize),
    /// The last read returned no bytes, nothing was written.
    EndOfStream,
}

/// Alternates between reading a chunk from the session and writing it to the sink
/// until the stream ends or either side fails.
pub struct DownloadLoop<'a, S, W> {
    session: &'a mut FetchSession<S>,
    sink: &'a mut W,
    pending_backoff: Duration,
    max_pending_polls: u32,
}

impl<'a, S, W> DownloadLoop<'a, S, W>
where
    S: ChunkSource,
    W: ChunkSink,
{
    pub fn new(
        session: &'a mut FetchSession<S>,
        sink: &'a mut W,
        options: &SessionOptions,
    ) -> Self {
        Self {
            session,
            sink,
            pending_backoff: options.pending_backoff(),
            max_pending_polls: options.max_pending_polls(),
        }
    }

    pub async fn run(self) -> Result<TransferSummary, TransferError> {
        let mut summary = TransferSummary::default();
        let mut consecutive_pending: u32 = 0;

        loop {
            match self.session.state() {
                DownloadState::ReceiveData => {
                    self.session.set_state(DownloadState::WriteData);
                    match self.session.receive_chunk().await? {
                        ReadOutcome::Received(len) => {
                            consecutive_pending = 0;
                            summary.bytes_received += len as u64;
                        }
                        ReadOutcome::Pending => {
                            // nothing to write, poll again after a pause
                            self.session.set_state(DownloadState::ReceiveData);
                            consecutive_pending += 1;
                            summary.pending_polls += 1;
                            if consecutive_pending > self.max_pending_polls {
                                tracing::error!(
                                    "Giving up after {} polls without data",
                                    consecutive_pending
                                );
                                return Err(TransferError::Stalled {
                                    polls: consecutive_pending,
                                });
                            }
                            time::sleep(self.pending_backoff).await;
                        }
                    }
                }
                DownloadState::WriteData => {
                    self.session.set_state(DownloadState::ReceiveData);
                    match write_chunk(self.session, self.sink).await? {
                        WriteOutcome::Written(len) => {
                            summary.bytes_written += len as u64;
                            summary.chunks += 1;
                        }
                        WriteOutcome::EndOfStream => {
                            self.session.set_state(DownloadState::Complete);
                        }
                    }
                }
                DownloadState::Complete => break,
                DownloadState::Undefined => {
                    tracing::error!("Download loop started on an uninitialised session");
                    return Err(TransferError::SessionNotReady);
                }
            }
        }

        tracing::debug!(
            bytes = summary.bytes_written,
            chunks = summary.chunks,
            pending_polls = summary.pending_polls,
            "Transfer complete"
        );
        Ok(summary)
    }
}

/// Writes the session's last response to `sink`.
/// A zero-length response is the end of the stream and is not written.
pub async fn write_chunk<S, W>(
    session: &FetchSession<S>,
    sink: &mut W,
) -> Result<WriteOutcome, TransferError>
where
    S: ChunkSource,
    W: ChunkSink,
{
    let (size, data) = session.last_response();
    if size == 0 {
        return Ok(WriteOutcome::EndOfStream);
    }

    match sink.write_chunk(data).await {
        Ok(written) if written == size => Ok(WriteOutcome::Written(written)),
        Ok(written) => {
            tracing::error!("Short write: {} of {} bytes written", written, size);
            Err(TransferError::ShortWrite {
                requested: size,
                written,
            })
        }
        Err(e) => {
            tracing::error!("Failed to write downloaded data: {}", diagnostic(&e));
            Err(TransferError::Write { e })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::session::{SessionOptionsBuilder, test_support::*};
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct MemorySink {
        data: Vec<u8>,
        writes: usize,
    }

    #[async_trait]
    impl ChunkSink for MemorySink {
        async fn write_chunk(&mut self, data: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            self.data.extend_from_slice(data);
            Ok(data.len())
        }
    }

    /// Accepts one byte less than asked for.
    struct ShortSink;

    #[async_trait]
    impl ChunkSink for ShortSink {
        async fn write_chunk(&mut self, data: &[u8]) -> io::Result<usize> {
            Ok(data.len().saturating_sub(1))
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ChunkSink for FailingSink {
        async fn write_chunk(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"))
        }
    }

    fn options(max_pending_polls: u32) -> SessionOptions {
        SessionOptionsBuilder::default()
            .pending_backoff(Duration::from_millis(100))
            .max_pending_polls(max_pending_polls)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn copies_every_chunk_in_order() {
        let source = ScriptedSource::data(&[b"first ", b"second ", b"third"]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut sink = MemorySink::default();

        let summary = DownloadLoop::new(&mut session, &mut sink, &options(3))
            .run()
            .await
            .unwrap();

        assert_eq!(sink.data, b"first second third");
        assert_eq!(sink.writes, 3);
        assert_eq!(summary.bytes_received, 18);
        assert_eq!(summary.bytes_written, summary.bytes_received);
        assert_eq!(summary.chunks, 3);
        assert_eq!(session.state(), DownloadState::Complete);
    }

    #[tokio::test]
    async fn empty_response_completes_without_writing() {
        let (source, calls) = ScriptedSource::new(vec![]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut sink = MemorySink::default();

        let summary = DownloadLoop::new(&mut session, &mut sink, &options(3))
            .run()
            .await
            .unwrap();

        assert_eq!(summary, TransferSummary::default());
        assert_eq!(sink.writes, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), DownloadState::Complete);
    }

    #[tokio::test]
    async fn short_write_halts_without_further_reads() {
        let (source, calls) = ScriptedSource::new(vec![
            ScriptedRead::Data(b"abcd".to_vec()),
            ScriptedRead::Data(b"efgh".to_vec()),
        ]);
        let mut session = FetchSession::new(source, 16).unwrap();

        let result = DownloadLoop::new(&mut session, &mut ShortSink, &options(3))
            .run()
            .await;

        assert!(matches!(
            result,
            Err(TransferError::ShortWrite {
                requested: 4,
                written: 3
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_failure_halts_the_loop() {
        let (source, calls) = ScriptedSource::new(vec![ScriptedRead::Data(b"abcd".to_vec())]);
        let mut session = FetchSession::new(source, 16).unwrap();

        let result = DownloadLoop::new(&mut session, &mut FailingSink, &options(3))
            .run()
            .await;

        assert!(matches!(result, Err(TransferError::Write { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_failure_halts_and_keeps_written_prefix() {
        let (source, _) = ScriptedSource::new(vec![
            ScriptedRead::Data(b"kept".to_vec()),
            ScriptedRead::Fail,
            ScriptedRead::Data(b"never".to_vec()),
        ]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut sink = MemorySink::default();

        let result = DownloadLoop::new(&mut session, &mut sink, &options(3))
            .run()
            .await;

        assert!(matches!(result, Err(TransferError::ConnectionClosed)));
        assert_eq!(sink.data, b"kept");
        assert_eq!(session.state(), DownloadState::WriteData);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn full_disk_fails_the_write_that_hit_it() {
        use crate::downloader::output::OutputFile;

        let (source, calls) = ScriptedSource::new(vec![
            ScriptedRead::Data(b"abcd".to_vec()),
            ScriptedRead::Data(b"efgh".to_vec()),
        ]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut output = OutputFile::create("/dev/full").await.unwrap();

        let result = DownloadLoop::new(&mut session, &mut output, &options(3))
            .run()
            .await;

        assert!(matches!(result, Err(TransferError::Write { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_reads_are_polled_again() {
        let (source, calls) = ScriptedSource::new(vec![
            ScriptedRead::Data(b"ab".to_vec()),
            ScriptedRead::Pending,
            ScriptedRead::Pending,
            ScriptedRead::Data(b"cd".to_vec()),
        ]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut sink = MemorySink::default();

        let summary = DownloadLoop::new(&mut session, &mut sink, &options(2))
            .run()
            .await
            .unwrap();

        assert_eq!(sink.data, b"abcd");
        assert_eq!(summary.pending_polls, 2);
        assert_eq!(summary.chunks, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_pending_reads_stall_the_transfer() {
        let (source, calls) = ScriptedSource::new(vec![
            ScriptedRead::Pending,
            ScriptedRead::Pending,
            ScriptedRead::Pending,
            ScriptedRead::Data(b"late".to_vec()),
        ]);
        let mut session = FetchSession::new(source, 16).unwrap();
        let mut sink = MemorySink::default();

        let result = DownloadLoop::new(&mut session, &mut sink, &options(2))
            .run()
            .await;

        assert!(matches!(result, Err(TransferError::Stalled { polls: 3 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.writes, 0);
    }

    #[tokio::test]
    async fn undefined_state_is_rejected() {
        let mut session = FetchSession::new(ScriptedSource::data(&[b"x"]), 16).unwrap();
        session.set_state(DownloadState::Undefined);
        let mut sink = MemorySink::default();

        let result = DownloadLoop::new(&mut session, &mut sink, &options(3))
            .run()
            .await;

        assert!(matches!(result, Err(TransferError::SessionNotReady)));
        assert_eq!(sink.writes, 0);
    }

    #[tokio::test]
    async fn write_chunk_reports_end_of_stream_for_empty_response() {
        let session = FetchSession::new(ScriptedSource::data(&[]), 16).unwrap();
        let mut sink = MemorySink::default();

        let outcome = write_chunk(&session, &mut sink).await.unwrap();

        assert_eq!(outcome, WriteOutcome::EndOfStream);
        assert_eq!(sink.writes, 0);
    }
}

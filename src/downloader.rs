mod output;
mod session;
mod transfer;

pub use output::{ChunkSink, OutputFile};
pub use session::{
    BUFFER_LEN, ChunkSource, DEFAULT_USER_AGENT, DownloadState, FetchSession, HttpSource,
    ReadOutcome, SessionOptions, SessionOptionsBuilder, SessionOptionsBuilderError,
};
pub use transfer::{DownloadLoop, TransferSummary, WriteOutcome, write_chunk};

use crate::{
    configuration::Configuration,
    error::{LaunchError, SessionInitError, TransferError, diagnostic},
    launcher::{Launcher, Spawner},
};

/// One download from an opened session into the output file, followed by a launch.
pub struct Downloader<S = HttpSource> {
    configuration: Configuration,
    options: SessionOptions,
    session: FetchSession<S>,
    output: OutputFile,
}

impl Downloader<HttpSource> {
    /// Opens the configured url, then creates (truncates) the output file.
    pub async fn init(
        configuration: Configuration,
        options: SessionOptions,
    ) -> Result<Self, SessionInitError> {
        let session = FetchSession::open(configuration.url(), &options).await?;
        Self::with_session(configuration, options, session).await
    }
}

impl<S: ChunkSource> Downloader<S> {
    /// Uses an already opened session, creating the output file.
    pub async fn with_session(
        configuration: Configuration,
        options: SessionOptions,
        session: FetchSession<S>,
    ) -> Result<Self, SessionInitError> {
        let path = configuration.output_file();
        let output = OutputFile::create(&path).await.map_err(|e| {
            tracing::error!(
                "Failed to create {} for the download: {}",
                path.display(),
                diagnostic(&e)
            );
            SessionInitError::CreateOutput {
                path: path.clone(),
                e,
            }
        })?;

        Ok(Self {
            configuration,
            options,
            session,
            output,
        })
    }

    pub fn state(&self) -> DownloadState {
        self.session.state()
    }

    /// Runs the transfer to completion and releases the output file.
    /// On failure the partially written file is left as it is.
    pub async fn get(&mut self) -> Result<TransferSummary, TransferError> {
        let summary = DownloadLoop::new(&mut self.session, &mut self.output, &self.options)
            .run()
            .await?;

        self.output.close().await.map_err(|e| {
            tracing::error!(
                "Failed to close {}: {}",
                self.output.path().display(),
                diagnostic(&e)
            );
            TransferError::Close { e }
        })?;

        tracing::info!(
            "Downloaded {} bytes to {}",
            summary.bytes_written,
            self.output.path().display()
        );
        Ok(summary)
    }

    /// Launches the downloaded file with the configured parameters.
    pub async fn run<P: Spawner>(
        &mut self,
        launcher: &Launcher<P>,
    ) -> Result<Option<u32>, LaunchError> {
        launcher
            .run(&mut self.output, self.configuration.run_arguments())
            .await
    }
}

pub mod config;
pub mod configuration;
pub mod downloader;
pub mod error;
mod fs_utils;
pub mod launcher;

pub use configuration::Configuration;
pub use downloader::{Downloader, SessionOptions, SessionOptionsBuilder, TransferSummary};
pub use launcher::{DetachedSpawner, Launcher, Spawner};

use error::{GetRunError, LaunchError, TransferError};

/// What happened after the downloader was initialised.
#[derive(Debug)]
pub struct RunReport {
    pub transfer: Result<TransferSummary, TransferError>,
    /// None when the transfer failed and nothing was launched.
    pub launch: Option<Result<Option<u32>, LaunchError>>,
}

/// Downloads `configuration.url()` to `configuration.output_file()` and launches it.
///
/// Only initialisation failures are returned as errors. A failed transfer skips the
/// launch and a failed launch is reported in the [RunReport].
pub async fn get_and_run<P: Spawner>(
    configuration: Configuration,
    options: SessionOptions,
    launcher: &Launcher<P>,
) -> Result<RunReport, GetRunError> {
    let mut downloader = Downloader::init(configuration, options).await?;

    let transfer = downloader.get().await;
    let launch = match &transfer {
        Ok(_) => Some(downloader.run(launcher).await),
        Err(e) => {
            tracing::error!("Download failed, not launching: {}", e);
            None
        }
    };

    Ok(RunReport { transfer, launch })
}

use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

/// Destination of downloaded chunks.
#[async_trait]
pub trait ChunkSink: Send {
    /// Writes `data` with a single call and returns how many bytes were accepted.
    async fn write_chunk(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Write-only handle on the downloaded file. Once closed it is never reopened.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    file: Option<File>,
}

impl OutputFile {
    /// Creates the file, truncating whatever was there before.
    pub async fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Flushes, syncs and releases the handle. Does nothing when already closed.
    pub async fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for OutputFile {
    async fn write_chunk(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => {
                let written = file.write(data).await?;
                // tokio writes in the background, wait for it so errors belong to this chunk
                file.flush().await?;
                Ok(written)
            }
            None => Err(io::Error::other(format!(
                "{} is already closed for writing",
                self.path.display()
            ))),
        }
    }
}

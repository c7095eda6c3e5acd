use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GetRunError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("Failed to init downloader: {0}")]
    SessionInit(#[from] SessionInitError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No URL was given")]
    MissingUrl,
    #[error("Invalid URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("Invalid file path: {}", path.display())]
    InvalidPath { path: PathBuf },
    #[error("Failed to load settings from {}: {e}", path.display())]
    Settings { path: PathBuf, e: std::io::Error },
}

impl ConfigError {
    /// Errors caused by the positional arguments, which are answered with the usage text.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ConfigError::MissingUrl | ConfigError::InvalidPath { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum SessionInitError {
    #[error("Failed to build HTTP client: {e}")]
    Client { e: reqwest::Error },
    #[error("Failed to open url: {e}")]
    Request { e: reqwest::Error },
    #[error("Response status not success: {status_code:?}")]
    ResponseStatusNotSuccess { status_code: String },
    #[error("Invalid session options: {message}")]
    InvalidOptions { message: String },
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("Failed to allocate a receive buffer of {size} bytes")]
    BufferAllocation { size: usize },
    #[error("Failed to create output file {}: {e}", path.display())]
    CreateOutput { path: PathBuf, e: std::io::Error },
}

impl From<reqwest::Error> for SessionInitError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if !status.is_success() => Self::ResponseStatusNotSuccess {
                status_code: status.to_string(),
            },
            _ if e.is_builder() => Self::Client { e },
            _ => Self::Request { e },
        }
    }
}

impl From<crate::downloader::SessionOptionsBuilderError> for SessionInitError {
    fn from(e: crate::downloader::SessionOptionsBuilderError) -> Self {
        Self::InvalidOptions {
            message: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("Response body error: {message}")]
    ResponseBodyError { message: String },
    #[error("Read failed: {e}")]
    Read { e: reqwest::Error },
    #[error("No data received after {polls} consecutive polls")]
    Stalled { polls: u32 },
    #[error("Download session is not ready")]
    SessionNotReady,
    #[error("Short write: {written} of {requested} bytes written")]
    ShortWrite { requested: usize, written: usize },
    #[error("Write failed: {e}")]
    Write { e: std::io::Error },
    #[error("Failed to close output file: {e}")]
    Close { e: std::io::Error },
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        match e.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
            Some(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
                return Self::ConnectionTimeout;
            }
            _ => {}
        }

        match e.is_timeout() {
            true => Self::ConnectionTimeout,
            false if e.is_body() || e.is_decode() => Self::ResponseBodyError {
                message: diagnostic(&e),
            },
            false if e.is_connect() => Self::ConnectionClosed,
            _ => Self::Read { e },
        }
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to close {} before launch: {e}", path.display())]
    Close { path: PathBuf, e: std::io::Error },
    #[error("Failed to mark {} as executable: {e}", path.display())]
    Permissions { path: PathBuf, e: std::io::Error },
    #[error("Failed to spawn {}: {e}", path.display())]
    Spawn { path: PathBuf, e: std::io::Error },
}

/// Renders an error together with its chain of sources, `outer: inner: root`.
pub fn diagnostic(e: &dyn Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Error, Debug)]
    #[error("outer")]
    struct Outer {
        #[source]
        inner: io::Error,
    }

    #[test]
    fn diagnostic_includes_source_chain() {
        let e = Outer {
            inner: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(diagnostic(&e), "outer: disk full");
    }

    #[test]
    fn diagnostic_of_plain_error_is_its_message() {
        let e = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert_eq!(diagnostic(&e), "missing");
    }

    #[test]
    fn usage_errors_are_missing_url_and_invalid_path() {
        assert!(ConfigError::MissingUrl.is_usage_error());
        assert!(
            ConfigError::InvalidPath {
                path: PathBuf::from("/nope/nope")
            }
            .is_usage_error()
        );
        assert!(
            !ConfigError::InvalidUrl {
                url: "x".to_string(),
                message: "bad".to_string()
            }
            .is_usage_error()
        );
    }
}

use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::{error::ConfigError, fs_utils::filename_from_url};

#[cfg(windows)]
pub const FALLBACK_FILE_NAME: &str = "downloadedFile.exe";
#[cfg(not(windows))]
pub const FALLBACK_FILE_NAME: &str = "downloadedFile";

/// What to download, where to save it and how to launch it.
/// Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    url: Url,
    /// Always ends with a path separator.
    output_directory: PathBuf,
    output_file_name: String,
    run_arguments: String,
}

impl Configuration {
    /// Resolves the positional inputs `url [file_path] [param]...`.
    ///
    /// An existing directory as `output` saves into it under the url's file name.
    /// Otherwise `output` is split into a directory (which must exist) and a file name,
    /// so an existing regular file is overwritten by the download.
    pub fn init(
        url: Option<&str>,
        output: Option<&Path>,
        params: &[String],
    ) -> Result<Self, ConfigError> {
        let raw_url = url.ok_or(ConfigError::MissingUrl)?;
        let url = parse_url(raw_url)?;
        tracing::info!("URL to get file from: {}", url);

        let (directory, file_name) = match output {
            Some(path) => split_output_path(path)?,
            None => (None, None),
        };

        let output_directory =
            with_trailing_separator(directory.unwrap_or_else(|| PathBuf::from(".")));
        let output_file_name = file_name
            .or_else(|| filename_from_url(&url))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

        tracing::info!("Directory to save: {}", output_directory.display());
        tracing::info!("File name: {}", output_file_name);

        let run_arguments = params.join(" ");
        if !run_arguments.is_empty() {
            tracing::info!("Params to run with: {}", run_arguments);
        }

        Ok(Self {
            url,
            output_directory,
            output_file_name,
            run_arguments,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn output_file_name(&self) -> &str {
        &self.output_file_name
    }

    /// Directory and file name combined.
    pub fn output_file(&self) -> PathBuf {
        self.output_directory.join(&self.output_file_name)
    }

    pub fn run_arguments(&self) -> &str {
        &self.run_arguments
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme '{scheme}', expected http or https"),
        }),
    }
}

fn split_output_path(path: &Path) -> Result<(Option<PathBuf>, Option<String>), ConfigError> {
    if path.is_dir() {
        return Ok((Some(path.to_path_buf()), None));
    }

    let invalid = || ConfigError::InvalidPath {
        path: path.to_path_buf(),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(invalid)?;
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => return Err(invalid()),
    };
    if !parent.is_dir() {
        tracing::error!("Invalid file path: {}", path.display());
        return Err(invalid());
    }

    Ok((Some(parent), Some(file_name.to_string())))
}

fn with_trailing_separator(mut directory: PathBuf) -> PathBuf {
    // pushing an empty component appends a separator if there is none
    directory.push("");
    directory
}

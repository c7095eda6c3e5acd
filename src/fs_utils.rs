use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::{io, path::Path};

static FORBIDDEN_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// returns a filename that is safe to use on Windows, Linux and Mac OS
///
/// Forbidden characters (`\ / : * ? " < > | ^ %` and control characters) become '_',
/// leading/trailing whitespace and dots are trimmed and reserved Windows device
/// names get a trailing underscore.
pub fn cleanup_filename(input: &str) -> String {
    let mut result: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' | '^' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();
    result = result
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string();

    let upper_result = result.to_ascii_uppercase();
    if FORBIDDEN_WINDOWS_NAMES
        .iter()
        .any(|&name| name == upper_result)
    {
        result.push('_');
    }

    if result.len() > 255 {
        let mut end = 255;
        while !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }

    result
}

/// File name taken from the last path segment of `url`, percent-decoded and cleaned up.
/// Returns None when the url path ends with a slash or nothing usable is left.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let cleaned = cleanup_filename(&decoded);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Adds execute permission for everyone who can read the file.
#[cfg(unix)]
pub async fn make_executable<P: AsRef<Path>>(path: P) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let path = path.as_ref();
    let mode = tokio::fs::metadata(path).await?.permissions().mode();
    let executable = mode | ((mode & 0o444) >> 2);
    if executable != mode {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(executable)).await?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn make_executable<P: AsRef<Path>>(_path: P) -> io::Result<()> {
    Ok(())
}

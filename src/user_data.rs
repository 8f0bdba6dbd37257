//! User-data resolution for the command-line surface.
//!
//! User-data can be given inline or as a path to a local file. The payload is
//! passed to the control plane unchanged; encoding is the transport's job.
//! Reports never echo the payload itself, only its [`fingerprint`].

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Errors raised while resolving user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when both inline and file sources are provided.
    #[error("user-data cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline payload is empty or only whitespace.
    #[error("user-data must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("user-data file must not be empty")]
    FileEmpty,
    /// Raised when reading the file source fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves user-data from either an inline value or a file.
///
/// Whitespace-only payloads are rejected, but accepted payloads are returned
/// byte for byte, including trailing newlines.
///
/// # Errors
///
/// Returns [`UserDataError`] when the inputs are invalid or the file cannot be
/// read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    if inline.is_some() && file.is_some() {
        return Err(UserDataError::BothProvided);
    }

    if let Some(payload) = inline {
        if payload.trim().is_empty() {
            return Err(UserDataError::InlineEmpty);
        }
        return Ok(Some(payload.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };
    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    if content.trim().is_empty() {
        return Err(UserDataError::FileEmpty);
    }
    Ok(Some(content))
}

/// Lower-case hex SHA-1 digest of a user-data payload.
#[must_use]
pub fn fingerprint(payload: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_ambient(path: &str) -> Result<String, String> {
    let full = Utf8Path::new(path);
    let (dir_path, file_path) = if full.is_absolute() {
        let parent = full
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {full}"))?;
        let file_name = full
            .file_name()
            .ok_or_else(|| format!("path has no file name: {full}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), full)
    };

    let dir = Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

//! Error types shared by the pipeline and its collaborators.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while materialising a share link into the staging directory.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The link could not be reached or did not serve content (not public, gone, ...).
    #[error("could not download {url}: {message}")]
    Transport { url: String, message: String },

    /// The link points at something the downloader cannot materialise.
    #[error("unsupported share link {url}: {reason}")]
    Unsupported { url: String, reason: String },

    /// The payload was received but could not be unpacked.
    #[error("invalid archive from {url}: {message}")]
    Archive { url: String, message: String },

    #[error("I/O error while storing download: {0}")]
    Io(#[from] io::Error),
}

/// Failure of the external conversion tool for a single file.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to launch converter `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("converter exited with {status} for {}: {stderr}", .path.display())]
    Failed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("converter produced no PDF at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Failure reported by the document-hosting API or the identity service.
#[derive(Debug, Error)]
pub enum HostError {
    /// The project identifier supplied at run start was rejected.
    #[error("invalid project identifier: {0}")]
    InvalidProject(String),

    /// Local I/O failure, e.g. reading the file to upload.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
    },
}

impl HostError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }
}

/// Run-level failure. Everything else is isolated per file.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("the current user is not verified")]
    Unverified,

    #[error("could not look up the current user: {0}")]
    Identity(#[source] HostError),

    #[error("fetching files failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("project {0:?} is not a valid project identifier")]
    InvalidProject(String),

    #[error("staging area error: {0}")]
    Staging(#[from] io::Error),
}

impl PipelineError {
    /// Aborts that were already explained to the user through a status message.
    /// The CLI exits successfully for these.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            PipelineError::Unverified | PipelineError::Fetch(_) | PipelineError::InvalidProject(_)
        )
    }
}

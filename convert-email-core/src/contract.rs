#![allow(unused)]

//! # contract: interfaces of the external collaborators
//!
//! The pipeline never talks to the network, the filesystem of the cloud host or
//! the conversion tool directly. It goes through the traits below, which keeps
//! the orchestration testable with `mockall` mocks.
//!
//! ## Collaborators
//! - [`Identity`]: who is running the pipeline and whether they are verified.
//! - [`Downloader`]: materialises a share link into a local directory.
//! - [`Converter`]: turns one EML/MSG file into a sibling PDF.
//! - [`DocumentHost`]: document ingestion, generic file upload and operator notifications.
//! - [`StatusReporter`]: the user-facing status line of the run.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the mocks are exported with the
//!   default `test-export-mocks` feature so integration tests can use them.

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::AccessLevel;
use crate::error::{ConversionError, FetchError, HostError};

/// The authenticated actor, as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub verified: bool,
}

/// Options passed to the conversion tool for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub extract_attachments: bool,
}

/// What a successful conversion left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    /// The PDF written next to the input file.
    pub pdf_path: PathBuf,
    /// Attachment directories written by the tool (empty unless requested).
    pub attachment_dirs: Vec<PathBuf>,
}

/// Request to ingest one converted PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub path: PathBuf,
    pub title: String,
    pub access: AccessLevel,
    pub project_id: Option<String>,
}

/// Identifier of an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentId(pub String);

/// Identifier of a generic uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileId(pub String);

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Identity: Send + Sync {
    async fn current_user(&self) -> Result<User, HostError>;
}

/// Trait for materialising a share link into a local directory.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Populate `destination` with the contents behind `url`.
    /// Unreachable or non-public links fail with [`FetchError::Transport`].
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

/// Trait for the external EML/MSG to PDF conversion tool.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        input: &Path,
        options: &ConvertOptions,
    ) -> Result<ConvertedArtifact, ConversionError>;
}

/// Trait for the document-hosting API.
///
/// Converted PDFs go through [`DocumentHost::upload_document`]; the attachment
/// archive goes through the generic [`DocumentHost::upload_file`] path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentHost: Send + Sync {
    async fn upload_document(&self, upload: &DocumentUpload) -> Result<DocumentId, HostError>;

    async fn upload_file(&self, path: &Path) -> Result<FileId, HostError>;

    /// Operator-facing diagnostics. Callers treat this as fire-and-forget.
    async fn notify(&self, subject: &str, body: &str) -> Result<(), HostError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn set_message(&self, message: &str) -> Result<(), HostError>;
}

/// Borrowed set of collaborators for one run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub identity: &'a dyn Identity,
    pub downloader: &'a dyn Downloader,
    pub converter: &'a dyn Converter,
    pub host: &'a dyn DocumentHost,
    pub status: &'a dyn StatusReporter,
}

impl Collaborators<'_> {
    /// Set the user-facing status. Failures are logged and otherwise ignored.
    pub async fn report(&self, message: &str) {
        tracing::info!(message, "Status update");
        if let Err(e) = self.status.set_message(message).await {
            tracing::warn!(error = ?e, message, "Failed to publish status message");
        }
    }
}

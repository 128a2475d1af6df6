//! High-level pipeline: permission gate → fetch → convert & upload → attachments → report.
//!
//! # Responsibilities
//! - Per-file error isolation: a file that fails to convert or upload is counted
//!   as an error and the batch moves on to the next file.
//! - Only two conditions end a run after the fetch: an invalid project identifier
//!   (user configuration error) and staging-area I/O failures.
//! - The staging area is removed at the end of every run that got past the fetch,
//!   whatever the per-file outcomes were.
//!
//! # Policy for generic API errors
//! An upload rejected for any reason other than an invalid project identifier is
//! logged, counted as an error, and the batch continues.
//!
//! # Navigation
//! - Main entrypoint: [`run`]
//! - Per-run state: [`RunContext`]

use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::attachments;
use crate::config::RunConfig;
use crate::contract::{Collaborators, ConvertOptions, DocumentId, DocumentUpload};
use crate::convert::is_email_file;
use crate::download::fetch_files;
use crate::error::{HostError, PipelineError};
use crate::permissions::check_permissions;
use crate::report::{summary_message, RunReport, RunTally};
use crate::staging::StagingArea;

const CONVERSION_ERROR_SUBJECT: &str = "Runtime Error for Email Conversion";
const INVALID_PROJECT_MESSAGE: &str = "You have provided an incorrect project ID, please try again";

/// State scoped to one run, passed explicitly through every step.
#[derive(Debug)]
pub struct RunContext<'a> {
    pub config: &'a RunConfig,
    pub staging: StagingArea,
    pub tally: RunTally,
    pub skipped: usize,
    pub discovered: usize,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            staging: StagingArea::new(&config.work_dir),
            tally: RunTally::default(),
            skipped: 0,
            discovered: 0,
        }
    }

    fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            extract_attachments: self.config.extract_attachments,
        }
    }
}

/// What happened to a single discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Converted(DocumentId),
    Failed,
}

/// Run the whole pipeline for `config`.
pub async fn run(
    config: &RunConfig,
    collaborators: &Collaborators<'_>,
) -> Result<RunReport, PipelineError> {
    config.trace_loaded();
    info!("Starting email conversion run");

    check_permissions(config, collaborators).await?;

    let mut ctx = RunContext::new(config);
    if let Err(e) = fetch_files(&ctx, collaborators).await {
        error!(error = ?e, "Run aborted while fetching files");
        cleanup(&ctx);
        return Err(e);
    }

    if let Err(e) = process_batch(&mut ctx, collaborators).await {
        error!(error = ?e, "Run aborted during batch processing");
        cleanup(&ctx);
        return Err(e);
    }

    let attachments = attachments::aggregate(&ctx, collaborators).await;

    let message = summary_message(&ctx.tally);
    collaborators.report(&message).await;
    cleanup(&ctx);

    let report = RunReport {
        tally: ctx.tally,
        skipped: ctx.skipped,
        discovered: ctx.discovered,
        attachments,
        message,
    };
    match serde_json::to_string(&report) {
        Ok(json) => debug!(report = %json, "Run report"),
        Err(e) => warn!(error = ?e, "Failed to serialize run report"),
    }
    info!(
        successes = report.tally.successes,
        errors = report.tally.errors,
        skipped = report.skipped,
        "Email conversion run complete"
    );
    Ok(report)
}

/// Convert and upload every discovered file, updating the tally on `ctx`.
///
/// Returns early only for an invalid project identifier or when the staging
/// area cannot be walked.
pub async fn process_batch(
    ctx: &mut RunContext<'_>,
    collaborators: &Collaborators<'_>,
) -> Result<(), PipelineError> {
    let files = ctx.staging.discover()?;
    ctx.discovered = files.len();

    for path in &files {
        let outcome = process_file(ctx, collaborators, path).await?;
        match outcome {
            FileOutcome::Skipped => ctx.skipped += 1,
            FileOutcome::Converted(_) => ctx.tally.successes += 1,
            FileOutcome::Failed => ctx.tally.errors += 1,
        }
    }

    info!(
        discovered = ctx.discovered,
        successes = ctx.tally.successes,
        errors = ctx.tally.errors,
        skipped = ctx.skipped,
        "Batch processed"
    );
    Ok(())
}

/// Convert, upload and collect attachments for one file.
pub async fn process_file(
    ctx: &RunContext<'_>,
    collaborators: &Collaborators<'_>,
    path: &Path,
) -> Result<FileOutcome, PipelineError> {
    if !is_email_file(path) {
        info!(path = %path.display(), "Skipping non-EML/MSG file");
        return Ok(FileOutcome::Skipped);
    }

    collaborators
        .report("Attempting to convert EML/MSG files to PDFs...")
        .await;
    let artifact = match collaborators
        .converter
        .convert(path, &ctx.convert_options())
        .await
    {
        Ok(artifact) => artifact,
        Err(e) => {
            error!(error = ?e, path = %path.display(), "Conversion failed");
            let body = format!(
                "Please forward this to {} \n{}",
                ctx.config.support_contact, e
            );
            if let Err(notify_err) = collaborators
                .host
                .notify(CONVERSION_ERROR_SUBJECT, &body)
                .await
            {
                warn!(error = ?notify_err, "Failed to notify operator about conversion error");
            }
            return Ok(FileOutcome::Failed);
        }
    };

    collaborators.report("Uploading converted file...").await;
    let upload = DocumentUpload {
        path: artifact.pdf_path.clone(),
        title: document_title(path),
        access: ctx.config.access_level,
        project_id: ctx.config.project_id.clone(),
    };
    let outcome = match collaborators.host.upload_document(&upload).await {
        Ok(id) => {
            info!(document_id = %id.0, pdf = %upload.path.display(), "Uploaded converted document");
            FileOutcome::Converted(id)
        }
        Err(HostError::InvalidProject(detail)) => {
            error!(detail = %detail, project_id = ?ctx.config.project_id, "Upload rejected the project identifier");
            collaborators.report(INVALID_PROJECT_MESSAGE).await;
            return Err(PipelineError::InvalidProject(
                ctx.config.project_id.clone().unwrap_or_default(),
            ));
        }
        Err(HostError::Io(e)) => {
            error!(error = ?e, pdf = %upload.path.display(), "OS error while uploading");
            FileOutcome::Failed
        }
        Err(e @ HostError::Api { .. }) => {
            error!(error = %e, pdf = %upload.path.display(), "API error while uploading");
            FileOutcome::Failed
        }
    };

    if ctx.config.extract_attachments && !artifact.attachment_dirs.is_empty() {
        let moved = attachments::collect(&artifact.attachment_dirs, ctx.staging.bundle_dir());
        debug!(moved, path = %path.display(), "Collected attachment directories");
    }

    Ok(outcome)
}

fn document_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn cleanup(ctx: &RunContext<'_>) {
    if let Err(e) = ctx.staging.cleanup() {
        warn!(error = ?e, "Failed to clean up staging area");
    }
}

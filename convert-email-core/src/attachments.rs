//! Attachment bundle: collects per-message attachment directories and ships
//! them as a single archive at the end of the run.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::contract::{Collaborators, FileId};
use crate::pipeline::RunContext;

/// Move each attachment directory into `bundle`. Returns how many were moved.
/// A directory that cannot be moved is logged and left where it is.
pub fn collect(dirs: &[PathBuf], bundle: &Path) -> usize {
    let mut moved = 0;
    for dir in dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let target = free_target(bundle, &name.to_string_lossy());
        match fs::rename(dir, &target) {
            Ok(()) => {
                debug!(from = %dir.display(), to = %target.display(), "Moved attachments into bundle");
                moved += 1;
            }
            Err(e) => {
                error!(error = ?e, from = %dir.display(), to = %target.display(), "Failed to move attachments into bundle");
            }
        }
    }
    moved
}

/// `bundle/name`, or `bundle/name-N` for the first N that is not taken.
fn free_target(bundle: &Path, name: &str) -> PathBuf {
    let candidate = bundle.join(name);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| bundle.join(format!("{name}-{n}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Zip the bundle into `archive_path`. Entry names are prefixed with the bundle
/// directory name. Returns the number of files written.
pub fn archive(bundle: &Path, archive_path: &Path) -> io::Result<usize> {
    fn visit_dir(
        dir: &Path,
        root: &Path,
        zip: &mut ZipWriter<File>,
        options: SimpleFileOptions,
        written: &mut usize,
    ) -> io::Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        for path in entries {
            let name = entry_name(root, &path);
            if path.is_dir() {
                zip.add_directory(format!("{name}/"), options)
                    .map_err(io::Error::other)?;
                visit_dir(&path, root, zip, options, written)?;
            } else if path.is_file() {
                zip.start_file(name, options).map_err(io::Error::other)?;
                let mut src = File::open(&path)?;
                io::copy(&mut src, zip)?;
                *written += 1;
            }
        }
        Ok(())
    }

    let root = bundle.parent().unwrap_or(bundle);
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = 0;
    visit_dir(bundle, root, &mut zip, options, &mut written)?;
    zip.finish().map_err(io::Error::other)?;
    info!(files = written, archive = %archive_path.display(), "Wrote attachment archive");
    Ok(written)
}

fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Archive and upload the bundle when extraction was requested and something
/// was extracted. Upload failures are logged; they never fail the run.
pub async fn aggregate(ctx: &RunContext<'_>, collaborators: &Collaborators<'_>) -> Option<FileId> {
    if !ctx.config.extract_attachments {
        return None;
    }
    let staging = &ctx.staging;
    match staging.bundle_is_empty() {
        Ok(true) => {
            info!("No attachments found");
            return None;
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = ?e, bundle = %staging.bundle_dir().display(), "Failed to inspect attachment bundle");
            return None;
        }
    }

    if let Err(e) = archive(staging.bundle_dir(), staging.archive_path()) {
        error!(error = ?e, archive = %staging.archive_path().display(), "Failed to archive attachments");
        return None;
    }

    match collaborators.host.upload_file(staging.archive_path()).await {
        Ok(id) => {
            info!(file_id = %id.0, "Uploaded attachment archive");
            Some(id)
        }
        Err(e) => {
            warn!(error = ?e, "Attachment archive upload failed");
            None
        }
    }
}

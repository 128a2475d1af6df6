//! Local staging area of a run: downloaded files, attachment bundle and archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = "out";
const BUNDLE_DIR: &str = "attach";
const ARCHIVE_NAME: &str = "attachments.zip";

#[derive(Debug, Clone)]
pub struct StagingArea {
    staging_dir: PathBuf,
    bundle_dir: PathBuf,
    archive_path: PathBuf,
}

impl StagingArea {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            staging_dir: work_dir.join(STAGING_DIR),
            bundle_dir: work_dir.join(BUNDLE_DIR),
            archive_path: work_dir.join(ARCHIVE_NAME),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Create the staging and bundle directories. Existing directories are fine.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.staging_dir)?;
        fs::create_dir_all(&self.bundle_dir)?;
        debug!(
            staging_dir = %self.staging_dir.display(),
            bundle_dir = %self.bundle_dir.display(),
            "Prepared staging area"
        );
        Ok(())
    }

    /// Rename every entry under the staging directory whose name carries
    /// leading or trailing whitespace. Children are renamed before their parent.
    /// Returns the number of renamed entries.
    pub fn normalize_filenames(&self) -> io::Result<usize> {
        fn visit_dir(dir: &Path, renamed: &mut usize) -> io::Result<()> {
            let entries = fs::read_dir(dir)?
                .map(|e| e.map(|e| e.path()))
                .collect::<io::Result<Vec<_>>>()?;
            for path in entries {
                if path.is_dir() {
                    visit_dir(&path, renamed)?;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let trimmed = name.trim();
                if trimmed == name {
                    continue;
                }
                if trimmed.is_empty() {
                    warn!(path = %path.display(), "Name is all whitespace, leaving it untouched");
                    continue;
                }
                let target = path.with_file_name(trimmed);
                if target.exists() {
                    warn!(
                        from = %path.display(),
                        to = %target.display(),
                        "Trimmed name already exists, leaving entry untouched"
                    );
                    continue;
                }
                fs::rename(&path, &target)?;
                debug!(from = %path.display(), to = %target.display(), "Stripped whitespace from name");
                *renamed += 1;
            }
            Ok(())
        }

        let mut renamed = 0;
        visit_dir(&self.staging_dir, &mut renamed)?;
        info!(renamed, "Normalized staged filenames");
        Ok(renamed)
    }

    /// Every regular file under the staging directory, in a stable order.
    pub fn discover(&self) -> io::Result<Vec<PathBuf>> {
        fn visit_dir(dir: &Path, results: &mut Vec<PathBuf>) -> io::Result<()> {
            let mut entries = fs::read_dir(dir)?
                .map(|e| e.map(|e| e.path()))
                .collect::<io::Result<Vec<_>>>()?;
            entries.sort();
            for path in entries {
                if path.is_dir() {
                    visit_dir(&path, results)?;
                } else if path.is_file() {
                    results.push(path);
                }
            }
            Ok(())
        }

        let mut files = Vec::new();
        visit_dir(&self.staging_dir, &mut files)?;
        info!(count = files.len(), staging_dir = %self.staging_dir.display(), "Discovered staged files");
        Ok(files)
    }

    pub fn bundle_is_empty(&self) -> io::Result<bool> {
        match fs::read_dir(&self.bundle_dir) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Remove the staging directory, the bundle and the archive.
    /// Paths that are already gone are not an error.
    pub fn cleanup(&self) -> io::Result<()> {
        for dir in [&self.staging_dir, &self.bundle_dir] {
            match fs::remove_dir_all(dir) {
                Ok(()) => debug!(path = %dir.display(), "Removed directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        match fs::remove_file(&self.archive_path) {
            Ok(()) => debug!(path = %self.archive_path.display(), "Removed archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        info!("Cleaned up staging area");
        Ok(())
    }
}

//! Conversion of EML/MSG files to PDF by shelling out to an external tool.
//!
//! The tool is invoked as `program args... [-a] <file>` and is expected to write
//! `<file stem>.pdf` next to the input, plus one `*attachments*` directory per
//! message when `-a` is given.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{ConvertOptions, ConvertedArtifact, Converter};
use crate::error::ConversionError;

const EMAIL_EXTENSIONS: [&str; 2] = ["eml", "msg"];
const ATTACHMENT_FLAG: &str = "-a";
const ATTACHMENTS_MARKER: &str = "attachments";

/// True when `path` carries an email-message extension (case-insensitive).
pub fn is_email_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.trim().to_ascii_lowercase())
        .is_some_and(|e| EMAIL_EXTENSIONS.contains(&e.as_str()))
}

/// The PDF the tool writes for `input`.
pub fn pdf_path_for(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

/// How to launch the conversion tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ConverterCommand {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            args: vec!["-jar".to_string(), "email.jar".to_string()],
        }
    }
}

/// [`Converter`] backed by an external process.
pub struct CommandConverter {
    command: ConverterCommand,
}

impl CommandConverter {
    pub fn new(command: ConverterCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn convert(
        &self,
        input: &Path,
        options: &ConvertOptions,
    ) -> Result<ConvertedArtifact, ConversionError> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args);
        if options.extract_attachments {
            cmd.arg(ATTACHMENT_FLAG);
        }
        cmd.arg(input);

        info!(
            program = %self.command.program,
            input = %input.display(),
            extract_attachments = options.extract_attachments,
            "Running conversion tool"
        );
        let output = cmd.output().await.map_err(|e| {
            error!(error = ?e, program = %self.command.program, "Failed to launch conversion tool");
            ConversionError::Launch {
                program: self.command.program.clone(),
                source: e,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                input = %input.display(),
                status = %output.status,
                stderr = %stderr,
                "Conversion tool exited with failure"
            );
            return Err(ConversionError::Failed {
                path: input.to_path_buf(),
                status: output.status.to_string(),
                stderr,
            });
        }

        let pdf_path = pdf_path_for(input);
        if !pdf_path.is_file() {
            error!(pdf = %pdf_path.display(), "Conversion tool reported success but wrote no PDF");
            return Err(ConversionError::MissingOutput(pdf_path));
        }

        let attachment_dirs = if options.extract_attachments {
            find_attachment_dirs(input)
        } else {
            Vec::new()
        };
        debug!(
            pdf = %pdf_path.display(),
            attachment_dirs = attachment_dirs.len(),
            "Conversion finished"
        );
        Ok(ConvertedArtifact {
            pdf_path,
            attachment_dirs,
        })
    }
}

/// Directories next to `input` whose name contains "attachments".
fn find_attachment_dirs(input: &Path) -> Vec<PathBuf> {
    let Some(parent) = input.parent() else {
        return Vec::new();
    };
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            error!(error = ?e, dir = %parent.display(), "Failed to scan for attachment directories");
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(ATTACHMENTS_MARKER))
        })
        .collect();
    dirs.sort();
    if dirs.is_empty() {
        info!(input = %input.display(), "No attachments directory found");
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_extensions_match_case_insensitively() {
        assert!(is_email_file(Path::new("/x/mail.eml")));
        assert!(is_email_file(Path::new("/x/MAIL.MSG")));
        assert!(is_email_file(Path::new("/x/Mail.Eml")));
        assert!(!is_email_file(Path::new("/x/notes.txt")));
        assert!(!is_email_file(Path::new("/x/eml")));
        assert!(!is_email_file(Path::new("/x/archive.eml.zip")));
    }

    #[test]
    fn pdf_sits_next_to_input() {
        assert_eq!(
            pdf_path_for(Path::new("/stage/sub/hello.world.eml")),
            PathBuf::from("/stage/sub/hello.world.pdf")
        );
    }

    #[test]
    fn default_command_runs_the_jar() {
        let cmd = ConverterCommand::default();
        assert_eq!(cmd.program, "java");
        assert_eq!(cmd.args, vec!["-jar", "email.jar"]);
    }
}

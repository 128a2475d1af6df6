///
/// This module implements the CLI interface for convert-email: command parsing,
/// config loading and wiring the real collaborators into the core pipeline.
///
/// All pipeline logic lives in the [`convert-email-core`] crate; this module is
/// strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: run the `convert-email` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`convert-email-core`]: ../../convert-email-core/
use crate::load_config::{load_config, Overrides};
use crate::upload::DocumentCloudClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use convert_email_core::contract::Collaborators;
use convert_email_core::convert::CommandConverter;
use convert_email_core::download::HttpDownloader;
use convert_email_core::pipeline;
use std::path::PathBuf;

/// CLI for convert-email: convert shared EML/MSG files to PDF and upload them.
#[derive(Parser)]
#[clap(
    name = "convert-email",
    version,
    about = "Convert EML/MSG files behind a public share link to PDF and upload them to DocumentCloud"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, convert and upload all emails behind the configured share link
    Convert {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Share link to use instead of the one in the config file
        #[clap(long)]
        url: Option<String>,
        /// Project to add every uploaded document to
        #[clap(long)]
        project_id: Option<String>,
        /// Extract attachments and upload them as a single archive
        #[clap(long)]
        attachments: bool,
    },
}

/// Outcome of [`run`] that `main` turns into an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Completed,
    /// The run stopped early after telling the user why.
    Aborted,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<Exit> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert {
            config,
            url,
            project_id,
            attachments,
        } => {
            let overrides = Overrides {
                source_url: url,
                project_id,
                extract_attachments: attachments,
            };
            let config = load_config(config, &overrides)?;
            tracing::info!(command = "convert", "Starting conversion run");

            let client = DocumentCloudClient::new(&config.document_host);
            let downloader = HttpDownloader::new();
            let converter = CommandConverter::new(config.converter.clone());
            let collaborators = Collaborators {
                identity: &client,
                downloader: &downloader,
                converter: &converter,
                host: &client,
                status: &client,
            };

            match pipeline::run(&config.run, &collaborators).await {
                Ok(report) => {
                    tracing::info!(command = "convert", ?report, "Conversion run complete");
                    Ok(Exit::Completed)
                }
                Err(e) if e.is_graceful() => {
                    tracing::warn!(command = "convert", error = %e, "Conversion run stopped early");
                    Ok(Exit::Aborted)
                }
                Err(e) => {
                    tracing::error!(command = "convert", error = %e, "Conversion run failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}

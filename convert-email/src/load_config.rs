/// `load_config` module: loads a static YAML config and injects secrets from the environment.
///
/// This is the only place where untrusted YAML is parsed and mapped to the
/// strongly-typed run configuration of the core crate.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`]
/// - Apply command-line overrides (source URL, project, attachment extraction)
/// - Read the API token from `DOCUMENTCLOUD_TOKEN`
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use convert_email_core::config::RunConfig;
use convert_email_core::convert::ConverterCommand;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

pub const TOKEN_ENV: &str = "DOCUMENTCLOUD_TOKEN";
pub const DEFAULT_API_URL: &str = "https://api.www.documentcloud.org/api/";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    #[serde(default)]
    pub converter: ConverterCommand,
    #[serde(default)]
    pub document_host: DocumentHostSection,
}

#[derive(Debug, Deserialize)]
pub struct DocumentHostSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Add-on run that status messages and the attachment archive belong to.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    /// Filled from the environment, never from the file.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for DocumentHostSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            run_id: None,
            token: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Values given on the command line take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub source_url: Option<String>,
    pub project_id: Option<String>,
    pub extract_attachments: bool,
}

pub fn load_config<P: AsRef<Path>>(path: P, overrides: &Overrides) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Some(url) = &overrides.source_url {
        config.run.source_url = url.clone();
    }
    if let Some(project_id) = &overrides.project_id {
        config.run.project_id = Some(project_id.clone());
    }
    if overrides.extract_attachments {
        config.run.extract_attachments = true;
    }
    if config.run.source_url.trim().is_empty() {
        error!(config_path = ?path_ref, "No source_url configured");
        anyhow::bail!("source_url must not be empty");
    }

    config.document_host.token = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => {
            info!("{TOKEN_ENV} found in env");
            Some(token)
        }
        _ => {
            info!("{TOKEN_ENV} not set, API requests will be anonymous");
            None
        }
    };

    Ok(config)
}

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_VERIFICATION_URL: &str = "https://airtable.com/shrZrgdmuOwW0ZLPM";
pub const DEFAULT_SUPPORT_CONTACT: &str = "info@documentcloud.org";

/// Everything a single run needs, supplied wholesale at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Public share link of the folder or file holding the emails.
    pub source_url: String,
    #[serde(default)]
    pub access_level: AccessLevel,
    /// Project every converted document is added to.
    #[serde(default, deserialize_with = "optional_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub extract_attachments: bool,
    /// Directory under which the staging area is created.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_verification_url")]
    pub verification_url: String,
    #[serde(default = "default_support_contact")]
    pub support_contact: String,
}

/// Project ids are numeric on most hosts; accept them written either way.
fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(text) => text.trim().to_string(),
        Id::Number(n) => n.to_string(),
    }))
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_verification_url() -> String {
    DEFAULT_VERIFICATION_URL.to_string()
}

fn default_support_contact() -> String {
    DEFAULT_SUPPORT_CONTACT.to_string()
}

impl RunConfig {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            access_level: AccessLevel::default(),
            project_id: None,
            extract_attachments: false,
            work_dir: default_work_dir(),
            verification_url: default_verification_url(),
            support_contact: default_support_contact(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            source_url = %self.source_url,
            access_level = %self.access_level,
            project_id = self.project_id.as_deref().unwrap_or("<none>"),
            extract_attachments = self.extract_attachments,
            work_dir = %self.work_dir.display(),
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}

/// Visibility of uploaded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    #[default]
    Private,
    Organization,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Private => "private",
            AccessLevel::Organization => "organization",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

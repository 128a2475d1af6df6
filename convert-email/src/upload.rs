#![doc = "DocumentCloud integration: implements the core collaborator traits against the DocumentCloud REST API."]
//
//! # DocumentCloud client
//!
//! [`DocumentCloudClient`] backs the [`Identity`], [`DocumentHost`] and
//! [`StatusReporter`] traits of `convert-email-core`.
//!
//! - Construct it from the `document_host` section of the config plus the
//!   `DOCUMENTCLOUD_TOKEN` environment variable (see [`crate::load_config`]).
//! - Document uploads create the document, `PUT` the PDF to the returned
//!   presigned URL and then ask the API to process it.
//! - Status messages and the attachment archive belong to an add-on run and are
//!   only sent to the API when a `run_id` is configured.

use async_trait::async_trait;
use convert_email_core::contract::{
    DocumentHost, DocumentId, DocumentUpload, FileId, Identity, StatusReporter, User,
};
use convert_email_core::error::HostError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

use crate::load_config::DocumentHostSection;

pub struct DocumentCloudClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    run_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    verified_journalist: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    id: Value,
    presigned_url: String,
}

#[derive(Debug, Deserialize)]
struct PresignedUpload {
    presigned_url: String,
}

impl DocumentCloudClient {
    pub fn new(section: &DocumentHostSection) -> Self {
        let api_url = if section.api_url.ends_with('/') {
            section.api_url.clone()
        } else {
            format!("{}/", section.api_url)
        };
        tracing::info!(
            api_url = %api_url,
            token_set = section.token.is_some(),
            run_id = ?section.run_id,
            "Initialized DocumentCloudClient"
        );
        Self {
            http: Client::new(),
            api_url,
            token: section.token.clone(),
            run_id: section.run_id,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn run_endpoint(&self) -> Result<String, HostError> {
        self.run_id
            .map(|id| self.endpoint(&format!("addon_runs/{id}/")))
            .ok_or_else(|| HostError::api("no add-on run configured"))
    }

    async fn put_presigned(&self, url: &str, body: Vec<u8>) -> Result<(), HostError> {
        let resp = self
            .http
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await.map(|_| ())
    }
}

fn transport(e: reqwest::Error) -> HostError {
    HostError::Api {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

async fn ensure_success(resp: Response) -> Result<Response, HostError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "DocumentCloud API returned error");
    Err(HostError::Api {
        status: Some(status.as_u16()),
        message: body,
    })
}

/// Map a rejected document creation to the right error. Unknown or malformed
/// project ids come back as a 400 mentioning the projects field.
pub fn classify_document_rejection(status: StatusCode, body: &str) -> HostError {
    let rejects_project = body.contains("Invalid pk")
        || (body.contains("project") && body.contains("Incorrect type"));
    if status == StatusCode::BAD_REQUEST && rejects_project {
        HostError::InvalidProject(body.to_string())
    } else {
        HostError::Api {
            status: Some(status.as_u16()),
            message: body.to_string(),
        }
    }
}

/// The `projects` payload: numeric ids are sent as numbers, anything else verbatim
/// so the API can reject it.
pub fn project_payload(project_id: &str) -> Value {
    match project_id.trim().parse::<i64>() {
        Ok(id) => json!([id]),
        Err(_) => json!([project_id]),
    }
}

#[async_trait]
impl Identity for DocumentCloudClient {
    async fn current_user(&self) -> Result<User, HostError> {
        tracing::info!("Fetching current user");
        let resp = self
            .authed(self.http.get(self.endpoint("users/me/")))
            .send()
            .await
            .map_err(transport)?;
        let me: MeResponse = ensure_success(resp).await?.json().await.map_err(transport)?;
        tracing::info!(
            username = me.username.as_deref().unwrap_or("<unknown>"),
            verified = me.verified_journalist,
            "Fetched current user"
        );
        Ok(User {
            username: me.username.unwrap_or_default(),
            verified: me.verified_journalist,
        })
    }
}

#[async_trait]
impl DocumentHost for DocumentCloudClient {
    async fn upload_document(&self, upload: &DocumentUpload) -> Result<DocumentId, HostError> {
        let content = std::fs::read(&upload.path)?;
        tracing::info!(
            path = %upload.path.display(),
            title = %upload.title,
            access = %upload.access,
            project_id = upload.project_id.as_deref().unwrap_or("<none>"),
            "Uploading document"
        );

        let mut body = json!({
            "title": upload.title,
            "access": upload.access.as_str(),
        });
        if let Some(project_id) = &upload.project_id {
            body["projects"] = project_payload(project_id);
        }
        let resp = self
            .authed(self.http.post(self.endpoint("documents/")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %text, "Document creation rejected");
            return Err(classify_document_rejection(status, &text));
        }
        let created: CreatedDocument = resp.json().await.map_err(transport)?;
        let id = match &created.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        self.put_presigned(&created.presigned_url, content).await?;

        let resp = self
            .authed(self.http.post(self.endpoint(&format!("documents/{id}/process/"))))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await?;

        tracing::info!(document_id = %id, "Document uploaded and submitted for processing");
        Ok(DocumentId(id))
    }

    async fn upload_file(&self, path: &Path) -> Result<FileId, HostError> {
        let run_url = self.run_endpoint()?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HostError::api(format!("not a file: {}", path.display())))?;
        let content = std::fs::read(path)?;
        tracing::info!(file_name = %file_name, bytes = content.len(), "Uploading run file");

        let resp = self
            .authed(self.http.get(&run_url))
            .query(&[("upload_file", file_name.as_str())])
            .send()
            .await
            .map_err(transport)?;
        let presigned: PresignedUpload = ensure_success(resp).await?.json().await.map_err(transport)?;

        self.put_presigned(&presigned.presigned_url, content).await?;

        let resp = self
            .authed(self.http.patch(&run_url))
            .json(&json!({ "file_name": file_name }))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await?;

        tracing::info!(file_name = %file_name, "Run file uploaded");
        Ok(FileId(file_name))
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), HostError> {
        tracing::info!(subject, "Sending operator notification");
        let resp = self
            .authed(self.http.post(self.endpoint("messages/")))
            .json(&json!({ "subject": subject, "content": body }))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await.map(|_| ())
    }
}

#[async_trait]
impl StatusReporter for DocumentCloudClient {
    async fn set_message(&self, message: &str) -> Result<(), HostError> {
        let Ok(run_url) = self.run_endpoint() else {
            tracing::debug!("No add-on run configured, status message not published");
            return Ok(());
        };
        let resp = self
            .authed(self.http.patch(&run_url))
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(api_url: &str, run_id: Option<Uuid>) -> DocumentHostSection {
        DocumentHostSection {
            api_url: api_url.to_string(),
            run_id,
            token: None,
        }
    }

    #[test]
    fn endpoints_are_joined_with_a_single_slash() {
        let client = DocumentCloudClient::new(&section("https://dc.example/api", None));
        assert_eq!(client.endpoint("/documents/"), "https://dc.example/api/documents/");
        assert_eq!(client.endpoint("users/me/"), "https://dc.example/api/users/me/");
    }

    #[test]
    fn run_endpoint_requires_a_run_id() {
        let without = DocumentCloudClient::new(&section("https://dc.example/api/", None));
        assert!(without.run_endpoint().is_err());

        let id = Uuid::new_v4();
        let with = DocumentCloudClient::new(&section("https://dc.example/api/", Some(id)));
        assert_eq!(
            with.run_endpoint().unwrap(),
            format!("https://dc.example/api/addon_runs/{id}/")
        );
    }

    #[tokio::test]
    async fn status_without_a_run_stays_local() {
        // Nothing listens here; a request would fail.
        let client = DocumentCloudClient::new(&section("http://127.0.0.1:9/api/", None));
        assert!(client.set_message("Checking permissions...").await.is_ok());
    }

    #[test]
    fn unknown_project_is_an_invalid_project_error() {
        let body = r#"{"projects":["Invalid pk \"424242\" - object does not exist."]}"#;
        assert!(matches!(
            classify_document_rejection(StatusCode::BAD_REQUEST, body),
            HostError::InvalidProject(_)
        ));

        let body = r#"{"projects":["Incorrect type. Expected pk value, received str."]}"#;
        assert!(matches!(
            classify_document_rejection(StatusCode::BAD_REQUEST, body),
            HostError::InvalidProject(_)
        ));
    }

    #[test]
    fn other_rejections_are_generic_api_errors() {
        let err = classify_document_rejection(StatusCode::BAD_REQUEST, r#"{"title":["too long"]}"#);
        assert!(matches!(err, HostError::Api { status: Some(400), .. }));

        let err = classify_document_rejection(StatusCode::INTERNAL_SERVER_ERROR, "Invalid pk");
        assert!(matches!(err, HostError::Api { status: Some(500), .. }));
    }

    #[test]
    fn numeric_project_ids_are_sent_as_numbers() {
        assert_eq!(project_payload("12345"), json!([12345]));
        assert_eq!(project_payload(" 7 "), json!([7]));
        assert_eq!(project_payload("my-project"), json!(["my-project"]));
    }
}

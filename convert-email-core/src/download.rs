//! Fetching the emails behind a public share link into the staging area.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Url};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};

use crate::contract::{Collaborators, Downloader};
use crate::error::{FetchError, PipelineError};
use crate::pipeline::RunContext;

const FETCH_FAILED_MESSAGE: &str = "There was an issue with downloading emails from the provided URL, please ensure it is public and available.";
const FALLBACK_FILENAME: &str = "download";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Prepare the staging area, download into it and normalize the filenames.
///
/// A transport failure is reported to the user and ends the run gracefully.
/// The caller removes the staging area on any error.
pub async fn fetch_files(
    ctx: &RunContext<'_>,
    collaborators: &Collaborators<'_>,
) -> Result<(), PipelineError> {
    collaborators.report("Retrieving EML/MSG files...").await;
    ctx.staging.prepare()?;

    let url = &ctx.config.source_url;
    if let Err(e) = collaborators
        .downloader
        .fetch(url, ctx.staging.staging_dir())
        .await
    {
        error!(error = ?e, url = %url, "Download failed");
        if matches!(e, FetchError::Transport { .. }) {
            collaborators.report(FETCH_FAILED_MESSAGE).await;
        } else {
            collaborators
                .report(&format!("Could not retrieve files from the provided URL: {e}"))
                .await;
        }
        return Err(PipelineError::Fetch(e));
    }

    let listing: Vec<String> = fs::read_dir(ctx.staging.staging_dir())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    info!(entries = ?listing, "Contents of staging directory after download");

    ctx.staging.normalize_filenames()?;
    Ok(())
}

/// Where a share link actually serves its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLink {
    Direct(String),
    Unsupported(&'static str),
}

/// Rewrite well-known share links into direct-download URLs.
///
/// Anything that is not a Dropbox or Google Drive link, or does not parse as a
/// URL at all, is passed through untouched.
pub fn resolve_share_link(url: &str) -> ResolvedLink {
    let Ok(mut parsed) = Url::parse(url) else {
        return ResolvedLink::Direct(url.to_string());
    };
    match parsed.host_str() {
        Some("drive.google.com") => resolve_drive_link(&parsed)
            .unwrap_or_else(|| ResolvedLink::Direct(url.to_string())),
        Some(host) if host == "dropbox.com" || host.ends_with(".dropbox.com") => {
            force_dropbox_download(&mut parsed);
            ResolvedLink::Direct(parsed.into())
        }
        _ => ResolvedLink::Direct(url.to_string()),
    }
}

fn resolve_drive_link(url: &Url) -> Option<ResolvedLink> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    let id = match segments.as_slice() {
        ["drive", "folders", ..] | ["drive", "u", _, "folders", ..] => {
            return Some(ResolvedLink::Unsupported(
                "Google Drive folders cannot be downloaded directly; share a zip file instead",
            ));
        }
        ["file", "d", id, ..] => id.to_string(),
        ["open"] | ["uc"] => url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())?,
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }

    let mut direct = url.clone();
    direct.set_path("/uc");
    direct.set_fragment(None);
    direct
        .query_pairs_mut()
        .clear()
        .append_pair("export", "download")
        .append_pair("id", &id);
    Some(ResolvedLink::Direct(direct.into()))
}

/// Replace any `dl` parameter with `dl=1`, keeping the rest of the query.
fn force_dropbox_download(url: &mut Url) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "dl")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("dl", "1");
}

static DISPOSITION_EXTENDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#)
        .expect("valid extended filename regex")
});
static DISPOSITION_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("valid filename regex")
});

/// Filename from a `Content-Disposition` header value, if it names one.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = DISPOSITION_EXTENDED
        .captures(value)
        .or_else(|| DISPOSITION_PLAIN.captures(value))
        .map(|c| c[1].trim().to_string())?;
    sanitize_filename(&percent_decode_str(&raw).decode_utf8_lossy())
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?;
    sanitize_filename(&percent_decode_str(last).decode_utf8_lossy())
}

fn sanitize_filename(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|n| !n.trim().is_empty())
}

/// Write a downloaded payload into `destination`: archives are unpacked,
/// anything else is stored as `filename`. Returns the paths written at the top level.
pub fn materialize(
    url: &str,
    payload: &[u8],
    filename: &str,
    destination: &Path,
) -> Result<Vec<PathBuf>, FetchError> {
    fs::create_dir_all(destination)?;
    let is_zip = payload.starts_with(ZIP_MAGIC) || filename.to_ascii_lowercase().ends_with(".zip");
    if !is_zip {
        let path = destination.join(filename);
        fs::write(&path, payload)?;
        debug!(path = %path.display(), bytes = payload.len(), "Stored downloaded file");
        return Ok(vec![path]);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(payload)).map_err(|e| FetchError::Archive {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    archive.extract(destination).map_err(|e| FetchError::Archive {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let mut written: Vec<PathBuf> = fs::read_dir(destination)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    written.sort();
    info!(entries = archive.len(), destination = %destination.display(), "Extracted downloaded archive");
    Ok(written)
}

/// [`Downloader`] for public share links served over HTTP(S).
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        let direct = match resolve_share_link(url) {
            ResolvedLink::Direct(direct) => direct,
            ResolvedLink::Unsupported(reason) => {
                error!(url = %url, reason, "Unsupported share link");
                return Err(FetchError::Unsupported {
                    url: url.to_string(),
                    reason: reason.to_string(),
                });
            }
        };
        info!(url = %url, direct = %direct, "Downloading share link");

        let transport = |message: String| FetchError::Transport {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(&direct)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url = %direct, "Share link returned error status");
            return Err(transport(format!("HTTP {status}")));
        }

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(&direct))
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
        let payload = response
            .bytes()
            .await
            .map_err(|e| transport(e.to_string()))?;
        info!(filename = %filename, bytes = payload.len(), "Downloaded share link payload");

        materialize(url, &payload, &filename, destination)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropbox_links_are_forced_to_download() {
        assert_eq!(
            resolve_share_link("https://www.dropbox.com/sh/abc/xyz?dl=0"),
            ResolvedLink::Direct("https://www.dropbox.com/sh/abc/xyz?dl=1".into())
        );
        assert_eq!(
            resolve_share_link("https://www.dropbox.com/scl/fo/abc?rlkey=k"),
            ResolvedLink::Direct("https://www.dropbox.com/scl/fo/abc?rlkey=k&dl=1".into())
        );
        assert_eq!(
            resolve_share_link("https://www.dropbox.com/s/abc/mail.eml"),
            ResolvedLink::Direct("https://www.dropbox.com/s/abc/mail.eml?dl=1".into())
        );
    }

    #[test]
    fn dropbox_download_flag_lands_before_the_fragment() {
        assert_eq!(
            resolve_share_link("https://www.dropbox.com/s/abc/mail.eml#preview"),
            ResolvedLink::Direct("https://www.dropbox.com/s/abc/mail.eml?dl=1#preview".into())
        );
        assert_eq!(
            resolve_share_link("https://www.dropbox.com/scl/fi/abc/mail.eml?dl=0&rlkey=k#top"),
            ResolvedLink::Direct("https://www.dropbox.com/scl/fi/abc/mail.eml?rlkey=k&dl=1#top".into())
        );
    }

    #[test]
    fn dropbox_lookalike_hosts_are_not_rewritten() {
        assert_eq!(
            resolve_share_link("https://notdropbox.com/s/abc/mail.eml"),
            ResolvedLink::Direct("https://notdropbox.com/s/abc/mail.eml".into())
        );
    }

    #[test]
    fn google_drive_file_links_use_the_download_endpoint() {
        let expected = ResolvedLink::Direct(
            "https://drive.google.com/uc?export=download&id=1AbC-d_E".into(),
        );
        assert_eq!(
            resolve_share_link("https://drive.google.com/file/d/1AbC-d_E/view?usp=sharing"),
            expected
        );
        assert_eq!(
            resolve_share_link("https://drive.google.com/open?id=1AbC-d_E"),
            expected
        );
        assert!(matches!(
            resolve_share_link("https://drive.google.com/drive/folders/1xyz"),
            ResolvedLink::Unsupported(_)
        ));
    }

    #[test]
    fn other_links_pass_through() {
        assert_eq!(
            resolve_share_link("https://example.org/mail.zip"),
            ResolvedLink::Direct("https://example.org/mail.zip".into())
        );
        assert_eq!(
            resolve_share_link("https://drive.google.com/uc?export=download"),
            ResolvedLink::Direct("https://drive.google.com/uc?export=download".into())
        );
        assert_eq!(
            resolve_share_link("not a url"),
            ResolvedLink::Direct("not a url".into())
        );
    }

    #[test]
    fn disposition_filenames_are_extracted_and_sanitized() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="inbox.zip""#).as_deref(),
            Some("inbox.zip")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''re%3A%20hello.eml").as_deref(),
            Some("re: hello.eml")
        );
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn url_filenames_ignore_query_and_trailing_slash() {
        assert_eq!(
            filename_from_url("https://host/a/b/mail%20one.eml?x=1").as_deref(),
            Some("mail one.eml")
        );
        assert_eq!(filename_from_url("https://host/a/folder/").as_deref(), Some("folder"));
        assert_eq!(filename_from_url("https://host"), None);
        assert_eq!(
            filename_from_url("https://host/s/abc/mail.eml?dl=1#preview").as_deref(),
            Some("mail.eml")
        );
        assert_eq!(filename_from_url("not a url"), None);
    }
}

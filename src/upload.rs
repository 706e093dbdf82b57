use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use tracing::info;

use crate::api::VideoPublish;
use crate::data::UploadService;
use crate::validate::ValidationError;

pub const PUBLIC_STORAGE_URL: &str = "https://storage.googleapis.com";

const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoDraft {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Seconds.
    pub duration: Option<f64>,
}

impl VideoDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::Required { field: "video" });
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::Required { field: "title" });
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "description",
            });
        }
        if !self.tags.iter().any(|tag| !tag.trim().is_empty()) {
            return Err(ValidationError::Required { field: "tags" });
        }
        Ok(())
    }

    fn clean_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.iter().map(|tag| tag.trim()) {
            if !tag.is_empty() && !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStage {
    RequestingUrl,
    Uploading { bytes: usize },
    Publishing,
}

const UNKNOWN_TYPE: &str = "application/octet-stream";

/// MIME type from the file contents. The extension is only consulted when
/// the contents are not recognised.
pub fn sniff_content_type(path: &Path, bytes: &[u8]) -> &'static str {
    let sniffed = tree_magic_mini::from_u8(bytes);
    if sniffed != UNKNOWN_TYPE {
        return sniffed;
    }
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => UNKNOWN_TYPE,
    }
}

pub fn public_url(bucket: &str, object: &str) -> String {
    format!(
        "{}/{}/{}",
        PUBLIC_STORAGE_URL,
        bucket,
        utf8_percent_encode(object, OBJECT_NAME)
    )
}

fn object_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".into());
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}-{}", token.to_lowercase(), base)
}

/// Sends a video file to storage through a signed URL, then publishes it.
pub struct Uploader {
    service: Arc<dyn UploadService>,
    bucket: String,
}

impl Uploader {
    pub fn new(service: Arc<dyn UploadService>, bucket: impl Into<String>) -> Self {
        Self {
            service,
            bucket: bucket.into(),
        }
    }

    /// Returns the public URL of the published video.
    pub fn upload(
        &self,
        draft: &VideoDraft,
        user_id: &str,
        mut progress: impl FnMut(UploadStage),
    ) -> Result<String> {
        draft.validate()?;
        let bytes = fs::read(&draft.path)
            .with_context(|| format!("upload: read {}", draft.path.display()))?;
        let content_type = sniff_content_type(&draft.path, &bytes);
        anyhow::ensure!(
            content_type.starts_with("video/"),
            "upload: {} is not a video ({content_type})",
            draft.path.display()
        );

        let object = object_name(&draft.path);
        progress(UploadStage::RequestingUrl);
        let upload_url = self.service.upload_url(&object, content_type)?;

        progress(UploadStage::Uploading { bytes: bytes.len() });
        self.service.put(&upload_url, bytes, content_type)?;

        let url = public_url(&self.bucket, &object);
        progress(UploadStage::Publishing);
        self.service.publish(&VideoPublish {
            url: url.clone(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            tags: draft.clean_tags(),
            duration: draft.duration,
            user_id: user_id.to_string(),
        })?;
        info!(url = %url, "video published");
        Ok(url)
    }
}

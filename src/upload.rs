//! Host file endpoints: multipart upload and the file-serving url.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Url,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FormError, Result, config::UploadConfig, graph::MediaRef};

/// Where the picked file came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadSource {
    #[default]
    Picker,
    Camera,
    Drop,
}

/// A file chosen by the user.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn new(
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            mime: None,
            source: UploadSource::Picker,
        }
    }

    pub fn with_source(
        mut self,
        source: UploadSource,
    ) -> Self {
        self.source = source;
        self
    }
}

/// Body returned by the upload endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub folder_type: String,
}

impl UploadResponse {
    /// The value a filename widget should hold for this file.
    pub fn canonical_name(&self) -> String {
        if self.subfolder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subfolder, self.name)
        }
    }
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Upload one file. No retries; the caller surfaces failures.
    async fn upload(
        &self,
        file: UploadFile,
    ) -> Result<UploadResponse>;
}

/// Multipart POST to the host's upload endpoint.
pub struct HttpUploader {
    client: reqwest::Client,
    url: Url,
}

impl HttpUploader {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let url = join_url(&config.base_url, &config.image_endpoint)?;
        let client = reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build()?;
        Ok(Self {
            client,
            url,
        })
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(
        &self,
        file: UploadFile,
    ) -> Result<UploadResponse> {
        debug!("uploading {} ({} bytes) via {}", file.filename, file.bytes.len(), file.source.as_ref());
        let mut part = Part::bytes(file.bytes).file_name(file.filename);
        if let Some(mime) = &file.mime {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().part("image", part).text("type", "input").text("overwrite", "false");

        let response = self.client.post(self.url.clone()).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FormError::Upload(format!("upload failed with status {}", status)));
        }
        Ok(response.json::<UploadResponse>().await?)
    }
}

/// Builds urls for the host's file-serving endpoint.
#[derive(Debug, Clone)]
pub struct ViewEndpoint {
    url: Url,
}

impl ViewEndpoint {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        Ok(Self {
            url: join_url(&config.base_url, &config.view_endpoint)?,
        })
    }

    pub fn url(
        &self,
        media: &MediaRef,
    ) -> String {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("filename", &media.filename)
            .append_pair("subfolder", &media.subfolder)
            .append_pair("type", &media.folder_type);
        url.to_string()
    }
}

fn join_url(
    base: &str,
    path: &str,
) -> Result<Url> {
    let base = Url::parse(base).map_err(|e| FormError::Config(format!("invalid base url '{}': {}", base, e)))?;
    base.join(path).map_err(|e| FormError::Config(format!("invalid endpoint '{}': {}", path, e)))
}

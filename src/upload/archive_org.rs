//! Internet Archive implementation of [`RemoteStore`]
//!
//! - upload: `PUT {s3}/{identifier}/{name}` (S3-like API, `LOW key:secret` auth)
//! - listing: `GET {api}/metadata/{identifier}`, `files[].name`
//! - derive: `POST {api}/services/tasks.php` with `cmd = derive.php`

use super::{RemoteStore, UploadMetadata};
use crate::config::UploadConfig;
use crate::utils::error::UploadError;
use crate::utils::format_bytes;
use crate::utils::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

/// Maximum response body kept in error messages
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    name: String,
}

/// Internet Archive client
pub struct InternetArchiveStore {
    client: Client,
    s3_endpoint: Url,
    api_endpoint: Url,
    access_key: Option<String>,
    secret_key: Option<String>,
    retry: RetryConfig,
}

impl InternetArchiveStore {
    /// Create a client from the upload configuration
    ///
    /// # Errors
    ///
    /// `UploadError::Decode` for an unparsable endpoint, `UploadError::Http`
    /// if the HTTP client cannot be created.
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let store = Self::with_endpoints(
            &config.s3_endpoint,
            &config.api_endpoint,
            config.access_key.clone(),
            config.secret_key.clone(),
        )?;
        Ok(store.with_retry(RetryConfig::new(config.max_retries)))
    }

    pub fn with_endpoints(
        s3_endpoint: &str,
        api_endpoint: &str,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            s3_endpoint: parse_endpoint(s3_endpoint)?,
            api_endpoint: parse_endpoint(api_endpoint)?,
            access_key,
            secret_key,
            retry: RetryConfig::new(2),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn authorization(&self) -> Result<HeaderValue, UploadError> {
        match (&self.access_key, &self.secret_key) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                HeaderValue::from_str(&format!("LOW {key}:{secret}"))
                    .map_err(|_| UploadError::MissingCredentials)
            }
            _ => Err(UploadError::MissingCredentials),
        }
    }

    /// `base` with the given path segments appended, each percent-encoded
    fn endpoint_url<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn upload_headers(
        &self,
        metadata: &UploadMetadata,
        length: u64,
    ) -> Result<HeaderMap, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.authorization()?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(
            HeaderName::from_static("x-amz-auto-make-bucket"),
            HeaderValue::from_static("1"),
        );
        headers.insert(
            HeaderName::from_static("x-archive-queue-derive"),
            HeaderValue::from_static("0"),
        );
        headers.insert(
            HeaderName::from_static("x-archive-meta-collection"),
            meta_header_value(&metadata.collection),
        );
        headers.insert(
            HeaderName::from_static("x-archive-meta-mediatype"),
            meta_header_value(&metadata.mediatype),
        );
        headers.insert(
            HeaderName::from_static("x-archive-meta-uploader"),
            meta_header_value(&metadata.uploader),
        );
        Ok(headers)
    }

    async fn put_once(
        &self,
        url: &Url,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<(), UploadError> {
        let io_error = |source: std::io::Error| UploadError::Io {
            path: local_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(local_path).await.map_err(io_error)?;
        let length = file.metadata().await.map_err(io_error)?.len();
        let headers = self.upload_headers(metadata, length)?;

        debug!(url = %url, size = %format_bytes(length), "PUT artifact");
        let response = self
            .client
            .put(url.clone())
            .headers(headers)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        check_status(response).await.map(|_| ())
    }

    async fn get_metadata(&self, item_identifier: &str) -> Result<MetadataResponse, UploadError> {
        let url = Self::endpoint_url(&self.api_endpoint, ["metadata", item_identifier]);
        let response = check_status(self.client.get(url).send().await?).await?;
        response
            .json::<MetadataResponse>()
            .await
            .map_err(|e| UploadError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for InternetArchiveStore {
    async fn upload(
        &self,
        item_identifier: &str,
        remote_name: &str,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<(), UploadError> {
        let segments = std::iter::once(item_identifier).chain(remote_name.split('/'));
        let url = Self::endpoint_url(&self.s3_endpoint, segments);

        info!(item = item_identifier, name = remote_name, "Uploading to Internet Archive");
        with_retry_if(
            &self.retry,
            || self.put_once(&url, local_path, metadata),
            UploadError::is_recoverable,
        )
        .await?;
        info!(item = item_identifier, name = remote_name, "Successfully uploaded");
        Ok(())
    }

    async fn list_names(
        &self,
        item_identifier: &str,
        prefix: &str,
    ) -> Result<BTreeSet<String>, UploadError> {
        let metadata = with_retry_if(
            &self.retry,
            || self.get_metadata(item_identifier),
            UploadError::is_recoverable,
        )
        .await?;

        Ok(metadata
            .files
            .into_iter()
            .map(|file| file.name)
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    async fn submit_derive(&self, item_identifier: &str) -> Result<(), UploadError> {
        let url = Self::endpoint_url(&self.api_endpoint, ["services", "tasks.php"]);
        let body = serde_json::json!({
            "identifier": item_identifier,
            "cmd": "derive.php",
            "args": {},
        });

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.authorization()?)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        info!(item = item_identifier, "Derive task submitted");
        Ok(())
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, UploadError> {
    Url::parse(raw).map_err(|e| UploadError::Decode(format!("invalid endpoint {raw}: {e}")))
}

async fn check_status(response: Response) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Status {
        status: status.as_u16(),
        body: crate::utils::truncate_text(body.trim(), MAX_ERROR_BODY),
    })
}

/// Metadata header value; non-ASCII values use the `uri(...)` escape form
fn meta_header_value(value: &str) -> HeaderValue {
    let printable = value.bytes().all(|b| (0x20..0x7f).contains(&b));
    if printable {
        if let Ok(header) = HeaderValue::from_str(value) {
            return header;
        }
    }

    let mut encoded = String::from("uri(");
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded.push(')');
    HeaderValue::from_str(&encoded).unwrap_or_else(|_| HeaderValue::from_static(""))
}

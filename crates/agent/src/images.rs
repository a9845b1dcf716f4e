//! Fetches booking images and encodes them for the vision model.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use haulquote_core::estimator::ImageLoadError;
use haulquote_core::{EncodedImage, ImageLoader};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::ClientError;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

/// Downloads `http(s)` URLs. Anything else is read from disk only when it resolves
/// inside `local_root`.
pub struct HttpImageLoader {
    client: Client,
    local_root: Option<PathBuf>,
}

impl HttpImageLoader {
    pub fn new(
        download_timeout: Duration,
        local_root: Option<PathBuf>,
    ) -> Result<Self, ClientError> {
        Ok(Self { client: Client::builder().timeout(download_timeout).build()?, local_root })
    }

    async fn read_local(&self, url: &str) -> Result<Vec<u8>, ImageLoadError> {
        let Some(root) = &self.local_root else {
            return Err(ImageLoadError::Read(format!(
                "{url}: only http(s) image URLs are allowed without images.local_root"
            )));
        };
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|error| ImageLoadError::Read(format!("{}: {error}", root.display())))?;

        let candidate = url.strip_prefix("file://").unwrap_or(url);
        let path = tokio::fs::canonicalize(root.join(candidate))
            .await
            .map_err(|error| ImageLoadError::Read(format!("{url}: {error}")))?;
        if !path.starts_with(&root) {
            return Err(ImageLoadError::Read(format!("{url}: resolves outside images.local_root")));
        }

        tokio::fs::read(&path)
            .await
            .map_err(|error| ImageLoadError::Read(format!("{url}: {error}")))
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), ImageLoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ImageLoadError::Download(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Download(format!("image host returned {status}")));
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| value.starts_with("image/"));
        let bytes = response
            .bytes()
            .await
            .map_err(|error| ImageLoadError::Download(error.to_string()))?;
        Ok((bytes.to_vec(), header_type))
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<EncodedImage, ImageLoadError> {
        let (bytes, header_type) = if is_remote(url) {
            self.download(url).await?
        } else {
            (self.read_local(url).await?, None)
        };

        if bytes.is_empty() {
            return Err(ImageLoadError::Read(format!("{url}: image is empty")));
        }

        let media_type = header_type.unwrap_or_else(|| media_type_for(url).to_string());
        debug!(url = %url, bytes = bytes.len(), media_type = %media_type, "loaded booking image");
        Ok(EncodedImage { media_type, data_base64: STANDARD.encode(&bytes) })
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Media type guessed from the file extension, ignoring any query string.
pub fn media_type_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = Path::new(path)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => FALLBACK_MEDIA_TYPE,
    }
}

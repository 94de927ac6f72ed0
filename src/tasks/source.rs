//! Image sources feeding the rotation controller.
//!
//! [`RemoteImageSource`] asks an Unsplash-compatible random-image endpoint for a
//! fresh record on every call. [`FixedImageSource`] cycles through a fixed list
//! and never touches the network, which keeps development and tests away from
//! the API's rate limits.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::config::{FixedSourceConfig, ImageSize, RemoteSourceConfig, SourceConfig};
use crate::error::RotationError;
use crate::events::ImageRecord;

/// Produces the next candidate image.
pub trait ImageSource: Send + Sync {
    fn next_image(&self) -> impl Future<Output = Result<ImageRecord, RotationError>> + Send;
}

/// The subset of an Unsplash photo object the gallery cares about.
#[derive(Debug, Deserialize)]
struct RandomPhoto {
    id: Option<String>,
    description: Option<String>,
    alt_description: Option<String>,
    #[serde(default)]
    urls: BTreeMap<String, String>,
}

/// Parse a random-photo response body into a record.
///
/// A body that is not JSON at all is a fetch failure; well-formed JSON that
/// lacks an id or the requested display URL is a decode failure.
pub fn parse_random_photo(body: &[u8], size: ImageSize) -> Result<ImageRecord, RotationError> {
    let photo: RandomPhoto = serde_json::from_slice(body)
        .map_err(|e| RotationError::Fetch(format!("malformed JSON body: {e}")))?;
    let id = photo
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RotationError::decode("response is missing an id"))?;
    let url = photo
        .urls
        .get(size.as_key())
        .filter(|url| !url.is_empty())
        .cloned()
        .ok_or_else(|| {
            RotationError::Decode(format!("photo {id} has no `{}` url", size.as_key()))
        })?;
    let description = photo
        .description
        .or(photo.alt_description)
        .filter(|d| !d.trim().is_empty());
    Ok(ImageRecord {
        id,
        url,
        description,
    })
}

pub struct RemoteImageSource {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    size: ImageSize,
    query: BTreeMap<String, String>,
}

impl RemoteImageSource {
    pub fn new(cfg: &RemoteSourceConfig) -> Result<Self, RotationError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| RotationError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            client_id: cfg.client_id.clone().unwrap_or_default(),
            size: cfg.size,
            query: cfg.query.clone(),
        })
    }
}

impl ImageSource for RemoteImageSource {
    async fn next_image(&self) -> Result<ImageRecord, RotationError> {
        trace!(endpoint = %self.endpoint, "requesting random image");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("client_id", self.client_id.as_str())])
            .query(&self.query)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    is_timeout = e.is_timeout(),
                    "random image request failed"
                );
                RotationError::Fetch(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "random image endpoint returned error status");
            return Err(RotationError::Fetch(format!("HTTP {status} from {}", self.endpoint)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RotationError::Fetch(format!("failed to read response: {e}")))?;
        let record = parse_random_photo(&body, self.size)?;
        debug!(id = %record.id, url = %record.url, "random image record received");
        Ok(record)
    }
}

/// Deterministic source cycling through a fixed list.
pub struct FixedImageSource {
    images: Vec<ImageRecord>,
    next: AtomicUsize,
}

impl FixedImageSource {
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self {
            images,
            next: AtomicUsize::new(0),
        }
    }

    fn advance(&self) -> Option<usize> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .ok()
    }
}

impl ImageSource for FixedImageSource {
    async fn next_image(&self) -> Result<ImageRecord, RotationError> {
        let idx = self
            .advance()
            .ok_or_else(|| RotationError::decode("fixed image list is empty"))?;
        Ok(self.images[idx].clone())
    }
}

/// Source selected by configuration.
pub enum ConfiguredSource {
    Remote(RemoteImageSource),
    Fixed(FixedImageSource),
}

impl ConfiguredSource {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, RotationError> {
        Ok(match cfg {
            SourceConfig::Remote(remote) => Self::Remote(RemoteImageSource::new(remote)?),
            SourceConfig::Fixed(FixedSourceConfig { images }) => {
                Self::Fixed(FixedImageSource::new(images.clone()))
            }
        })
    }
}

impl ImageSource for ConfiguredSource {
    async fn next_image(&self) -> Result<ImageRecord, RotationError> {
        match self {
            Self::Remote(source) => source.next_image().await,
            Self::Fixed(source) => source.next_image().await,
        }
    }
}

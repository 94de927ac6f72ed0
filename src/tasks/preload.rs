use std::future::Future;
use std::io::Cursor;

use tracing::{debug, warn};

use crate::config::PreloadConfig;
use crate::error::RotationError;
use crate::events::{ImageRecord, PreparedImage};

/// Makes an image ready for display before it becomes current.
pub trait Preloader: Send + Sync {
    fn preload(
        &self,
        record: ImageRecord,
    ) -> impl Future<Output = Result<PreparedImage, RotationError>> + Send;
}

// Decodes to RGBA8, downscaling when a bound is configured so that huge
// originals do not pin hundreds of megabytes per displayed image.
fn decode_rgba8(
    bytes: &[u8],
    max_dimension: Option<u32>,
) -> Result<image::RgbaImage, image::ImageError> {
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    let img = match max_dimension {
        Some(max) if img.width() > max || img.height() > max => img.thumbnail(max, max),
        _ => img,
    };
    Ok(img.to_rgba8())
}

/// Downloads the display URL (`http(s)://` or `file://`) and decodes it fully.
///
/// Every failure to load the image, including the download itself, is a
/// [`RotationError::Decode`].
pub struct HttpPreloader {
    http: reqwest::Client,
    max_dimension: Option<u32>,
}

impl HttpPreloader {
    pub fn new(cfg: &PreloadConfig) -> Result<Self, RotationError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| RotationError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            max_dimension: cfg.max_dimension,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RotationError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| RotationError::Decode(format!("invalid display url {url}: {e}")))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| RotationError::Decode(format!("invalid file url {url}")))?;
            return tokio::fs::read(&path).await.map_err(|e| {
                RotationError::Decode(format!("failed to read {}: {e}", path.display()))
            });
        }

        let response = self.http.get(parsed).send().await.map_err(|e| {
            warn!(url, error = %e, is_timeout = e.is_timeout(), "image download failed");
            RotationError::Decode(format!("request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RotationError::Decode(format!("HTTP {status} from {url}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RotationError::Decode(format!("failed to read image body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl Preloader for HttpPreloader {
    async fn preload(&self, record: ImageRecord) -> Result<PreparedImage, RotationError> {
        let bytes = self.download(&record.url).await?;
        let downloaded = bytes.len();
        let max_dimension = self.max_dimension;
        let rgba = tokio::task::spawn_blocking(move || decode_rgba8(&bytes, max_dimension))
            .await
            .map_err(|e| RotationError::Decode(format!("decode task failed: {e}")))?
            .map_err(|e| RotationError::Decode(format!("{} is not a decodable image: {e}", record.id)))?;

        let (width, height) = rgba.dimensions();
        debug!(id = %record.id, downloaded, width, height, "preloaded image");
        Ok(PreparedImage {
            record,
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::events::ImageRecord;
use crate::tasks::rotation::RotationTiming;

pub const DEFAULT_RANDOM_IMAGE_ENDPOINT: &str = "https://api.unsplash.com/photos/random";

/// Environment variable consulted when `source.client-id` is not set.
pub const CLIENT_ID_ENV: &str = "UNSPLASH_CLIENT_ID";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// How long an image stays up before the next one may replace it.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    /// Delay between a transition and the start of the next fetch cycle.
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,
    /// Number of discrete progress steps per rotation interval.
    pub progress_steps: u32,
    /// Where image records come from.
    pub source: SourceConfig,
    /// Download/decode controls for the preloader.
    pub preload: PreloadConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.validated_with(|key| std::env::var(key).ok())
    }

    fn validated_with(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        ensure!(
            !self.rotation_interval.is_zero(),
            "rotation-interval must be greater than zero"
        );
        ensure!(
            self.progress_steps > 0,
            "progress-steps must be greater than zero"
        );
        ensure!(
            !(self.rotation_interval / self.progress_steps).is_zero(),
            "rotation-interval is too short for {} progress steps",
            self.progress_steps
        );
        match &mut self.source {
            SourceConfig::Remote(remote) => remote
                .resolve(env)
                .context("invalid remote source configuration")?,
            SourceConfig::Fixed(fixed) => fixed
                .validate()
                .context("invalid fixed source configuration")?,
        }
        self.preload
            .validate()
            .context("invalid preload configuration")?;
        Ok(self)
    }

    pub fn timing(&self) -> RotationTiming {
        RotationTiming {
            interval: self.rotation_interval,
            pacing_delay: self.pacing_delay,
            progress_steps: self.progress_steps,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(30),
            pacing_delay: Duration::from_millis(500),
            progress_steps: 100,
            source: SourceConfig::default(),
            preload: PreloadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Remote(RemoteSourceConfig),
    Fixed(FixedSourceConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Remote(RemoteSourceConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RemoteSourceConfig {
    /// Random-image endpoint.
    pub endpoint: String,
    /// Unsplash access key, sent as the `client_id` query parameter.
    pub client_id: Option<String>,
    /// Which entry of the `urls` object is used as the display URL.
    pub size: ImageSize,
    /// Extra query parameters (`orientation`, `query`, `collections`, ...).
    pub query: BTreeMap<String, String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl RemoteSourceConfig {
    fn resolve(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        reqwest::Url::parse(&self.endpoint)
            .with_context(|| format!("endpoint is not a valid URL: {}", self.endpoint))?;
        if self.client_id.as_deref().is_none_or(str::is_empty) {
            self.client_id = env(CLIENT_ID_ENV);
        }
        ensure!(
            self.client_id.as_deref().is_some_and(|id| !id.is_empty()),
            "client-id must be set (or provide {CLIENT_ID_ENV})"
        );
        ensure!(!self.timeout.is_zero(), "timeout must be greater than zero");
        Ok(())
    }
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RANDOM_IMAGE_ENDPOINT.to_string(),
            client_id: None,
            size: ImageSize::default(),
            query: BTreeMap::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSize {
    Raw,
    #[default]
    Full,
    Regular,
    Small,
    Thumb,
}

impl ImageSize {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Full => "full",
            Self::Regular => "regular",
            Self::Small => "small",
            Self::Thumb => "thumb",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FixedSourceConfig {
    pub images: Vec<ImageRecord>,
}

impl FixedSourceConfig {
    fn validate(&self) -> Result<()> {
        ensure!(!self.images.is_empty(), "images must not be empty");
        let mut ids = HashSet::new();
        for image in &self.images {
            ensure!(!image.id.is_empty(), "image id must not be empty");
            ensure!(
                !image.url.is_empty(),
                "image {} must have a display url",
                image.id
            );
            ensure!(ids.insert(image.id.as_str()), "duplicate image id {}", image.id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreloadConfig {
    /// Upper bound on a single image download.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Downscale decoded images so neither side exceeds this many pixels.
    pub max_dimension: Option<u32>,
}

impl PreloadConfig {
    fn validate(&self) -> Result<()> {
        ensure!(!self.timeout.is_zero(), "timeout must be greater than zero");
        if let Some(max) = self.max_dimension {
            ensure!(max > 0, "max-dimension must be greater than zero");
        }
        Ok(())
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_dimension: None,
        }
    }
}

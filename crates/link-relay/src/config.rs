use anyhow::{Context, Result, ensure};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_BITLY_API_BASE: &str = "https://api-ssl.bitly.com";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Directory holding the pre-built gallery bundle.
    pub build_dir: PathBuf,
    pub bitly_api_base: String,
    /// `None` when unset or empty; `/image_link` then refuses to call Bitly.
    pub bitly_api_token: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            bitly_api_base: DEFAULT_BITLY_API_BASE.to_string(),
            bitly_api_token: None,
        }
    }
}

impl RelayConfig {
    pub fn validated(mut self) -> Result<Self> {
        self.bitly_api_token = self
            .bitly_api_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let base = self.bitly_api_base.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base)
            .with_context(|| format!("bitly api base is not a valid URL: {base}"))?;
        ensure!(
            matches!(parsed.scheme(), "http" | "https"),
            "bitly api base must be http(s), got {}",
            parsed.scheme()
        );
        self.bitly_api_base = base;
        Ok(self)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn index_path(&self) -> PathBuf {
        self.build_dir.join("index.html")
    }
}

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Construction-time options for a [`crate::client::Registry`].
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Raw image reference, e.g. `busybox` or `ghcr.io/owner/app:1.0`.
    pub image: String,
    /// Directory blobs are written into. Must exist and be writable.
    pub save_dir: PathBuf,
    /// Credentials for the token endpoint. Basic auth is attached during
    /// the challenge exchange only when both are set and non-empty.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Explicit proxy URL; environment proxies apply when unset.
    pub proxy: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Talk plain HTTP to the registry instead of HTTPS.
    pub use_http: bool,
    /// Upper bound on concurrent layer downloads. 0 means the default.
    pub max_concurrent_layers: usize,
}

/// Defaults the binary layers underneath its CLI arguments: an optional
/// `imgpull` config file in the working directory, overridden by
/// `IMGPULL_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppDefaults {
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
    pub save_dir: Option<PathBuf>,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("imgpull").required(false))
            .add_source(Environment::with_prefix("IMGPULL"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

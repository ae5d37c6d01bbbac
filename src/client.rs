use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{StatusCode, header};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::digest::OciDigest;
use crate::error::{RegistryError, Result};
use crate::image_reference::ImageReference;
use crate::models::{
    BearerToken, Descriptor, ImageManifest, ImageManifestList, MANIFEST_LIST_MEDIA_TYPE,
    MANIFEST_MEDIA_TYPE,
};
use crate::progress::{ProgressFn, PullEvent};

const DEFAULT_LAYER_CONCURRENCY: usize = 3;

// Blob bodies can be large; the connect timeout is kept short while the
// overall request timeout leaves room for a full layer transfer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A pull client bound to one image reference and one save directory.
///
/// The bearer credential lives behind a lock and is replaced wholesale on
/// every successful challenge exchange, so concurrent blob downloads never
/// observe a torn token.
pub struct Registry {
    http: reqwest::Client,
    reference: ImageReference,
    scheme: &'static str,
    save_dir: PathBuf,
    username: Option<String>,
    password: Option<String>,
    token: RwLock<Option<BearerToken>>,
    max_concurrent_layers: usize,
    progress: Option<ProgressFn>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let reference: ImageReference = config.image.parse()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            reference,
            scheme: if config.use_http { "http" } else { "https" },
            save_dir: config.save_dir,
            username: config.username,
            password: config.password,
            token: RwLock::new(None),
            max_concurrent_layers: if config.max_concurrent_layers == 0 {
                DEFAULT_LAYER_CONCURRENCY
            } else {
                config.max_concurrent_layers
            },
            progress: None,
        })
    }

    /// Install a progress callback; see [`PullEvent`].
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn save_dir(&self) -> &std::path::Path {
        &self.save_dir
    }

    /// Fetch the whole image: resolve the platform manifest, then download
    /// the config blob and every layer blob into the save directory.
    ///
    /// Registries that serve a single-arch image answer the manifest-list
    /// request with a plain manifest body; that decode failure falls back
    /// to fetching the manifest by tag directly.
    pub async fn pull(&self) -> Result<PathBuf> {
        let manifest = match self.resolve_architecture().await {
            Ok(digest) => self.get_manifest(&digest.to_string()).await?,
            Err(RegistryError::Decode(err)) => {
                debug!(error = %err, "no manifest list served, falling back to tag");
                self.get_manifest("").await?
            }
            Err(err) => return Err(err),
        };

        self.emit(|| PullEvent::ManifestResolved {
            reference: self.reference.to_string(),
            layers: manifest.layers.len(),
        });

        let config_path = self.get_config(&manifest).await?;
        self.get_layers(&manifest.layers).await?;

        self.emit(|| PullEvent::Complete {
            config_path: config_path.clone(),
        });
        Ok(config_path)
    }

    /// Resolve the manifest digest matching `linux` and the running
    /// architecture from the registry's manifest list.
    pub async fn resolve_architecture(&self) -> Result<OciDigest> {
        let url = self.manifest_url(&self.reference.tag);
        let response = self.do_get(&url, MANIFEST_LIST_MEDIA_TYPE).await?;
        let body = response.bytes().await?;
        let list: ImageManifestList = serde_json::from_slice(&body)?;

        let architecture = host_architecture();
        select_platform_digest(&list, "linux", architecture)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedArchitecture {
                os: "linux".to_string(),
                architecture: architecture.to_string(),
            })
    }

    /// Fetch a manifest by tag or digest. An empty reference defaults to
    /// the parsed image tag.
    pub async fn get_manifest(&self, reference: &str) -> Result<ImageManifest> {
        let reference = if reference.is_empty() {
            self.reference.tag.as_str()
        } else {
            reference
        };
        let url = self.manifest_url(reference);
        info!(%url, "fetching manifest");

        let response = self.do_get(&url, MANIFEST_MEDIA_TYPE).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Download the image config blob to `<digest hex>.json` in the save
    /// directory and return the file path.
    ///
    /// A write failure mid-stream leaves the partial file on disk.
    pub async fn get_config(&self, manifest: &ImageManifest) -> Result<PathBuf> {
        let path = self
            .save_dir
            .join(format!("{}.json", manifest.config.digest.hex()));
        let out = File::create(&path).map_err(|source| RegistryError::Io {
            op: "create config file",
            source,
        })?;

        self.stream_blob(&manifest.config, out).await?;
        Ok(path)
    }

    /// Download all layer blobs, at most `max_concurrent_layers` at a
    /// time. The first failure aborts the remaining downloads; files
    /// already written stay on disk.
    pub async fn get_layers(&self, layers: &[Descriptor]) -> Result<()> {
        let mut downloads = futures::stream::iter(layers.iter().map(|layer| self.fetch_layer(layer)))
            .buffer_unordered(self.max_concurrent_layers);
        while downloads.try_next().await?.is_some() {}
        Ok(())
    }

    async fn fetch_layer(&self, layer: &Descriptor) -> Result<()> {
        let suffix = layer_file_suffix(&layer.media_type);
        let path = self
            .save_dir
            .join(format!("{}.{}", layer.digest.hex(), suffix));
        debug!(path = %path.display(), "downloading layer");

        let out = File::create(&path).map_err(|source| RegistryError::Io {
            op: "create layer file",
            source,
        })?;
        self.stream_blob(layer, out).await
    }

    /// Stream one blob body into `out` chunk by chunk, reporting progress.
    async fn stream_blob(&self, descriptor: &Descriptor, out: impl Write) -> Result<()> {
        let url = self.blob_url(&descriptor.digest);
        let response = self.do_get(&url, &descriptor.media_type).await?;

        self.emit(|| PullEvent::BlobStarted {
            digest: descriptor.digest.to_string(),
            total: descriptor.size,
        });

        stream_to_output(response.bytes_stream(), out, |transferred| {
            self.emit(|| PullEvent::BlobProgress {
                digest: descriptor.digest.to_string(),
                transferred,
            });
        })
        .await?;

        self.emit(|| PullEvent::BlobFinished {
            digest: descriptor.digest.to_string(),
        });
        Ok(())
    }

    /// Authenticated GET with a two-attempt policy: a first 401 triggers
    /// exactly one challenge exchange and one retry; any other non-200
    /// status, on either attempt, is terminal.
    async fn do_get(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        let first = self.try_get(url, accept).await?;
        if first.status() == StatusCode::OK {
            return Ok(first);
        }
        if first.status() != StatusCode::UNAUTHORIZED {
            return Err(RegistryError::HttpStatus(first.status()));
        }

        let challenge = first
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RegistryError::Auth("missing WWW-Authenticate header".to_string()))?
            .to_string();
        self.exchange_token(&challenge).await?;

        let second = self.try_get(url, accept).await?;
        if second.status() != StatusCode::OK {
            return Err(RegistryError::HttpStatus(second.status()));
        }
        Ok(second)
    }

    /// One GET carrying the current bearer token, which may be empty.
    async fn try_get(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        let bearer = {
            let token = self.token.read().await;
            token.as_ref().map(|t| t.bearer().to_string()).unwrap_or_default()
        };

        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .header(header::ACCEPT, accept)
            .send()
            .await?;
        Ok(response)
    }

    /// Turn a `WWW-Authenticate` challenge into a fresh bearer credential.
    async fn exchange_token(&self, challenge: &str) -> Result<()> {
        let endpoint = token_endpoint(challenge)?;
        debug!(%endpoint, "requesting bearer token");

        let mut request = self.http.get(&endpoint);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            if !username.is_empty() && !password.is_empty() {
                request = request.basic_auth(username, Some(password));
            }
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::Auth(format!(
                "token endpoint answered {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        let token: BearerToken = serde_json::from_slice(&body)?;

        // Wholesale replacement; the previous credential is discarded.
        *self.token.write().await = Some(token);
        Ok(())
    }

    fn manifest_url(&self, reference: &str) -> String {
        format!(
            "{}://{}/v2/{}/{}/manifests/{}",
            self.scheme, self.reference.host, self.reference.namespace, self.reference.image,
            reference
        )
    }

    fn blob_url(&self, digest: &OciDigest) -> String {
        format!(
            "{}://{}/v2/{}/{}/blobs/{}",
            self.scheme, self.reference.host, self.reference.namespace, self.reference.image,
            digest
        )
    }

    fn emit(&self, event: impl FnOnce() -> PullEvent) {
        if let Some(progress) = &self.progress {
            progress(event());
        }
    }
}

/// Drain a response body into `out` without buffering the whole blob,
/// reporting the running byte count after each chunk.
async fn stream_to_output(
    mut stream: impl Stream<Item = reqwest::Result<Bytes>> + Unpin,
    mut out: impl Write,
    mut report: impl FnMut(u64),
) -> Result<()> {
    let mut transferred = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).map_err(|source| RegistryError::Io {
            op: "write blob file",
            source,
        })?;
        transferred += chunk.len() as u64;
        report(transferred);
    }
    Ok(())
}

/// Derive the token endpoint URL from a bearer challenge.
///
/// The pairs are read positionally: the first pair's unquoted value is the
/// base URL and every following pair becomes a `key=value` query
/// parameter. A pair without `=` fails the whole challenge.
fn token_endpoint(challenge: &str) -> Result<String> {
    let pairs = challenge
        .strip_prefix("Bearer ")
        .ok_or_else(|| RegistryError::ChallengeParse(challenge.to_string()))?;

    let mut endpoint = String::new();
    for (index, pair) in pairs.split(',').enumerate() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| RegistryError::ChallengeParse(pair.to_string()))?;
        let value = value.trim_matches('"');
        if index == 0 {
            endpoint.push_str(value);
            endpoint.push('?');
        } else {
            if index > 1 {
                endpoint.push('&');
            }
            endpoint.push_str(key);
            endpoint.push('=');
            endpoint.push_str(value);
        }
    }
    Ok(endpoint)
}

/// Local file suffix for a layer, from the last dot-separated component of
/// its media type.
fn layer_file_suffix(media_type: &str) -> &'static str {
    match media_type.rsplit('.').next() {
        Some("gzip") => "tar.gz",
        Some("zstd") => "tar.zst",
        _ => "tar",
    }
}

/// The running architecture in registry platform naming.
fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// First manifest-list entry matching the wanted platform, in list order.
fn select_platform_digest<'a>(
    list: &'a ImageManifestList,
    os: &str,
    architecture: &str,
) -> Option<&'a OciDigest> {
    list.manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|p| p.os == os && p.architecture == architecture)
        })
        .map(|entry| &entry.digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_becomes_token_endpoint_url() {
        let challenge = r#"Bearer realm="https://auth.example/token",service="registry.example",scope="repo:library/busybox:pull""#;
        let endpoint = token_endpoint(challenge).unwrap();
        assert_eq!(
            endpoint,
            "https://auth.example/token?service=registry.example&scope=repo:library/busybox:pull"
        );
    }

    #[test]
    fn challenge_with_realm_only_keeps_empty_query() {
        let endpoint = token_endpoint(r#"Bearer realm="https://auth.example/token""#).unwrap();
        assert_eq!(endpoint, "https://auth.example/token?");
    }

    #[test]
    fn challenge_pair_without_equals_is_rejected() {
        let result = token_endpoint(r#"Bearer realm="https://auth.example/token",garbage"#);
        assert!(matches!(result, Err(RegistryError::ChallengeParse(_))));
    }

    #[test]
    fn challenge_without_bearer_scheme_is_rejected() {
        let result = token_endpoint(r#"Basic realm="https://auth.example/token""#);
        assert!(matches!(result, Err(RegistryError::ChallengeParse(_))));
    }

    #[test]
    fn layer_suffix_follows_compression() {
        assert_eq!(
            layer_file_suffix("application/vnd.docker.image.rootfs.diff.tar.gzip"),
            "tar.gz"
        );
        assert_eq!(
            layer_file_suffix("application/vnd.oci.image.layer.v1.tar+zstd.zstd"),
            "tar.zst"
        );
        assert_eq!(
            layer_file_suffix("application/vnd.oci.image.layer.v1.tar"),
            "tar"
        );
    }

    fn platform_list() -> ImageManifestList {
        serde_json::from_str(
            r#"{
                "schemaVersion": 2,
                "manifests": [
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "digest": "sha256:aa11",
                        "size": 528,
                        "platform": { "architecture": "amd64", "os": "linux" }
                    },
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "digest": "sha256:bb22",
                        "size": 528,
                        "platform": { "architecture": "arm64", "os": "linux" }
                    },
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "digest": "sha256:cc33",
                        "size": 528,
                        "platform": { "architecture": "amd64", "os": "windows" }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn selects_first_matching_platform() {
        let list = platform_list();
        let digest = select_platform_digest(&list, "linux", "amd64").unwrap();
        assert_eq!(digest.hex(), "aa11");
        let digest = select_platform_digest(&list, "linux", "arm64").unwrap();
        assert_eq!(digest.hex(), "bb22");
    }

    #[test]
    fn missing_platform_selects_nothing() {
        let list = platform_list();
        assert!(select_platform_digest(&list, "linux", "s390x").is_none());
    }
}

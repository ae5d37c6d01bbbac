use serde::{Deserialize, Serialize};

use crate::digest::OciDigest;

/// Accept value selecting a multi-arch manifest list.
pub const MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Accept value selecting a single-platform manifest.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Content-addressed pointer to a blob: digest, media type and size.
///
/// Manifest-list entries carry an additional `platform` describing which
/// OS/architecture the referenced manifest is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: OciDigest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A single-platform image manifest: the config blob plus the ordered
/// layer blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// A multi-arch index mapping platforms to manifest digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifestList {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: String,
    pub manifests: Vec<Descriptor>,
}

/// Bearer credential issued by a registry token endpoint.
///
/// Endpoints answer with `token`, `access_token` or both; the whole value
/// is replaced on every successful challenge and never merged with a
/// previous one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BearerToken {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub issued_at: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl BearerToken {
    /// The string placed after `Bearer ` in the Authorization header.
    pub fn bearer(&self) -> &str {
        self.access_token
            .as_deref()
            .or(self.token.as_deref())
            .unwrap_or_default()
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_REGISTRY_HOST: &str = "index.docker.io";
pub const DEFAULT_NAMESPACE: &str = "library";
pub const DEFAULT_TAG: &str = "latest";

/// Error type for image reference parsing
#[derive(Debug, Error)]
pub enum ImageReferenceError {
    #[error("invalid reference format: {0}")]
    InvalidFormat(String),
}

/// A parsed image reference: registry host, repository namespace, image
/// name and tag.
///
/// Parsing is purely positional over `/`-separated segments; the first
/// segment of a three-or-more-segment name is taken as the host without
/// inspecting its content. A private single-level repository such as
/// `myregistry/image` therefore parses as a Docker Hub namespace, not a
/// host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub host: String,
    pub namespace: String,
    pub image: String,
    pub tag: String,
}

impl FromStr for ImageReference {
    type Err = ImageReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ImageReferenceError::InvalidFormat(s.to_string()));
        }
        // The name must form a valid authority + path once a scheme is
        // prefixed, since every segment ends up in a request URL.
        if reqwest::Url::parse(&format!("http://{}", s)).is_err() {
            return Err(ImageReferenceError::InvalidFormat(s.to_string()));
        }

        let segments: Vec<&str> = s.split('/').collect();

        let last = segments[segments.len() - 1];
        let (image, tag) = match last.split_once(':') {
            Some((image, tag)) => (image.to_string(), tag.to_string()),
            None => (last.to_string(), DEFAULT_TAG.to_string()),
        };
        if image.is_empty() {
            return Err(ImageReferenceError::InvalidFormat(s.to_string()));
        }

        let (host, namespace) = match segments.len() {
            1 => (DEFAULT_REGISTRY_HOST.to_string(), DEFAULT_NAMESPACE.to_string()),
            2 => (DEFAULT_REGISTRY_HOST.to_string(), segments[0].to_string()),
            n => (segments[0].to_string(), segments[1..n - 1].join("/")),
        };

        Ok(ImageReference {
            host,
            namespace,
            image,
            tag,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.host, self.namespace, self.image, self.tag
        )
    }
}

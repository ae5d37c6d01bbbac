use reqwest::StatusCode;
use thiserror::Error;

use crate::digest::DigestError;
use crate::image_reference::ImageReferenceError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidReference(#[from] ImageReferenceError),

    #[error(transparent)]
    InvalidDigest(#[from] DigestError),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("malformed authentication challenge: {0}")]
    ChallengeParse(String),

    #[error("HTTP error: {0}")]
    HttpStatus(StatusCode),

    #[error("no manifest for {os}/{architecture} in manifest list")]
    UnsupportedArchitecture { os: String, architecture: String },

    #[error("malformed registry response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<config::ConfigError> for RegistryError {
    fn from(err: config::ConfigError) -> Self {
        RegistryError::Config(err.to_string())
    }
}

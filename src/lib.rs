pub mod client;
pub mod config;
pub mod digest;
pub mod error;
pub mod image_reference;
pub mod models;
pub mod progress;

// Re-export the main client types for convenience
pub use client::Registry;
pub use config::{AppDefaults, RegistryConfig};
pub use digest::OciDigest;
pub use error::{RegistryError, Result};
pub use image_reference::ImageReference;
pub use models::{BearerToken, Descriptor, ImageManifest, ImageManifestList, Platform};
pub use progress::{ProgressFn, PullEvent};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error type for content digest parsing
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("invalid digest format: {0}")]
    InvalidFormat(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// A content-addressed blob identifier of the form `sha256:<hex>`.
///
/// The hex part doubles as the stem of the local file a blob is saved
/// under, so it is kept separate from the algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciDigest {
    algorithm: String,
    hex: String,
}

impl OciDigest {
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The hex part, without the `sha256:` prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for OciDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for OciDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, hex)) = s.split_once(':') else {
            return Err(DigestError::InvalidFormat(s.to_string()));
        };

        if algorithm != "sha256" {
            return Err(DigestError::UnsupportedAlgorithm(algorithm.to_string()));
        }

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }

        Ok(OciDigest {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl serde::Serialize for OciDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for OciDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        OciDigest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sha256_digest() {
        let digest = OciDigest::from_str("sha256:abcd1234").unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.hex(), "abcd1234");
        assert_eq!(digest.to_string(), "sha256:abcd1234");
    }

    #[test]
    fn hex_part_names_the_output_file() {
        let digest = OciDigest::from_str("sha256:abcd1234").unwrap();
        assert_eq!(format!("{}.json", digest.hex()), "abcd1234.json");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(OciDigest::from_str("abcd1234").is_err());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(matches!(
            OciDigest::from_str("md5:abcd1234"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn rejects_non_hex_characters() {
        assert!(OciDigest::from_str("sha256:zzzz").is_err());
        assert!(OciDigest::from_str("sha256:").is_err());
    }
}

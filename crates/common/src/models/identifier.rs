//! Canonical paper identifiers
//!
//! Three input forms are accepted: a bare OpenAlex key (`W2741809807`), a
//! bare DOI (`10.1038/nature12373`) or an already qualified URL. All of them
//! normalize to exactly one URL form; normalizing that form again is a no-op.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that marks a bare DOI
pub const DOI_PREFIX: &str = "10.";

/// URL form of DOI identifiers
pub const DOI_URL_PREFIX: &str = "https://doi.org/";

/// URL form of native OpenAlex identifiers
pub const NATIVE_URL_PREFIX: &str = "https://openalex.org/";

/// Canonical identifier used as the graph key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaperId(String);

impl PaperId {
    /// Normalize any accepted input form
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidIdentifier {
                input: input.to_string(),
            });
        }

        let canonical = if trimmed.starts_with(DOI_PREFIX) {
            format!("{}{}", DOI_URL_PREFIX, trimmed)
        } else if trimmed.starts_with(NATIVE_URL_PREFIX) || trimmed.starts_with(DOI_URL_PREFIX) {
            trimmed.to_string()
        } else {
            format!("{}{}", NATIVE_URL_PREFIX, trimmed)
        };

        // A bare prefix carries no key
        if canonical == NATIVE_URL_PREFIX || canonical == DOI_URL_PREFIX {
            return Err(AppError::InvalidIdentifier {
                input: input.to_string(),
            });
        }

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names a DOI rather than a native record
    pub fn is_doi(&self) -> bool {
        self.0.starts_with(DOI_URL_PREFIX)
    }

    /// Key without the URL prefix (`W123` or `10.1000/x`)
    pub fn native_key(&self) -> &str {
        self.0
            .strip_prefix(NATIVE_URL_PREFIX)
            .or_else(|| self.0.strip_prefix(DOI_URL_PREFIX))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaperId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaperId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PaperId> for String {
    fn from(id: PaperId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_doi() {
        let id = PaperId::parse("10.1000/test").unwrap();
        assert_eq!(id.as_str(), "https://doi.org/10.1000/test");
        assert!(id.is_doi());
        assert_eq!(id.native_key(), "10.1000/test");
    }

    #[test]
    fn test_bare_native_key() {
        let id = PaperId::parse("W1234567890").unwrap();
        assert_eq!(id.as_str(), "https://openalex.org/W1234567890");
        assert!(!id.is_doi());
        assert_eq!(id.native_key(), "W1234567890");
    }

    #[test]
    fn test_full_url_unchanged() {
        let id = PaperId::parse("https://openalex.org/W1234567890").unwrap();
        assert_eq!(id.as_str(), "https://openalex.org/W1234567890");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for input in ["W42", "10.5555/abc", "https://openalex.org/W7", "https://doi.org/10.1/x", "  W9  "] {
            let once = PaperId::parse(input).unwrap();
            let twice = PaperId::parse(once.as_str()).unwrap();
            assert_eq!(once, twice, "input {input:?}");
        }
    }

    #[test]
    fn test_invalid_inputs() {
        for input in ["", "   ", "\t\n", "https://openalex.org/"] {
            let err = PaperId::parse(input).unwrap_err();
            assert!(matches!(err, AppError::InvalidIdentifier { .. }), "input {input:?}");
        }
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let id: PaperId = serde_json::from_str("\"W5\"").unwrap();
        assert_eq!(id.as_str(), "https://openalex.org/W5");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"https://openalex.org/W5\"");
        assert!(serde_json::from_str::<PaperId>("\"  \"").is_err());
    }
}

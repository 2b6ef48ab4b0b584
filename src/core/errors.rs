//! PDU-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PduError>;

/// Top-level error type for the PDF unlock core.
#[derive(Debug, Error)]
pub enum PduError {
    #[error("[PDU-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PDU-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PDU-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PDU-2001] invalid document: {details}")]
    InvalidDocument { details: String },

    #[error("[PDU-2002] invalid identifier: {details}")]
    InvalidIdentifier { details: String },

    #[error("[PDU-2003] source unavailable for {url}: {details}")]
    SourceUnavailable { url: String, details: String },

    #[error("[PDU-3001] artifact not found: {id}")]
    NotFound { id: String },

    #[error("[PDU-3002] artifact expired: {id}")]
    Gone { id: String },

    #[error("[PDU-4001] strategy {strategy} failed: {details}")]
    StrategyFailed {
        strategy: &'static str,
        details: String,
    },

    #[error("[PDU-4002] unlock pipeline exhausted after {attempts} strategies: {details}")]
    PipelineExhausted { attempts: usize, details: String },

    #[error("[PDU-5001] IO failure at {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PDU-5002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl PduError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PDU-1001",
            Self::MissingConfig { .. } => "PDU-1002",
            Self::ConfigParse { .. } => "PDU-1003",
            Self::InvalidDocument { .. } => "PDU-2001",
            Self::InvalidIdentifier { .. } => "PDU-2002",
            Self::SourceUnavailable { .. } => "PDU-2003",
            Self::NotFound { .. } => "PDU-3001",
            Self::Gone { .. } => "PDU-3002",
            Self::StrategyFailed { .. } => "PDU-4001",
            Self::PipelineExhausted { .. } => "PDU-4002",
            Self::StoreIo { .. } => "PDU-5001",
            Self::Serialization { .. } => "PDU-5002",
        }
    }

    /// Whether this failure is surfaced to the caller as-is.
    ///
    /// Individual strategy failures are internal: they are logged in the
    /// audit trail and superseded by the next cascade tier.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::InvalidDocument { .. }
                | Self::InvalidIdentifier { .. }
                | Self::SourceUnavailable { .. }
                | Self::NotFound { .. }
                | Self::Gone { .. }
                | Self::PipelineExhausted { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for PduError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PduError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<PduError> {
        vec![
            PduError::InvalidConfig {
                details: String::new(),
            },
            PduError::MissingConfig {
                path: PathBuf::new(),
            },
            PduError::ConfigParse {
                context: "",
                details: String::new(),
            },
            PduError::InvalidDocument {
                details: String::new(),
            },
            PduError::InvalidIdentifier {
                details: String::new(),
            },
            PduError::SourceUnavailable {
                url: String::new(),
                details: String::new(),
            },
            PduError::NotFound { id: String::new() },
            PduError::Gone { id: String::new() },
            PduError::StrategyFailed {
                strategy: "",
                details: String::new(),
            },
            PduError::PipelineExhausted {
                attempts: 0,
                details: String::new(),
            },
            PduError::StoreIo {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            PduError::Serialization {
                context: "",
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(PduError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_pdu_prefix() {
        for err in &all_variants() {
            assert!(
                err.code().starts_with("PDU-"),
                "code {} must start with PDU-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = PduError::InvalidDocument {
            details: "missing %PDF header".to_string(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("PDU-2001"),
            "display should contain error code: {msg}"
        );
        assert!(
            msg.contains("missing %PDF header"),
            "display should contain details: {msg}"
        );
    }

    #[test]
    fn user_visible_matches_error_contract() {
        // Surfaced to the caller.
        assert!(
            PduError::InvalidDocument {
                details: String::new()
            }
            .is_user_visible()
        );
        assert!(
            PduError::InvalidIdentifier {
                details: String::new()
            }
            .is_user_visible()
        );
        assert!(
            PduError::SourceUnavailable {
                url: String::new(),
                details: String::new()
            }
            .is_user_visible()
        );
        assert!(
            PduError::PipelineExhausted {
                attempts: 9,
                details: String::new()
            }
            .is_user_visible()
        );
        assert!(PduError::Gone { id: String::new() }.is_user_visible());

        // Internal only.
        assert!(
            !PduError::StrategyFailed {
                strategy: "qpdf-decrypt",
                details: String::new()
            }
            .is_user_visible()
        );
        assert!(
            !PduError::StoreIo {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            }
            .is_user_visible()
        );
        assert!(
            !PduError::InvalidConfig {
                details: String::new()
            }
            .is_user_visible()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = PduError::io(
            "/tmp/test.pdf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "PDU-5001");
        assert!(err.to_string().contains("/tmp/test.pdf"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PduError = json_err.into();
        assert_eq!(err.code(), "PDU-5002");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: PduError = toml_err.into();
        assert_eq!(err.code(), "PDU-1003");
    }
}

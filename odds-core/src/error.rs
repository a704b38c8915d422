//! Stable, string-serialized error taxonomies (spec §4.B, §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a [`crate::normalize`] implementation. Never a silent
/// null — every dropped market carries one of these (spec §4.B).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "PascalCase")]
pub enum MappingError {
    #[error("unknown market id '{0}'")]
    UnknownMarket(String),
    #[error("unknown parameterized market id '{0}'")]
    UnknownParamMarket(String),
    #[error("market unsupported on platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("no outcome mapping matched for market '{0}'")]
    NoMatchingOutcomes(String),
    #[error("invalid specifier string '{0}'")]
    InvalidSpecifier(String),
    #[error("invalid odds value {0}")]
    InvalidOddsValue(f64),
    #[error("key '{0}' does not match the expected format")]
    InvalidKeyFormat(String),
    #[error("unsupported sport id {0}")]
    UnsupportedSport(i64),
}

impl MappingError {
    pub fn type_name(&self) -> &'static str {
        match self {
            MappingError::UnknownMarket(_) => "UnknownMarket",
            MappingError::UnknownParamMarket(_) => "UnknownParamMarket",
            MappingError::UnsupportedPlatform(_) => "UnsupportedPlatform",
            MappingError::NoMatchingOutcomes(_) => "NoMatchingOutcomes",
            MappingError::InvalidSpecifier(_) => "InvalidSpecifier",
            MappingError::InvalidOddsValue(_) => "InvalidOddsValue",
            MappingError::InvalidKeyFormat(_) => "InvalidKeyFormat",
            MappingError::UnsupportedSport(_) => "UnsupportedSport",
        }
    }
}

/// Top-level scrape error taxonomy (spec §7). Transport errors are retried
/// by the scraping client before ever reaching this type; everything here
/// is terminal for the unit of work it names (market / event / platform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeErrorType {
    Network,
    Timeout,
    RateLimit,
    Parse,
    InvalidResponse,
    Mapping,
    Storage,
    UnhealthyUpstream,
    DeadlineExceeded,
}

impl ScrapeErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeErrorType::Network => "network",
            ScrapeErrorType::Timeout => "timeout",
            ScrapeErrorType::RateLimit => "rate_limit",
            ScrapeErrorType::Parse => "parse",
            ScrapeErrorType::InvalidResponse => "invalid_response",
            ScrapeErrorType::Mapping => "mapping",
            ScrapeErrorType::Storage => "storage",
            ScrapeErrorType::UnhealthyUpstream => "unhealthy_upstream",
            ScrapeErrorType::DeadlineExceeded => "deadline_exceeded",
        }
    }

    /// Transport errors recovered locally via retry (spec §4.C).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeErrorType::Network | ScrapeErrorType::RateLimit)
    }
}

impl From<&MappingError> for ScrapeErrorType {
    fn from(_: &MappingError) -> Self {
        ScrapeErrorType::Mapping
    }
}

/// The caller-facing problem document every REST request returns on
/// failure (spec §7 User-visible surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDocument {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub recoverable: bool,
}

/// Truncate an error message to the 1000-char bound used for
/// [`crate::model`]'s `ScrapeError.message` column (spec §4.I).
pub fn truncate_message(message: &str) -> String {
    const MAX_LEN: usize = 1000;
    if message.chars().count() <= MAX_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_LEN).collect()
    }
}

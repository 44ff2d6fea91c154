//! Failure classification by error-message keywords.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "not_found_error")]
    NotFound,
    #[serde(rename = "permission_error")]
    Permission,
    #[serde(rename = "dependency_error")]
    Dependency,
    #[serde(rename = "malformed_data_error")]
    MalformedData,
    #[serde(rename = "connection_error")]
    Connection,
    #[serde(rename = "resource_exhaustion_error")]
    ResourceExhaustion,
    #[serde(rename = "unknown_error")]
    Unknown,
}

/// Keyword table in match order; the first category with a hit wins.
const KEYWORDS: &[(FailureCategory, &[&str])] = &[
    (FailureCategory::Timeout, &["timeout", "timed out", "time out"]),
    (
        FailureCategory::NotFound,
        &["file not found", "no such file", "file does not exist"],
    ),
    (
        FailureCategory::Permission,
        &["permission denied", "access denied", "not authorized"],
    ),
    (
        FailureCategory::Dependency,
        &[
            "module not found",
            "no module named",
            "import error",
            "missing dependency",
        ],
    ),
    (
        FailureCategory::MalformedData,
        &["json decode", "invalid json", "expecting value"],
    ),
    (
        FailureCategory::Connection,
        &["connection refused", "connection error", "network error"],
    ),
    (
        FailureCategory::ResourceExhaustion,
        &[
            "memory error",
            "out of memory",
            "memory exhausted",
            "resource unavailable",
        ],
    ),
];

impl FailureCategory {
    pub const ALL: [FailureCategory; 8] = [
        FailureCategory::Timeout,
        FailureCategory::NotFound,
        FailureCategory::Permission,
        FailureCategory::Dependency,
        FailureCategory::MalformedData,
        FailureCategory::Connection,
        FailureCategory::ResourceExhaustion,
        FailureCategory::Unknown,
    ];

    /// Classify an error message, case-insensitively.
    pub fn classify(message: &str) -> FailureCategory {
        let lowered = message.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(FailureCategory::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Timeout => "timeout_error",
            FailureCategory::NotFound => "not_found_error",
            FailureCategory::Permission => "permission_error",
            FailureCategory::Dependency => "dependency_error",
            FailureCategory::MalformedData => "malformed_data_error",
            FailureCategory::Connection => "connection_error",
            FailureCategory::ResourceExhaustion => "resource_exhaustion_error",
            FailureCategory::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCategory {
    type Err = String;

    /// Accepts `timeout_error` as well as the short form `timeout`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FailureCategory::ALL
            .into_iter()
            .find(|c| {
                let name = c.as_str();
                name == wanted || name.strip_suffix("_error") == Some(wanted.as_str())
            })
            .ok_or_else(|| format!("unknown failure category: {}", s))
    }
}

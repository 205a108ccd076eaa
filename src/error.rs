//! Error types for vidresolve

use thiserror::Error;

/// Failure reported by the transport collaborator.
///
/// Kept opaque to the pipeline: it is propagated to callers unchanged.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },
}

impl TransportError {
    /// Build a transport error from a reqwest failure
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = error.status() {
            TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Request { .. } | TransportError::Timeout { .. } => true,
        }
    }

    /// URL the failed request targeted
    pub fn url(&self) -> &str {
        match self {
            TransportError::Status { url, .. }
            | TransportError::Request { url, .. }
            | TransportError::Timeout { url } => url,
        }
    }
}

/// Main error type for resolution operations
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid video ID: {0}")]
    InvalidVideoId(String),

    #[error("Invalid playlist ID: {0}")]
    InvalidPlaylistId(String),

    #[error("Video {video_id} is unplayable (code {code:?}): {reason}")]
    VideoUnplayable {
        video_id: String,
        code: Option<u32>,
        reason: String,
    },

    #[error("Video {video_id} is blocked in this region: {reason}")]
    RegionBlocked { video_id: String, reason: String },

    #[error("Video {video_id} requires purchase")]
    RequiresPurchase {
        video_id: String,
        preview_video_id: Option<String>,
    },

    #[error("No streams available for video {video_id} ({dropped} descriptors dropped)")]
    NoStreamsAvailable {
        video_id: String,
        dropped: usize,
        cause: Option<Box<ResolveError>>,
    },

    #[error("Cipher program not found in player {version}")]
    CipherProgramNotFound { version: String },

    #[error("Unrecognized cipher operation in player {version}: {fragment}")]
    CipherOperationUnrecognized { version: String, fragment: String },

    #[error("Malformed {field} entry: {detail}")]
    MalformedEntry { field: &'static str, detail: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Shorthand for a field-level malformation
    pub fn malformed(field: &'static str, detail: impl Into<String>) -> Self {
        ResolveError::MalformedEntry {
            field,
            detail: detail.into(),
        }
    }

    /// The video does not exist, was removed, or is private
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::VideoUnplayable { .. })
    }

    /// The video exists but access to it is restricted
    pub fn is_restriction(&self) -> bool {
        matches!(
            self,
            ResolveError::RegionBlocked { .. } | ResolveError::RequiresPurchase { .. }
        )
    }

    /// The host changed its player script and extraction needs updating
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            ResolveError::CipherProgramNotFound { .. }
                | ResolveError::CipherOperationUnrecognized { .. }
        )
    }

    /// Check if error came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResolveError::Cancelled)
    }
}

impl From<regex::Error> for ResolveError {
    fn from(error: regex::Error) -> Self {
        ResolveError::Parse(format!("regex: {}", error))
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(error: serde_json::Error) -> Self {
        ResolveError::Parse(format!("json: {}", error))
    }
}

impl From<url::ParseError> for ResolveError {
    fn from(error: url::ParseError) -> Self {
        ResolveError::Parse(format!("url: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_retryable() {
        let server_error = TransportError::Status {
            status: 503,
            url: "https://example.com".to_string(),
        };
        let not_found = TransportError::Status {
            status: 404,
            url: "https://example.com".to_string(),
        };
        let timeout = TransportError::Timeout {
            url: "https://example.com".to_string(),
        };

        assert!(server_error.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(timeout.is_retryable());
        assert_eq!(not_found.url(), "https://example.com");
    }

    #[test]
    fn test_error_classification() {
        let missing = ResolveError::VideoUnplayable {
            video_id: "qld9w0b-1ao".to_string(),
            code: Some(100),
            reason: "This video does not exist.".to_string(),
        };
        let blocked = ResolveError::RegionBlocked {
            video_id: "abc".to_string(),
            reason: "Not available in your country".to_string(),
        };
        let changed = ResolveError::CipherProgramNotFound {
            version: "vflXYZ".to_string(),
        };

        assert!(missing.is_not_found());
        assert!(!missing.is_restriction());
        assert!(blocked.is_restriction());
        assert!(changed.is_extraction_failure());
        assert!(ResolveError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_transport_error_converts() {
        let error: ResolveError = TransportError::Timeout {
            url: "https://example.com/watch".to_string(),
        }
        .into();
        assert!(matches!(error, ResolveError::Transport(_)));
        assert!(error.to_string().contains("timed out"));
    }
}

// ABOUTME: Error types for the SERP extraction engine including ErrorCode enum and SerpError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Error codes representing the categories of failures a batch can surface.
///
/// Resolution-local failures (missing elements, malformed embedded JSON, bad
/// URLs inside a field) never become errors; they resolve to the field fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Ssrf,
    Blocked,
    Schema,
    Extract,
}

impl ErrorCode {
    /// Stable snake_case name used in serialized batch entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::Fetch => "fetch",
            ErrorCode::Ssrf => "ssrf",
            ErrorCode::Blocked => "blocked",
            ErrorCode::Schema => "schema",
            ErrorCode::Extract => "extract",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Ssrf => "SSRF blocked",
            ErrorCode::Blocked => "no meaningful content",
            ErrorCode::Schema => "schema error",
            ErrorCode::Extract => "extraction error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for fetch, load and batch operations.
///
/// `target` is whatever the operation was acting on: a query, a URL or a
/// schema name.
#[derive(Debug, thiserror::Error)]
pub struct SerpError {
    pub code: ErrorCode,
    pub target: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for SerpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serp: {} {}: {}", self.op, self.target, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl SerpError {
    fn new(
        code: ErrorCode,
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            target: target.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidUrl, target, op, source)
    }

    /// Create a Fetch error.
    pub fn fetch(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Fetch, target, op, source)
    }

    /// Create an SSRF error.
    pub fn ssrf(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Ssrf, target, op, source)
    }

    /// Create a Blocked error: the page was fetched but carried no content.
    pub fn blocked(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Blocked, target, op, source)
    }

    /// Create a Schema error.
    pub fn schema(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Schema, target, op, source)
    }

    /// Create an Extract error.
    pub fn extract(
        target: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Extract, target, op, source)
    }

    /// The innermost message, without the op/target prefix.
    pub fn message(&self) -> String {
        match self.source {
            Some(ref src) => src.to_string(),
            None => self.code.to_string(),
        }
    }

    /// Returns true if this is an SSRF error.
    pub fn is_ssrf(&self) -> bool {
        self.code == ErrorCode::Ssrf
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is a Blocked error.
    pub fn is_blocked(&self) -> bool {
        self.code == ErrorCode::Blocked
    }

    /// Returns true if this is a Schema error.
    pub fn is_schema(&self) -> bool {
        self.code == ErrorCode::Schema
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_op_target_and_source() {
        let err = SerpError::fetch(
            "rust async",
            "Fetch",
            Some(anyhow::anyhow!("HTTP error! status: 429")),
        );
        assert_eq!(
            err.to_string(),
            "serp: Fetch rust async: fetch error: HTTP error! status: 429"
        );
        assert_eq!(err.message(), "HTTP error! status: 429");
        assert!(err.is_fetch());
    }

    #[test]
    fn message_falls_back_to_code() {
        let err = SerpError::blocked("q", "Extract", None);
        assert_eq!(err.message(), "no meaningful content");
        assert!(err.is_blocked());
    }

    #[test]
    fn code_names_are_snake_case() {
        assert_eq!(ErrorCode::InvalidUrl.as_str(), "invalid_url");
        assert_eq!(ErrorCode::Schema.as_str(), "schema");
    }
}

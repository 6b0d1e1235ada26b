//! Structured error taxonomy shared by all platform adapters.
//!
//! Every failure an adapter surfaces is an `AdapterError` tagged with the
//! adapter name and a structured kind. Callers match on the kind (or the
//! stable `(adapter, code)` pair) to decide how to react — back off on
//! `RateLimited`, re-authenticate on `Authentication`, and so on.

use std::error::Error as StdError;
use std::fmt;

/// Structured classification of an adapter failure.
#[derive(Debug)]
pub enum AdapterErrorKind {
    /// The platform rejected the call due to rate limiting.
    RateLimited {
        /// Seconds to wait before retrying, when the platform says.
        retry_after: Option<u64>,
    },
    /// Credentials were rejected or a signature check failed.
    Authentication,
    /// A referenced resource (channel, message, user, …) does not exist.
    NotFound {
        resource_type: String,
        resource_id: Option<String>,
    },
    /// The bot lacks permission for the attempted action.
    Permission {
        action: String,
        required_scope: Option<String>,
    },
    /// Malformed input: bad thread id, unsupported payload shape, etc.
    Validation,
    /// Transport-level failure (DNS, timeout, connection reset, …).
    Network,
}

/// An error raised by a platform adapter.
///
/// Carries the adapter name, a structured [`AdapterErrorKind`], an optional
/// message overriding the kind's default, and an optional underlying cause
/// exposed through `std::error::Error::source`.
#[derive(Debug)]
pub struct AdapterError {
    pub adapter: String,
    pub kind: AdapterErrorKind,
    message: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AdapterError {
    pub fn new(adapter: impl Into<String>, kind: AdapterErrorKind) -> Self {
        Self {
            adapter: adapter.into(),
            kind,
            message: None,
            source: None,
        }
    }

    pub fn rate_limited(adapter: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::new(adapter, AdapterErrorKind::RateLimited { retry_after })
    }

    pub fn authentication(adapter: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Authentication)
    }

    pub fn not_found(
        adapter: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: Option<String>,
    ) -> Self {
        Self::new(
            adapter,
            AdapterErrorKind::NotFound {
                resource_type: resource_type.into(),
                resource_id,
            },
        )
    }

    pub fn permission(
        adapter: impl Into<String>,
        action: impl Into<String>,
        required_scope: Option<String>,
    ) -> Self {
        Self::new(
            adapter,
            AdapterErrorKind::Permission {
                action: action.into(),
                required_scope,
            },
        )
    }

    pub fn validation(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(adapter, AdapterErrorKind::Validation).with_message(message)
    }

    pub fn network(
        adapter: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::new(adapter, AdapterErrorKind::Network).with_source(source)
    }

    /// Replace the kind's default display message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self.kind {
            AdapterErrorKind::RateLimited { .. } => "RATE_LIMITED",
            AdapterErrorKind::Authentication => "AUTH_FAILED",
            AdapterErrorKind::NotFound { .. } => "NOT_FOUND",
            AdapterErrorKind::Permission { .. } => "PERMISSION_DENIED",
            AdapterErrorKind::Validation => "VALIDATION_ERROR",
            AdapterErrorKind::Network => "NETWORK_ERROR",
        }
    }

    fn default_message(&self) -> String {
        match &self.kind {
            AdapterErrorKind::RateLimited { retry_after } => match retry_after {
                Some(secs) => format!("Rate limited by {}, retry after {secs}s", self.adapter),
                None => format!("Rate limited by {}", self.adapter),
            },
            AdapterErrorKind::Authentication => {
                format!("Authentication failed for {}", self.adapter)
            }
            AdapterErrorKind::NotFound {
                resource_type,
                resource_id,
            } => match resource_id {
                Some(id) => format!("{resource_type} '{id}' not found in {}", self.adapter),
                None => format!("{resource_type} not found in {}", self.adapter),
            },
            AdapterErrorKind::Permission {
                action,
                required_scope,
            } => match required_scope {
                Some(scope) => format!(
                    "Permission denied: cannot {action} in {} (requires: {scope})",
                    self.adapter
                ),
                None => format!("Permission denied: cannot {action} in {}", self.adapter),
            },
            AdapterErrorKind::Validation => format!("Invalid input for {}", self.adapter),
            AdapterErrorKind::Network => format!("Network error in {}", self.adapter),
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message}"),
            None => write!(f, "{}", self.default_message()),
        }
    }
}

impl StdError for AdapterError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

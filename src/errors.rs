//! Classification of failed requests.
//!
//! Every failure is handled the same way by a worker (logged, then the loop
//! moves on), so the category only feeds log fields and the
//! `request_errors_by_category_total` metric.

use std::fmt;

/// Categories of transport-level request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// DNS failure, refused or reset connection.
    NetworkError,

    /// The client timeout elapsed.
    TimeoutError,

    /// TLS handshake or certificate failure.
    TlsError,

    /// Reading the response body failed after the status line arrived.
    BodyError,

    /// Anything else.
    OtherError,
}

impl ErrorCategory {
    /// Categorize a reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() {
            Self::from_message(&error.to_string()).unwrap_or(ErrorCategory::NetworkError)
        } else if error.is_body() || error.is_decode() {
            ErrorCategory::BodyError
        } else if error.is_request() {
            ErrorCategory::NetworkError
        } else {
            Self::from_message(&error.to_string()).unwrap_or(ErrorCategory::OtherError)
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        let message = message.to_lowercase();

        if message.contains("certificate") || message.contains("tls") || message.contains("ssl") {
            Some(ErrorCategory::TlsError)
        } else if message.contains("timed out") || message.contains("timeout") {
            Some(ErrorCategory::TimeoutError)
        } else if message.contains("dns")
            || message.contains("resolve")
            || message.contains("connect")
            || message.contains("reset")
        {
            Some(ErrorCategory::NetworkError)
        } else {
            None
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::BodyError => "body_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::BodyError => "Response Body Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

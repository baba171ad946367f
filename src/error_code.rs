//! Provider error kinds: the enumerated classification applied at the
//! model-call boundary.
//!
//! The model endpoint surfaces failures as named exceptions (or HTTP statuses
//! carrying an `error.type`). Everything downstream branches on
//! [`ProviderErrorKind`] rather than re-matching strings at each call site.
//!
//! ## Kinds
//!
//! | Kind | Canonical name | Retryable | Quota signature |
//! |------|----------------|-----------|-----------------|
//! | Throttling | `ThrottlingException` | yes | yes |
//! | TooManyRequests | `TooManyRequestsException` | yes | yes |
//! | QuotaExceeded | `ServiceQuotaExceededException` | yes | yes |
//! | StreamError | `ModelStreamErrorException` | yes | yes |
//! | ModelTimeout | `ModelTimeoutException` | yes | yes |
//! | ServiceUnavailable | `ServiceUnavailableException` | yes | no |
//! | ServerError | `InternalServerException` | yes | no |
//! | Validation | `ValidationException` | no | no |
//! | InvalidRequest | `InvalidRequestException` | no | no |
//! | AccessDenied | `AccessDeniedException` | yes | no |
//! | Unknown | `UnknownError` | yes | no |
//!
//! Classification from free-form names/messages is substring based and
//! therefore fuzzy; the signature list is kept identical to the one the
//! circuit breaker matches against by default.

use std::fmt;

/// Default signatures that count as quota/throttling failures for the circuit breaker.
pub const DEFAULT_QUOTA_SIGNATURES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "ServiceQuotaExceededException",
    "ModelStreamErrorException",
    "ModelTimeoutException",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Throttling,
    TooManyRequests,
    QuotaExceeded,
    StreamError,
    ModelTimeout,
    ServiceUnavailable,
    ServerError,
    Validation,
    InvalidRequest,
    AccessDenied,
    Unknown,
}

impl ProviderErrorKind {
    /// Canonical exception-style name (e.g. `"ThrottlingException"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Throttling => "ThrottlingException",
            Self::TooManyRequests => "TooManyRequestsException",
            Self::QuotaExceeded => "ServiceQuotaExceededException",
            Self::StreamError => "ModelStreamErrorException",
            Self::ModelTimeout => "ModelTimeoutException",
            Self::ServiceUnavailable => "ServiceUnavailableException",
            Self::ServerError => "InternalServerException",
            Self::Validation => "ValidationException",
            Self::InvalidRequest => "InvalidRequestException",
            Self::AccessDenied => "AccessDeniedException",
            Self::Unknown => "UnknownError",
        }
    }

    /// Malformed requests fail the same way on every attempt; everything else
    /// is worth another try.
    #[inline]
    pub fn retryable(&self) -> bool {
        !matches!(self, Self::Validation | Self::InvalidRequest)
    }

    /// Whether this kind belongs to the quota/throttling family.
    #[inline]
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            Self::Throttling
                | Self::TooManyRequests
                | Self::QuotaExceeded
                | Self::StreamError
                | Self::ModelTimeout
        )
    }

    /// Classify a raw exception name and message.
    ///
    /// Non-retryable validation signatures win over everything else; then the
    /// quota family; then generic server/timeout wording.
    pub fn classify(name: &str, message: &str) -> Self {
        let has = |needle: &str| name.contains(needle) || message.contains(needle);

        if has("ValidationException") {
            return Self::Validation;
        }
        if has("InvalidRequest") {
            return Self::InvalidRequest;
        }
        if has("ThrottlingException") {
            return Self::Throttling;
        }
        if has("TooManyRequestsException") {
            return Self::TooManyRequests;
        }
        if has("ServiceQuotaExceededException") {
            return Self::QuotaExceeded;
        }
        if has("ModelStreamErrorException") {
            return Self::StreamError;
        }
        if has("ModelTimeoutException") {
            return Self::ModelTimeout;
        }
        if has("ServiceUnavailable") {
            return Self::ServiceUnavailable;
        }
        if has("AccessDenied") {
            return Self::AccessDenied;
        }
        if has("InternalServer") {
            return Self::ServerError;
        }

        let lower = format!("{} {}", name, message).to_lowercase();
        if lower.contains("throttl") || lower.contains("rate limit") || lower.contains("rate_limit")
        {
            Self::Throttling
        } else if lower.contains("too many requests") {
            Self::TooManyRequests
        } else if lower.contains("quota") {
            Self::QuotaExceeded
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::ModelTimeout
        } else {
            Self::Unknown
        }
    }

    /// Maps a provider `error.type` string to a kind.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let kind = match code {
            "invalid_request_error" | "invalid_request" => Self::InvalidRequest,
            "validation_error" => Self::Validation,
            "rate_limit_error" | "rate_limited" | "throttling" => Self::Throttling,
            "quota_exceeded" | "insufficient_quota" => Self::QuotaExceeded,
            "overloaded_error" | "overloaded" => Self::ServiceUnavailable,
            "timeout_error" | "timeout" => Self::ModelTimeout,
            "api_error" | "server_error" => Self::ServerError,
            "authentication_error" | "permission_error" => Self::AccessDenied,
            _ => return None,
        };
        Some(kind)
    }

    /// Maps an HTTP status code to the most likely kind.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 413 | 422 => Self::Validation,
            401 | 403 => Self::AccessDenied,
            404 => Self::InvalidRequest,
            408 | 504 => Self::ModelTimeout,
            429 => Self::TooManyRequests,
            500 => Self::ServerError,
            502 | 503 | 529 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

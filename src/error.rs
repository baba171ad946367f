use crate::error_code::ProviderErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "results.items[3]", "DOCGEN_OUTPUT_BUCKET")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "transcript_parser", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the document generation runtime.
///
/// Variants follow the failure taxonomy of the pipeline: configuration and
/// structural problems are fatal, provider errors carry an explicit
/// [`ProviderErrorKind`] that drives retry and circuit-breaker decisions, and
/// stage failures are recorded rather than propagated unless they hit the
/// terminal content stage.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Malformed transcript: {message}{}", format_context(.context))]
    Structural {
        message: String,
        context: ErrorContext,
    },

    #[error("Provider error ({name}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        name: String,
        message: String,
        status: Option<u16>,
    },

    #[error(
        "Circuit breaker open: model endpoint quota likely exceeded, retry in {:.0}s (failed {failure_count} times)",
        .remaining.as_secs_f64()
    )]
    CircuitOpen {
        remaining: Duration,
        failure_count: u32,
    },

    #[error("Stage {stage} failed: {message}")]
    Stage { stage: u8, message: String },

    #[error("Model output is not valid JSON: {message}")]
    MalformedOutput { message: String, raw: String },

    #[error("Storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pipeline deadline exceeded")]
    DeadlineExceeded,
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        Self::structural_with_context(msg, ErrorContext::new())
    }

    pub fn structural_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Structural {
            message: msg.into(),
            context,
        }
    }

    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    /// Build a provider error whose name is the canonical name of `kind`.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Error::Provider {
            kind,
            name: kind.name().to_string(),
            message: message.into(),
            status: None,
        }
    }

    /// Build a provider error from a raw exception name and message, classifying
    /// it with the fuzzy signature rules of [`ProviderErrorKind::classify`].
    pub fn provider_from_signature(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        Error::Provider {
            kind: ProviderErrorKind::classify(&name, &message),
            name,
            message,
            status: None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Structural { context, .. }
            | Error::Storage { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Provider kind, when this error came from the model endpoint.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Error::Provider { kind, .. } => Some(*kind),
            Error::Transport(e) if e.is_timeout() => Some(ProviderErrorKind::ModelTimeout),
            _ => None,
        }
    }

    /// Name/message pair used for signature matching (circuit breaker accounting).
    pub fn signature(&self) -> (String, String) {
        match self {
            Error::Provider { name, message, .. } => (name.clone(), message.clone()),
            Error::Transport(e) if e.is_timeout() => (
                ProviderErrorKind::ModelTimeout.name().to_string(),
                e.to_string(),
            ),
            other => (other.variant_name().to_string(), other.to_string()),
        }
    }

    /// Whether a model call failing with this error may be attempted again.
    ///
    /// Validation-class provider errors, interruption and local failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider { kind, .. } => kind.retryable(),
            Error::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_interruption(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "ConfigurationError",
            Error::Structural { .. } => "StructuralError",
            Error::Provider { .. } => "ProviderError",
            Error::CircuitOpen { .. } => "CircuitBreakerOpen",
            Error::Stage { .. } => "StageFailure",
            Error::MalformedOutput { .. } => "JSONDecodeError",
            Error::Storage { .. } => "StorageError",
            Error::Transport(_) => "TransportError",
            Error::Io(_) => "IOError",
            Error::Serialization(_) => "SerializationError",
            Error::Cancelled => "Cancelled",
            Error::DeadlineExceeded => "DeadlineExceeded",
        }
    }
}

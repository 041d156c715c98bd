use std::fmt;

/// Error taxonomy shared by the extractor, the recommendation engine, and
/// the card store client. Travels inside `anyhow::Error`; callers that need
/// to map kinds (the API layer) downcast to it.
#[derive(Debug, Clone)]
pub enum ServiceError {
    /// A required field is missing from input or model output.
    Validation { field: &'static str },
    /// Transport failure or non-success status from an upstream service.
    ExternalService {
        status: Option<u16>,
        message: String,
    },
    /// Model message content is not valid JSON for the expected shape.
    Parse {
        detail: String,
        raw_output: Option<String>,
    },
}

impl ServiceError {
    pub fn missing_field(field: &'static str) -> Self {
        Self::Validation { field }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            status,
            message: message.into(),
        }
    }

    pub fn parse(detail: impl Into<String>, raw_output: Option<String>) -> Self {
        Self::Parse {
            detail: detail.into(),
            raw_output,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ExternalService { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field } => write!(f, "missing or invalid required field: {field}"),
            Self::ExternalService { status, message } => match status {
                Some(status) => write!(f, "external service error (status={status}): {message}"),
                None => write!(f, "external service error: {message}"),
            },
            Self::Parse { detail, .. } => write!(f, "model output is not valid JSON: {detail}"),
        }
    }
}

impl std::error::Error for ServiceError {}

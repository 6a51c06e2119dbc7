#![allow(missing_docs)]

use std::fmt;

/// Catalog call that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `POST` of a new record.
    Create,
    /// `POST` of an expansion under an existing record.
    CreateExpansion,
    /// `GET` of a single record.
    Get,
    /// `GET` of the whole catalog.
    List,
    /// `PATCH` of an existing record.
    Update,
    /// `DELETE` of a record.
    Delete,
}

impl Operation {
    /// Creation endpoints always check the response status.
    pub fn always_checks_status(self) -> bool {
        matches!(self, Operation::Create | Operation::CreateExpansion)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Create => "create",
            Operation::CreateExpansion => "create expansion",
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Errors returned by [`crate::CatalogClient`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid catalog base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request failed during {operation}: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("catalog returned HTTP {status} during {operation}: {message}")]
    Status {
        operation: Operation,
        status: u16,
        message: String,
    },

    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    /// HTTP status that caused the failure, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            CatalogError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Short failure category for display.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::InvalidBaseUrl { .. } | CatalogError::Client(_) => "config",
            CatalogError::Transport { .. } => "transport",
            CatalogError::Status { .. } => "status",
            CatalogError::Decode { .. } => "decode",
        }
    }

    /// The failing operation, when the error came from a request.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            CatalogError::Transport { operation, .. }
            | CatalogError::Status { operation, .. }
            | CatalogError::Decode { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

//! Error types for provisioning and settlement operations.

use thiserror::Error;

/// Failure reported by the broker for a single remote call.
///
/// The broker's own fault taxonomy is collapsed into the three outcomes the
/// callers make decisions on. Creation paths treat [`RemoteError::AlreadyExists`]
/// as success, default-rule removal treats [`RemoteError::NotFound`] as success,
/// everything else is propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Messaging entity '{entity}' already exists")]
    AlreadyExists { entity: String },

    #[error("Messaging entity '{entity}' could not be found")]
    NotFound { entity: String },

    #[error("{}", describe_other(*.status, .detail))]
    Other { status: Option<u16>, detail: String },
}

fn describe_other(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(status) => format!("Broker request failed (HTTP {}): {}", status, detail),
        None => format!("Broker request failed: {}", detail),
    }
}

impl RemoteError {
    /// Build an [`RemoteError::Other`] without an HTTP status.
    pub fn other(detail: impl Into<String>) -> Self {
        Self::Other {
            status: None,
            detail: detail.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised while reconciling broker topology.
///
/// Each variant names the step that failed so an operator can tell how far a
/// partially provisioned topology got before re-running the command.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to create queue '{queue}': {source}")]
    CreateQueue {
        queue: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to create topic '{topic}': {source}")]
    CreateTopic {
        topic: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to create subscription '{subscription}' on topic '{topic}': {source}")]
    CreateSubscription {
        topic: String,
        subscription: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to delete rule '{rule}' from subscription '{topic}/{subscription}': {source}")]
    DeleteRule {
        topic: String,
        subscription: String,
        rule: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to delete queue '{queue}': {source}")]
    DeleteQueue {
        queue: String,
        #[source]
        source: RemoteError,
    },
}

impl ProvisionError {
    /// The broker failure behind this error.
    pub fn remote(&self) -> &RemoteError {
        match self {
            Self::CreateQueue { source, .. }
            | Self::CreateTopic { source, .. }
            | Self::CreateSubscription { source, .. }
            | Self::DeleteRule { source, .. }
            | Self::DeleteQueue { source, .. } => source,
        }
    }
}

/// Errors raised while settling a received message.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement of message '{message_id}' was cancelled before reaching the broker")]
    Cancelled { message_id: String },

    #[error("Lock on message '{message_id}' was lost (lock token {lock_token})")]
    LockLost {
        message_id: String,
        lock_token: String,
    },

    #[error("Failed to {operation} message '{message_id}': {source}")]
    Remote {
        operation: &'static str,
        message_id: String,
        #[source]
        source: RemoteError,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Connection string is malformed: {message}")]
    MalformedConnectionString { message: String },
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

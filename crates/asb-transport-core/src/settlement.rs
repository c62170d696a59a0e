//! Transaction-mode-aware completion and abandonment of received messages.

use crate::error::{RemoteError, SettlementError, ValidationError};
use crate::transaction::{Transaction, TransactionScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "settlement_tests.rs"]
mod tests;

// ============================================================================
// Transaction Mode
// ============================================================================

/// Delivery guarantee an endpoint runs with.
///
/// Only the split between [`TransportTransactionMode::None`] and everything else
/// affects settlement: in `None` the broker's receive mode decides the message's
/// fate and explicit settlement is never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportTransactionMode {
    None,
    ReceiveOnly,
    #[default]
    SendsAtomicWithReceive,
    TransactionScope,
}

impl TransportTransactionMode {
    /// Whether received messages are explicitly completed or abandoned.
    pub fn settles_explicitly(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ReceiveOnly => "receive-only",
            Self::SendsAtomicWithReceive => "sends-atomic-with-receive",
            Self::TransactionScope => "transaction-scope",
        }
    }
}

impl fmt::Display for TransportTransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportTransactionMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "receive-only" => Ok(Self::ReceiveOnly),
            "sends-atomic-with-receive" => Ok(Self::SendsAtomicWithReceive),
            "transaction-scope" => Ok(Self::TransactionScope),
            other => Err(ValidationError::InvalidFormat {
                field: "transaction_mode".to_string(),
                message: format!("unknown transaction mode '{}'", other),
            }),
        }
    }
}

// ============================================================================
// Received Messages
// ============================================================================

/// Broker-assigned token identifying a peek-locked delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(Uuid);

impl LockToken {
    pub fn new(token: Uuid) -> Self {
        Self(token)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LockToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "lock_token".to_string(),
                message: e.to_string(),
            })
    }
}

/// Handle to a message received in peek-lock mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    entity_path: String,
    message_id: String,
    lock_token: LockToken,
    delivery_count: u32,
}

impl ReceivedMessage {
    pub fn new(
        entity_path: impl Into<String>,
        message_id: impl Into<String>,
        lock_token: LockToken,
        delivery_count: u32,
    ) -> Self {
        Self {
            entity_path: entity_path.into(),
            message_id: message_id.into(),
            lock_token,
            delivery_count,
        }
    }

    /// Queue or subscription path the message was received from.
    pub fn entity_path(&self) -> &str {
        &self.entity_path
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn lock_token(&self) -> LockToken {
        self.lock_token
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }
}

// ============================================================================
// Receiver Abstraction
// ============================================================================

/// Runtime-plane settlement calls against the broker.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Remove the message from the entity.
    async fn complete_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError>;

    /// Release the lock so the message is redelivered.
    async fn abandon_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: MessageReceiver + ?Sized> MessageReceiver for Arc<T> {
    async fn complete_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        (**self).complete_message(message, cancellation).await
    }

    async fn abandon_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        (**self).abandon_message(message, cancellation).await
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Final state of a message after a settlement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Abandoned,
    /// The transaction mode leaves settlement to the broker.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
enum SettleAction {
    Complete,
    Abandon,
}

impl SettleAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Abandon => "abandon",
        }
    }
}

/// Settles received messages according to the endpoint's transaction mode.
pub struct SettlementCoordinator<R> {
    receiver: R,
    mode: TransportTransactionMode,
}

impl<R: MessageReceiver> SettlementCoordinator<R> {
    pub fn new(receiver: R, mode: TransportTransactionMode) -> Self {
        Self { receiver, mode }
    }

    pub fn mode(&self) -> TransportTransactionMode {
        self.mode
    }

    /// Complete `message`, committing `transaction` only if the broker accepted it.
    #[instrument(skip_all, fields(message_id = %message.message_id(), mode = %self.mode))]
    pub async fn complete(
        &self,
        message: &ReceivedMessage,
        transaction: Option<&dyn Transaction>,
        cancellation: &CancellationToken,
    ) -> Result<Disposition, SettlementError> {
        self.settle(SettleAction::Complete, message, transaction, cancellation)
            .await
    }

    /// Abandon `message`, committing `transaction` only if the broker accepted it.
    #[instrument(skip_all, fields(message_id = %message.message_id(), mode = %self.mode))]
    pub async fn abandon(
        &self,
        message: &ReceivedMessage,
        transaction: Option<&dyn Transaction>,
        cancellation: &CancellationToken,
    ) -> Result<Disposition, SettlementError> {
        self.settle(SettleAction::Abandon, message, transaction, cancellation)
            .await
    }

    async fn settle(
        &self,
        action: SettleAction,
        message: &ReceivedMessage,
        transaction: Option<&dyn Transaction>,
        cancellation: &CancellationToken,
    ) -> Result<Disposition, SettlementError> {
        if !self.mode.settles_explicitly() {
            debug!("Transaction mode settles implicitly, skipping {}", action.verb());
            return Ok(Disposition::Skipped);
        }

        if cancellation.is_cancelled() {
            return Err(SettlementError::Cancelled {
                message_id: message.message_id().to_string(),
            });
        }

        let scope = TransactionScope::enlist(transaction);

        let call = async {
            match action {
                SettleAction::Complete => {
                    self.receiver.complete_message(message, cancellation).await
                }
                SettleAction::Abandon => self.receiver.abandon_message(message, cancellation).await,
            }
        };

        // The scope is dropped uncompleted on this path, so the transaction rolls back.
        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                warn!("Settlement cancelled while awaiting the broker");
                return Err(SettlementError::Cancelled {
                    message_id: message.message_id().to_string(),
                });
            }
            result = call => result,
        };

        match result {
            Ok(()) => {
                scope.complete();
                debug!(
                    lock_token = %message.lock_token(),
                    enlisted = transaction.is_some(),
                    "Message settled"
                );
                Ok(match action {
                    SettleAction::Complete => Disposition::Completed,
                    SettleAction::Abandon => Disposition::Abandoned,
                })
            }
            Err(error) => {
                drop(scope);
                warn!(error = %error, "Failed to {} message", action.verb());
                Err(match error {
                    RemoteError::NotFound { .. } => SettlementError::LockLost {
                        message_id: message.message_id().to_string(),
                        lock_token: message.lock_token().to_string(),
                    },
                    source => SettlementError::Remote {
                        operation: action.verb(),
                        message_id: message.message_id().to_string(),
                        source,
                    },
                })
            }
        }
    }
}

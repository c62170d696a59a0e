//! # ASB Transport Core
//!
//! Broker topology provisioning and transaction-aware message settlement for
//! an Azure Service Bus message transport.
//!
//! This library provides:
//! - Validated entity names and endpoint topology resolution
//! - Idempotent provisioning of queue, topic, forwarding subscription and
//!   default-rule removal
//! - Completion and abandonment of peek-locked messages enlisted in an
//!   optional caller-owned transaction
//! - A REST provider for real namespaces and an in-memory broker for tests
//!
//! ## Module Organization
//!
//! - [entity] - Entity names, options and resolved topology
//! - [error] - Error types for remote calls, provisioning and settlement
//! - [management] - Management-plane client abstraction
//! - [provisioning] - Topology reconciliation
//! - [settlement] - Transaction modes and the settlement coordinator
//! - [transaction] - Transaction handles and scopes
//! - [connection] - Connection strings and SAS tokens
//! - [providers] - Azure REST and in-memory brokers

pub mod connection;
pub mod entity;
pub mod error;
pub mod management;
pub mod providers;
pub mod provisioning;
pub mod settlement;
pub mod transaction;

pub use connection::{ConnectionString, Credentials, SasTokenGenerator, CONNECTION_STRING_ENV_VAR};
pub use entity::{
    EndpointName, EndpointOptions, EndpointTopology, EntityName, QueueOptions, QueueSpec,
    SubscriptionSpec, TopicSpec, DEFAULT_RULE_NAME, DEFAULT_SIZE_IN_GB, DEFAULT_TOPIC_NAME,
};
pub use error::{
    ConfigurationError, ProvisionError, RemoteError, SettlementError, ValidationError,
};
pub use management::ManagementClient;
pub use providers::{AzureServiceBusClient, ClientSettings, InMemoryBroker};
pub use provisioning::{EntityOutcome, ProvisioningOrchestrator, RuleOutcome, TopologyReport};
pub use settlement::{
    Disposition, LockToken, MessageReceiver, ReceivedMessage, SettlementCoordinator,
    TransportTransactionMode,
};
pub use transaction::{
    CallbackTransaction, CommittableTransaction, Transaction, TransactionScope, TransactionState,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

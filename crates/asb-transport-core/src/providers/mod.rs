//! Broker implementations.
//!
//! Each provider implements both [`crate::management::ManagementClient`] and
//! [`crate::settlement::MessageReceiver`].

pub mod azure;
pub mod memory;

pub use azure::{AzureServiceBusClient, ClientSettings, DEFAULT_API_VERSION};
pub use memory::{BrokerCall, BrokerOperation, InMemoryBroker};

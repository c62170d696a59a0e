//! Management-plane abstraction over the broker.

use crate::entity::{EntityName, QueueSpec, SubscriptionSpec, TopicSpec};
use crate::error::RemoteError;
use async_trait::async_trait;
use std::sync::Arc;

/// Create/delete operations the provisioning orchestrator issues against a broker.
///
/// Implementations report the broker's conflict and missing-entity faults as
/// [`RemoteError::AlreadyExists`] and [`RemoteError::NotFound`] instead of
/// interpreting them; the orchestrator decides which of those are benign.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Create a queue
    async fn create_queue(&self, spec: &QueueSpec) -> Result<(), RemoteError>;

    /// Create a topic
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), RemoteError>;

    /// Create a subscription on an existing topic
    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<(), RemoteError>;

    /// Delete a rule from a subscription
    async fn delete_rule(
        &self,
        topic: &EntityName,
        subscription: &EntityName,
        rule: &str,
    ) -> Result<(), RemoteError>;

    /// Delete a queue
    async fn delete_queue(&self, name: &EntityName) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: ManagementClient + ?Sized> ManagementClient for Arc<T> {
    async fn create_queue(&self, spec: &QueueSpec) -> Result<(), RemoteError> {
        (**self).create_queue(spec).await
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), RemoteError> {
        (**self).create_topic(spec).await
    }

    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<(), RemoteError> {
        (**self).create_subscription(spec).await
    }

    async fn delete_rule(
        &self,
        topic: &EntityName,
        subscription: &EntityName,
        rule: &str,
    ) -> Result<(), RemoteError> {
        (**self).delete_rule(topic, subscription, rule).await
    }

    async fn delete_queue(&self, name: &EntityName) -> Result<(), RemoteError> {
        (**self).delete_queue(name).await
    }
}

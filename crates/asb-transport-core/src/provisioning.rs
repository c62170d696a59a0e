//! Idempotent reconciliation of the entities an endpoint needs.
//!
//! Creation never checks for existence first. The create call is issued and a
//! conflict from the broker is read as "already there", which keeps concurrent
//! provisioning runs free of check-then-act races.

use crate::entity::{EndpointTopology, EntityName, QueueSpec, DEFAULT_RULE_NAME};
use crate::error::{ProvisionError, RemoteError};
use crate::management::ManagementClient;
use tracing::{debug, info, instrument};

#[cfg(test)]
#[path = "provisioning_tests.rs"]
mod tests;

/// What a create step found on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    Created,
    AlreadyExisted,
}

/// What the default-rule removal step found on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Removed,
    Absent,
}

/// Per-step result of [`ProvisioningOrchestrator::create_endpoint_topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyReport {
    pub queue: EntityOutcome,
    pub topic: EntityOutcome,
    pub subscription: EntityOutcome,
    pub default_rule: RuleOutcome,
}

/// Brings broker entities for an endpoint or queue into the desired state.
pub struct ProvisioningOrchestrator<M> {
    client: M,
}

impl<M: ManagementClient> ProvisioningOrchestrator<M> {
    pub fn new(client: M) -> Self {
        Self { client }
    }

    /// Create a queue, treating an existing queue as success.
    #[instrument(skip(self, spec), fields(queue = %spec.name()))]
    pub async fn create_queue(&self, spec: &QueueSpec) -> Result<EntityOutcome, ProvisionError> {
        let result = self.client.create_queue(spec).await;
        let outcome = tolerate_existing(result).map_err(|source| ProvisionError::CreateQueue {
            queue: spec.name().to_string(),
            source,
        })?;

        match outcome {
            EntityOutcome::Created => info!(
                max_size_in_mb = spec.max_size_in_mb(),
                partitioned = spec.partitioned(),
                "Queue created"
            ),
            EntityOutcome::AlreadyExisted => info!("Queue already exists, skipping creation"),
        }

        Ok(outcome)
    }

    /// Provision queue, topic, forwarding subscription and remove the default rule.
    ///
    /// Steps run strictly in order since the subscription forwards to the queue
    /// and lives on the topic. The first non-benign failure stops the run;
    /// every step is individually idempotent so the caller can simply retry.
    #[instrument(skip(self, topology), fields(endpoint = %topology.endpoint()))]
    pub async fn create_endpoint_topology(
        &self,
        topology: &EndpointTopology,
    ) -> Result<TopologyReport, ProvisionError> {
        let queue = self.create_queue(topology.queue()).await?;

        let topic_spec = topology.topic();
        let topic = tolerate_existing(self.client.create_topic(topic_spec).await).map_err(
            |source| ProvisionError::CreateTopic {
                topic: topic_spec.name().to_string(),
                source,
            },
        )?;
        match topic {
            EntityOutcome::Created => info!(topic = %topic_spec.name(), "Topic created"),
            EntityOutcome::AlreadyExisted => {
                info!(topic = %topic_spec.name(), "Topic already exists, skipping creation")
            }
        }

        let subscription_spec = topology.subscription();
        let subscription =
            tolerate_existing(self.client.create_subscription(subscription_spec).await).map_err(
                |source| ProvisionError::CreateSubscription {
                    topic: subscription_spec.topic().to_string(),
                    subscription: subscription_spec.name().to_string(),
                    source,
                },
            )?;
        match subscription {
            EntityOutcome::Created => info!(
                topic = %subscription_spec.topic(),
                subscription = %subscription_spec.name(),
                forward_to = %subscription_spec.forward_to(),
                "Subscription created"
            ),
            EntityOutcome::AlreadyExisted => info!(
                topic = %subscription_spec.topic(),
                subscription = %subscription_spec.name(),
                "Subscription already exists, skipping creation"
            ),
        }

        let default_rule = self
            .remove_default_rule(subscription_spec.topic(), subscription_spec.name())
            .await?;

        Ok(TopologyReport {
            queue,
            topic,
            subscription,
            default_rule,
        })
    }

    /// Delete a queue. A missing queue is reported, not ignored.
    #[instrument(skip(self, name), fields(queue = %name))]
    pub async fn delete_queue(&self, name: &EntityName) -> Result<(), ProvisionError> {
        self.client
            .delete_queue(name)
            .await
            .map_err(|source| ProvisionError::DeleteQueue {
                queue: name.to_string(),
                source,
            })?;

        info!("Queue deleted");
        Ok(())
    }

    async fn remove_default_rule(
        &self,
        topic: &EntityName,
        subscription: &EntityName,
    ) -> Result<RuleOutcome, ProvisionError> {
        match self
            .client
            .delete_rule(topic, subscription, DEFAULT_RULE_NAME)
            .await
        {
            Ok(()) => {
                debug!(%topic, %subscription, "Default rule removed");
                Ok(RuleOutcome::Removed)
            }
            Err(RemoteError::NotFound { .. }) => {
                debug!(%topic, %subscription, "Default rule already absent");
                Ok(RuleOutcome::Absent)
            }
            Err(source) => Err(ProvisionError::DeleteRule {
                topic: topic.to_string(),
                subscription: subscription.to_string(),
                rule: DEFAULT_RULE_NAME.to_string(),
                source,
            }),
        }
    }
}

fn tolerate_existing(result: Result<(), RemoteError>) -> Result<EntityOutcome, RemoteError> {
    match result {
        Ok(()) => Ok(EntityOutcome::Created),
        Err(RemoteError::AlreadyExists { .. }) => Ok(EntityOutcome::AlreadyExisted),
        Err(other) => Err(other),
    }
}

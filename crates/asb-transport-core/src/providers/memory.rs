//! In-memory broker for testing and local development.
//!
//! This module provides a broker double that:
//! - Keeps an entity registry with the broker's implicit `$Default` rule
//! - Reports conflicts and missing entities the way the real broker does
//! - Holds peek-locked messages so settlement can be exercised end to end
//! - Journals every call and supports one-shot fault injection per operation

use crate::entity::{EntityName, QueueSpec, SubscriptionSpec, TopicSpec, DEFAULT_RULE_NAME};
use crate::error::RemoteError;
use crate::management::ManagementClient;
use crate::settlement::{LockToken, MessageReceiver, ReceivedMessage};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Remote operation kinds, used for journaling and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOperation {
    CreateQueue,
    CreateTopic,
    CreateSubscription,
    DeleteRule,
    DeleteQueue,
    CompleteMessage,
    AbandonMessage,
}

/// One journaled call: the operation and the entity path it addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCall {
    pub operation: BrokerOperation,
    pub entity: String,
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

struct SubscriptionState {
    spec: SubscriptionSpec,
    rules: BTreeSet<String>,
}

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    delivery_count: u32,
}

struct LockedMessage {
    entity: String,
    message: StoredMessage,
}

#[derive(Default)]
struct BrokerState {
    queues: BTreeMap<String, QueueSpec>,
    topics: BTreeMap<String, TopicSpec>,
    subscriptions: BTreeMap<(String, String), SubscriptionState>,
    available: HashMap<String, VecDeque<StoredMessage>>,
    locked: HashMap<LockToken, LockedMessage>,
    journal: Vec<BrokerCall>,
    faults: HashMap<BrokerOperation, RemoteError>,
}

impl BrokerState {
    /// Journal the call and hand back an injected fault if one is armed.
    fn record(&mut self, operation: BrokerOperation, entity: &str) -> Result<(), RemoteError> {
        self.journal.push(BrokerCall {
            operation,
            entity: entity.to_string(),
        });
        match self.faults.remove(&operation) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

fn subscription_path(topic: &str, subscription: &str) -> String {
    format!("{}/Subscriptions/{}", topic, subscription)
}

// ============================================================================
// InMemoryBroker
// ============================================================================

/// Broker double implementing both the management and runtime contracts.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: BrokerOperation, error: RemoteError) {
        self.state().faults.insert(operation, error);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state().journal.clone()
    }

    pub fn queue(&self, name: &str) -> Option<QueueSpec> {
        self.state().queues.get(name).cloned()
    }

    pub fn topic(&self, name: &str) -> Option<TopicSpec> {
        self.state().topics.get(name).cloned()
    }

    pub fn subscription(&self, topic: &str, subscription: &str) -> Option<SubscriptionSpec> {
        self.state()
            .subscriptions
            .get(&(topic.to_string(), subscription.to_string()))
            .map(|s| s.spec.clone())
    }

    /// Rules currently attached to a subscription, or `None` if it does not exist.
    pub fn rules(&self, topic: &str, subscription: &str) -> Option<Vec<String>> {
        self.state()
            .subscriptions
            .get(&(topic.to_string(), subscription.to_string()))
            .map(|s| s.rules.iter().cloned().collect())
    }

    /// Place a message on a queue.
    pub fn enqueue(&self, queue: &str, message_id: impl Into<String>) -> Result<(), RemoteError> {
        let mut state = self.state();
        if !state.queues.contains_key(queue) {
            return Err(RemoteError::NotFound {
                entity: queue.to_string(),
            });
        }
        state
            .available
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                message_id: message_id.into(),
                delivery_count: 0,
            });
        Ok(())
    }

    /// Peek-lock the next available message on a queue.
    pub fn receive(&self, queue: &str) -> Option<ReceivedMessage> {
        let mut state = self.state();
        let mut message = state.available.get_mut(queue)?.pop_front()?;
        message.delivery_count += 1;

        let lock_token = LockToken::new(Uuid::new_v4());
        let received = ReceivedMessage::new(
            queue,
            message.message_id.clone(),
            lock_token,
            message.delivery_count,
        );
        state.locked.insert(
            lock_token,
            LockedMessage {
                entity: queue.to_string(),
                message,
            },
        );
        Some(received)
    }

    /// Messages waiting to be received on a queue.
    pub fn active_message_count(&self, queue: &str) -> usize {
        self.state().available.get(queue).map_or(0, VecDeque::len)
    }

    /// Messages currently held under a lock.
    pub fn locked_message_count(&self) -> usize {
        self.state().locked.len()
    }

    fn take_lock(
        state: &mut BrokerState,
        message: &ReceivedMessage,
    ) -> Result<LockedMessage, RemoteError> {
        let token = message.lock_token();
        let lost = || RemoteError::NotFound {
            entity: format!("{}/messages/{}", message.entity_path(), token),
        };

        match state.locked.remove(&token) {
            Some(locked) if locked.entity == message.entity_path() => Ok(locked),
            Some(locked) => {
                state.locked.insert(token, locked);
                Err(lost())
            }
            None => Err(lost()),
        }
    }
}

#[async_trait]
impl ManagementClient for InMemoryBroker {
    async fn create_queue(&self, spec: &QueueSpec) -> Result<(), RemoteError> {
        let mut state = self.state();
        let name = spec.name().as_str();
        state.record(BrokerOperation::CreateQueue, name)?;

        if state.queues.contains_key(name) || state.topics.contains_key(name) {
            return Err(RemoteError::AlreadyExists {
                entity: name.to_string(),
            });
        }
        state.queues.insert(name.to_string(), spec.clone());
        Ok(())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), RemoteError> {
        let mut state = self.state();
        let name = spec.name().as_str();
        state.record(BrokerOperation::CreateTopic, name)?;

        if state.topics.contains_key(name) || state.queues.contains_key(name) {
            return Err(RemoteError::AlreadyExists {
                entity: name.to_string(),
            });
        }
        state.topics.insert(name.to_string(), spec.clone());
        Ok(())
    }

    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<(), RemoteError> {
        let mut state = self.state();
        let topic = spec.topic().as_str();
        let name = spec.name().as_str();
        let path = subscription_path(topic, name);
        state.record(BrokerOperation::CreateSubscription, &path)?;

        if !state.topics.contains_key(topic) {
            return Err(RemoteError::NotFound {
                entity: topic.to_string(),
            });
        }
        if !state.queues.contains_key(spec.forward_to().as_str()) {
            return Err(RemoteError::Other {
                status: Some(400),
                detail: format!(
                    "Entity '{}' set as ForwardTo does not exist",
                    spec.forward_to()
                ),
            });
        }

        let key = (topic.to_string(), name.to_string());
        if state.subscriptions.contains_key(&key) {
            return Err(RemoteError::AlreadyExists { entity: path });
        }
        state.subscriptions.insert(
            key,
            SubscriptionState {
                spec: spec.clone(),
                rules: BTreeSet::from([DEFAULT_RULE_NAME.to_string()]),
            },
        );
        Ok(())
    }

    async fn delete_rule(
        &self,
        topic: &EntityName,
        subscription: &EntityName,
        rule: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let path = format!(
            "{}/Rules/{}",
            subscription_path(topic.as_str(), subscription.as_str()),
            rule
        );
        state.record(BrokerOperation::DeleteRule, &path)?;

        let key = (topic.to_string(), subscription.to_string());
        let removed = state
            .subscriptions
            .get_mut(&key)
            .is_some_and(|existing| existing.rules.remove(rule));
        if removed {
            Ok(())
        } else {
            Err(RemoteError::NotFound { entity: path })
        }
    }

    async fn delete_queue(&self, name: &EntityName) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(BrokerOperation::DeleteQueue, name.as_str())?;

        if state.queues.remove(name.as_str()).is_none() {
            return Err(RemoteError::NotFound {
                entity: name.to_string(),
            });
        }
        state.available.remove(name.as_str());
        state.locked.retain(|_, locked| locked.entity != name.as_str());
        Ok(())
    }
}

#[async_trait]
impl MessageReceiver for InMemoryBroker {
    async fn complete_message(
        &self,
        message: &ReceivedMessage,
        _cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(BrokerOperation::CompleteMessage, message.entity_path())?;
        Self::take_lock(&mut state, message)?;
        Ok(())
    }

    async fn abandon_message(
        &self,
        message: &ReceivedMessage,
        _cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(BrokerOperation::AbandonMessage, message.entity_path())?;
        let locked = Self::take_lock(&mut state, message)?;
        state
            .available
            .entry(locked.entity)
            .or_default()
            .push_front(locked.message);
        Ok(())
    }
}

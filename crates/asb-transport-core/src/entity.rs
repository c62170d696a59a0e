//! Broker entity names and the descriptions the transport provisions.
//!
//! Specs are built once per invocation from validated options and handed to
//! the orchestrator as immutable values. Lock duration, delivery count and
//! batching are transport-wide constants and are deliberately not settable.

use crate::error::ValidationError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic used when no topic name is supplied.
pub const DEFAULT_TOPIC_NAME: &str = "bundle-1";

/// Entity size in gigabytes used when no size is supplied.
pub const DEFAULT_SIZE_IN_GB: u32 = 5;

/// Name of the catch-all rule the broker attaches to every new subscription.
pub const DEFAULT_RULE_NAME: &str = "$Default";

/// Delivery count limit applied to queues and subscriptions (effectively unlimited).
pub const MAX_DELIVERY_COUNT: i32 = i32::MAX;

/// Peek-lock duration applied to queues and subscriptions, in minutes.
pub const LOCK_DURATION_MINUTES: i64 = 5;

const MAX_ENTITY_NAME_LENGTH: usize = 260;
const MAX_SUBSCRIPTION_NAME_LENGTH: usize = 50;
const MEGABYTES_PER_GIGABYTE: u32 = 1024;

// ============================================================================
// Entity Names
// ============================================================================

/// Validated broker entity name (queue, topic or subscription).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityName(String);

/// An endpoint is addressed by the name of its input queue.
pub type EndpointName = EntityName;

impl EntityName {
    /// Create new entity name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::validated(name.into(), "entity_name", MAX_ENTITY_NAME_LENGTH, true)
    }

    /// Create a name that is also usable as a subscription name.
    ///
    /// Subscription names are a single path segment, so `/` is rejected.
    pub fn subscription(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::validated(
            name.into(),
            "subscription_name",
            MAX_SUBSCRIPTION_NAME_LENGTH,
            false,
        )
    }

    fn validated(
        name: String,
        field: &str,
        max_length: usize,
        allow_segments: bool,
    ) -> Result<Self, ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }

        if name.len() > max_length {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                message: format!("must be at most {} characters", max_length),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'))
        {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "only ASCII letters, digits, '.', '-', '_' and '/' allowed".to_string(),
            });
        }

        if name.contains('/') {
            if !allow_segments {
                return Err(ValidationError::InvalidFormat {
                    field: field.to_string(),
                    message: "'/' is not allowed".to_string(),
                });
            }

            // Dot and empty segments would be collapsed when the name becomes a URL path.
            if name.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
                return Err(ValidationError::InvalidFormat {
                    field: field.to_string(),
                    message: "path segments must not be empty, '.' or '..'".to_string(),
                });
            }
        }

        let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
        let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "must start and end with a letter or digit".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get entity name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityName> for String {
    fn from(name: EntityName) -> Self {
        name.0
    }
}

// ============================================================================
// Options
// ============================================================================

/// Size and partitioning choices shared by queues and topics.
///
/// Validated on construction; a value of this type always resolves to a
/// megabyte size that fits the broker's 32-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    size_in_gb: u32,
    partitioned: bool,
}

impl QueueOptions {
    pub fn new(size_in_gb: Option<u32>, partitioned: bool) -> Result<Self, ValidationError> {
        let size_in_gb = size_in_gb.unwrap_or(DEFAULT_SIZE_IN_GB);
        if size_in_gb == 0 {
            return Err(ValidationError::OutOfRange {
                field: "size".to_string(),
                message: "must be at least 1 GB".to_string(),
            });
        }
        if size_in_gb.checked_mul(MEGABYTES_PER_GIGABYTE).is_none() {
            return Err(ValidationError::OutOfRange {
                field: "size".to_string(),
                message: format!("must be at most {} GB", u32::MAX / MEGABYTES_PER_GIGABYTE),
            });
        }

        Ok(Self {
            size_in_gb,
            partitioned,
        })
    }

    pub fn size_in_gb(&self) -> u32 {
        self.size_in_gb
    }

    pub fn max_size_in_mb(&self) -> u32 {
        self.size_in_gb * MEGABYTES_PER_GIGABYTE
    }

    pub fn partitioned(&self) -> bool {
        self.partitioned
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            size_in_gb: DEFAULT_SIZE_IN_GB,
            partitioned: false,
        }
    }
}

/// Everything `endpoint create` can override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    pub queue: QueueOptions,
    pub topic: Option<EntityName>,
    pub subscription: Option<EntityName>,
}

// ============================================================================
// Entity Descriptions
// ============================================================================

/// Desired state of a transport queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    name: EntityName,
    max_size_in_mb: u32,
    partitioned: bool,
}

impl QueueSpec {
    pub fn new(name: EntityName, options: &QueueOptions) -> Self {
        Self {
            name,
            max_size_in_mb: options.max_size_in_mb(),
            partitioned: options.partitioned(),
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn max_size_in_mb(&self) -> u32 {
        self.max_size_in_mb
    }

    pub fn partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn batched_operations_enabled(&self) -> bool {
        true
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::minutes(LOCK_DURATION_MINUTES)
    }

    pub fn max_delivery_count(&self) -> i32 {
        MAX_DELIVERY_COUNT
    }
}

/// Desired state of the topic an endpoint subscribes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    name: EntityName,
    max_size_in_mb: u32,
    partitioned: bool,
}

impl TopicSpec {
    pub fn new(name: EntityName, options: &QueueOptions) -> Self {
        Self {
            name,
            max_size_in_mb: options.max_size_in_mb(),
            partitioned: options.partitioned(),
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn max_size_in_mb(&self) -> u32 {
        self.max_size_in_mb
    }

    pub fn partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn batched_operations_enabled(&self) -> bool {
        true
    }
}

/// Desired state of the subscription forwarding topic traffic to an endpoint queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    topic: EntityName,
    name: EntityName,
    forward_to: EndpointName,
}

impl SubscriptionSpec {
    pub fn new(topic: EntityName, name: EntityName, forward_to: EndpointName) -> Self {
        Self {
            topic,
            name,
            forward_to,
        }
    }

    pub fn topic(&self) -> &EntityName {
        &self.topic
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn forward_to(&self) -> &EndpointName {
        &self.forward_to
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::minutes(LOCK_DURATION_MINUTES)
    }

    pub fn max_delivery_count(&self) -> i32 {
        MAX_DELIVERY_COUNT
    }

    pub fn dead_letter_on_filter_evaluation_exception(&self) -> bool {
        false
    }

    pub fn batched_operations_enabled(&self) -> bool {
        true
    }
}

/// The full entity set an endpoint needs, resolved from its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTopology {
    endpoint: EndpointName,
    queue: QueueSpec,
    topic: TopicSpec,
    subscription: SubscriptionSpec,
}

impl EndpointTopology {
    /// Apply defaults: topic `bundle-1`, subscription named after the endpoint.
    ///
    /// Fails when the subscription name (explicit or defaulted) exceeds the
    /// broker's subscription name limit.
    pub fn resolve(
        endpoint: EndpointName,
        options: &EndpointOptions,
    ) -> Result<Self, ValidationError> {
        let topic_name = match &options.topic {
            Some(topic) => topic.clone(),
            None => EntityName::new(DEFAULT_TOPIC_NAME)?,
        };
        let subscription_name = options
            .subscription
            .clone()
            .unwrap_or_else(|| endpoint.clone());
        let subscription_name = EntityName::subscription(subscription_name.as_str())?;

        Ok(Self {
            queue: QueueSpec::new(endpoint.clone(), &options.queue),
            topic: TopicSpec::new(topic_name.clone(), &options.queue),
            subscription: SubscriptionSpec::new(topic_name, subscription_name, endpoint.clone()),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }

    pub fn topic(&self) -> &TopicSpec {
        &self.topic
    }

    pub fn subscription(&self) -> &SubscriptionSpec {
        &self.subscription
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;

//! Azure Service Bus REST provider.
//!
//! Talks to a namespace over HTTPS using the management (Atom feed) and runtime
//! REST surfaces:
//! - `PUT {entity}` with an Atom entry creates queues, topics and subscriptions
//! - `DELETE {entity}` removes queues and subscription rules
//! - `DELETE`/`PUT {entity}/messages/{id}/{lock}` completes or unlocks a
//!   peek-locked message
//!
//! Every request carries a freshly signed SAS token, or the pre-issued
//! signature from the connection string. A client built without a connection
//! string is still usable as a value; it fails on its first remote call.

use crate::connection::{ConnectionString, CONNECTION_STRING_ENV_VAR};
use crate::entity::{EntityName, QueueSpec, SubscriptionSpec, TopicSpec};
use crate::error::{ConfigurationError, RemoteError};
use crate::management::ManagementClient;
use crate::settlement::{MessageReceiver, ReceivedMessage};
use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// Management API version sent with every management request.
pub const DEFAULT_API_VERSION: &str = "2021-05";

const ATOM_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";
const SERVICE_BUS_XMLNS: &str = "http://schemas.microsoft.com/netservices/2010/10/servicebus/connect";
const XML_SCHEMA_INSTANCE_XMLNS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Tunables for [`AzureServiceBusClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    pub token_lifetime: chrono::Duration,
    pub api_version: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            token_lifetime: chrono::Duration::minutes(60),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// REST client for one Service Bus namespace.
#[derive(Debug, Clone)]
pub struct AzureServiceBusClient {
    http: reqwest::Client,
    connection: Option<ConnectionString>,
    settings: ClientSettings,
}

impl AzureServiceBusClient {
    /// Build a client. `None` defers the missing connection string to the first call.
    pub fn new(
        connection: Option<ConnectionString>,
        settings: ClientSettings,
    ) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            connection,
            settings,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn connection(&self) -> Result<&ConnectionString, RemoteError> {
        self.connection.as_ref().ok_or_else(|| {
            RemoteError::other(format!(
                "No connection string was provided and {} is not set",
                CONNECTION_STRING_ENV_VAR
            ))
        })
    }

    fn entity_url(&self, path: &str, management: bool) -> Result<Url, RemoteError> {
        let connection = self.connection()?;
        let mut url = connection.endpoint().join(path).map_err(|e| {
            RemoteError::other(format!("Invalid entity path '{}': {}", path, e))
        })?;
        if management {
            url.query_pairs_mut()
                .append_pair("api-version", &self.settings.api_version);
        }
        Ok(url)
    }

    /// Absolute address of an entity, as the broker expects for `ForwardTo`.
    fn forward_address(&self, entity: &EntityName) -> Result<String, RemoteError> {
        Ok(self.entity_url(entity.as_str(), false)?.to_string())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
        entity: &str,
    ) -> Result<(), RemoteError> {
        let authorization = self
            .connection()?
            .authorization(self.settings.token_lifetime)
            .map_err(|e| RemoteError::other(e.to_string()))?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, authorization);
        request = match body {
            Some(body) => request.header(CONTENT_TYPE, ATOM_CONTENT_TYPE).body(body),
            None => request.body(String::new()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::other(format!("Request to the broker failed: {}", e)))?;

        let status = response.status();
        debug!(%method, entity, status = status.as_u16(), "Broker responded");
        if status.is_success() {
            return Ok(());
        }

        Err(match status.as_u16() {
            409 => RemoteError::AlreadyExists {
                entity: entity.to_string(),
            },
            404 | 410 => RemoteError::NotFound {
                entity: entity.to_string(),
            },
            code => {
                let body = response.text().await.unwrap_or_default();
                let detail = error_detail(&body).unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        status
                            .canonical_reason()
                            .unwrap_or("Unknown error")
                            .to_string()
                    } else {
                        body.trim().to_string()
                    }
                });
                RemoteError::Other {
                    status: Some(code),
                    detail,
                }
            }
        })
    }

    async fn put_entity(&self, path: &str, description: String) -> Result<(), RemoteError> {
        let url = self.entity_url(path, true)?;
        self.send(Method::PUT, url, Some(atom_entry(&description)), path)
            .await
    }

    async fn delete_entity(&self, path: &str) -> Result<(), RemoteError> {
        let url = self.entity_url(path, true)?;
        self.send(Method::DELETE, url, None, path).await
    }

    async fn settle(
        &self,
        method: Method,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let path = format!(
            "{}/messages/{}/{}",
            message.entity_path(),
            urlencoding::encode(message.message_id()),
            message.lock_token()
        );
        let url = self.entity_url(&path, false)?;

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(RemoteError::other(format!(
                "Settlement of message '{}' was cancelled",
                message.message_id()
            ))),
            result = self.send(method, url, None, &path) => result,
        }
    }
}

#[async_trait]
impl ManagementClient for AzureServiceBusClient {
    #[instrument(skip(self, spec), fields(queue = %spec.name()))]
    async fn create_queue(&self, spec: &QueueSpec) -> Result<(), RemoteError> {
        self.put_entity(spec.name().as_str(), queue_description(spec))
            .await
    }

    #[instrument(skip(self, spec), fields(topic = %spec.name()))]
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), RemoteError> {
        self.put_entity(spec.name().as_str(), topic_description(spec))
            .await
    }

    #[instrument(skip(self, spec), fields(topic = %spec.topic(), subscription = %spec.name()))]
    async fn create_subscription(&self, spec: &SubscriptionSpec) -> Result<(), RemoteError> {
        let forward_to = self.forward_address(spec.forward_to())?;
        let path = format!("{}/Subscriptions/{}", spec.topic(), spec.name());
        self.put_entity(&path, subscription_description(spec, &forward_to))
            .await
    }

    #[instrument(skip(self, topic, subscription), fields(%topic, %subscription))]
    async fn delete_rule(
        &self,
        topic: &EntityName,
        subscription: &EntityName,
        rule: &str,
    ) -> Result<(), RemoteError> {
        let path = format!("{}/Subscriptions/{}/Rules/{}", topic, subscription, rule);
        self.delete_entity(&path).await
    }

    #[instrument(skip(self, name), fields(queue = %name))]
    async fn delete_queue(&self, name: &EntityName) -> Result<(), RemoteError> {
        self.delete_entity(name.as_str()).await
    }
}

#[async_trait]
impl MessageReceiver for AzureServiceBusClient {
    async fn complete_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.settle(Method::DELETE, message, cancellation).await
    }

    async fn abandon_message(
        &self,
        message: &ReceivedMessage,
        cancellation: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.settle(Method::PUT, message, cancellation).await
    }
}

// ============================================================================
// Atom Payloads
// ============================================================================

fn atom_entry(description: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<entry xmlns="http://www.w3.org/2005/Atom">"#,
            r#"<content type="application/xml">{}</content>"#,
            r#"</entry>"#
        ),
        description
    )
}

fn iso8601_seconds(duration: chrono::Duration) -> String {
    format!("PT{}S", duration.num_seconds())
}

// Element order follows the broker's data contracts, which reject reordering.
fn queue_description(spec: &QueueSpec) -> String {
    format!(
        concat!(
            r#"<QueueDescription xmlns="{}" xmlns:i="{}">"#,
            "<LockDuration>{}</LockDuration>",
            "<MaxSizeInMegabytes>{}</MaxSizeInMegabytes>",
            "<MaxDeliveryCount>{}</MaxDeliveryCount>",
            "<EnableBatchedOperations>{}</EnableBatchedOperations>",
            "<EnablePartitioning>{}</EnablePartitioning>",
            "</QueueDescription>"
        ),
        SERVICE_BUS_XMLNS,
        XML_SCHEMA_INSTANCE_XMLNS,
        iso8601_seconds(spec.lock_duration()),
        spec.max_size_in_mb(),
        spec.max_delivery_count(),
        spec.batched_operations_enabled(),
        spec.partitioned()
    )
}

fn topic_description(spec: &TopicSpec) -> String {
    format!(
        concat!(
            r#"<TopicDescription xmlns="{}" xmlns:i="{}">"#,
            "<MaxSizeInMegabytes>{}</MaxSizeInMegabytes>",
            "<EnableBatchedOperations>{}</EnableBatchedOperations>",
            "<EnablePartitioning>{}</EnablePartitioning>",
            "</TopicDescription>"
        ),
        SERVICE_BUS_XMLNS,
        XML_SCHEMA_INSTANCE_XMLNS,
        spec.max_size_in_mb(),
        spec.batched_operations_enabled(),
        spec.partitioned()
    )
}

fn subscription_description(spec: &SubscriptionSpec, forward_to: &str) -> String {
    format!(
        concat!(
            r#"<SubscriptionDescription xmlns="{}" xmlns:i="{}">"#,
            "<LockDuration>{}</LockDuration>",
            "<DeadLetteringOnFilterEvaluationExceptions>{}</DeadLetteringOnFilterEvaluationExceptions>",
            "<MaxDeliveryCount>{}</MaxDeliveryCount>",
            "<EnableBatchedOperations>{}</EnableBatchedOperations>",
            "<ForwardTo>{}</ForwardTo>",
            "</SubscriptionDescription>"
        ),
        SERVICE_BUS_XMLNS,
        XML_SCHEMA_INSTANCE_XMLNS,
        iso8601_seconds(spec.lock_duration()),
        spec.dead_letter_on_filter_evaluation_exception(),
        spec.max_delivery_count(),
        spec.batched_operations_enabled(),
        escape(forward_to)
    )
}

/// Pull `<Detail>` out of the broker's `<Error>` document.
fn error_detail(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);
    let mut in_detail = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => in_detail = e.name().as_ref() == b"Detail",
            Ok(Event::Text(text)) if in_detail => {
                let detail = text.unescape().ok()?;
                let detail = detail.trim();
                return (!detail.is_empty()).then(|| detail.to_string());
            }
            Ok(Event::End(_)) => in_detail = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

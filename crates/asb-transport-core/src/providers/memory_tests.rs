//! Tests for the in-memory broker.

use super::*;
use crate::entity::QueueOptions;

fn name(value: &str) -> EntityName {
    EntityName::new(value).unwrap()
}

fn queue_spec(value: &str) -> QueueSpec {
    QueueSpec::new(name(value), &QueueOptions::default())
}

fn topic_spec(value: &str) -> TopicSpec {
    TopicSpec::new(name(value), &QueueOptions::default())
}

mod management {
    use super::*;

    #[tokio::test]
    async fn test_create_queue_reports_conflict_on_second_call() {
        let broker = InMemoryBroker::new();

        broker.create_queue(&queue_spec("orders")).await.unwrap();
        let second = broker.create_queue(&queue_spec("orders")).await;

        assert!(matches!(second, Err(RemoteError::AlreadyExists { .. })));
        assert!(broker.queue("orders").is_some());
    }

    #[tokio::test]
    async fn test_subscription_gets_default_rule() {
        let broker = InMemoryBroker::new();
        broker.create_queue(&queue_spec("orders")).await.unwrap();
        broker.create_topic(&topic_spec("bundle-1")).await.unwrap();

        let spec = SubscriptionSpec::new(name("bundle-1"), name("orders"), name("orders"));
        broker.create_subscription(&spec).await.unwrap();

        assert_eq!(
            broker.rules("bundle-1", "orders"),
            Some(vec![DEFAULT_RULE_NAME.to_string()])
        );
    }

    #[tokio::test]
    async fn test_subscription_requires_topic_and_forward_target() {
        let broker = InMemoryBroker::new();
        let spec = SubscriptionSpec::new(name("bundle-1"), name("orders"), name("orders"));

        let without_topic = broker.create_subscription(&spec).await;
        assert!(matches!(without_topic, Err(RemoteError::NotFound { .. })));

        broker.create_topic(&topic_spec("bundle-1")).await.unwrap();
        let without_queue = broker.create_subscription(&spec).await;
        assert!(matches!(
            without_queue,
            Err(RemoteError::Other {
                status: Some(400),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_rule_removes_existing_rule_once() {
        let broker = InMemoryBroker::new();
        broker.create_queue(&queue_spec("orders")).await.unwrap();
        broker.create_topic(&topic_spec("bundle-1")).await.unwrap();
        let spec = SubscriptionSpec::new(name("bundle-1"), name("orders"), name("orders"));
        broker.create_subscription(&spec).await.unwrap();

        broker
            .delete_rule(&name("bundle-1"), &name("orders"), DEFAULT_RULE_NAME)
            .await
            .unwrap();
        assert_eq!(broker.rules("bundle-1", "orders"), Some(vec![]));

        let again = broker
            .delete_rule(&name("bundle-1"), &name("orders"), DEFAULT_RULE_NAME)
            .await;
        assert!(matches!(again, Err(RemoteError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_missing_rule_and_queue_report_not_found() {
        let broker = InMemoryBroker::new();

        let rule = broker
            .delete_rule(&name("bundle-1"), &name("orders"), DEFAULT_RULE_NAME)
            .await;
        assert!(matches!(rule, Err(RemoteError::NotFound { .. })));

        let queue = broker.delete_queue(&name("orders")).await;
        assert!(matches!(queue, Err(RemoteError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once_and_is_journaled() {
        let broker = InMemoryBroker::new();
        broker.fail_next(BrokerOperation::CreateQueue, RemoteError::other("quota"));

        let first = broker.create_queue(&queue_spec("orders")).await;
        let second = broker.create_queue(&queue_spec("orders")).await;

        assert_eq!(first, Err(RemoteError::other("quota")));
        assert!(second.is_ok());
        assert_eq!(
            broker.calls(),
            vec![
                BrokerCall {
                    operation: BrokerOperation::CreateQueue,
                    entity: "orders".to_string()
                };
                2
            ]
        );
    }
}

mod messages {
    use super::*;

    async fn broker_with_message() -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.create_queue(&queue_spec("orders")).await.unwrap();
        broker.enqueue("orders", "msg-1").unwrap();
        broker
    }

    #[tokio::test]
    async fn test_receive_locks_message() {
        let broker = broker_with_message().await;

        let received = broker.receive("orders").expect("message available");

        assert_eq!(received.message_id(), "msg-1");
        assert_eq!(received.entity_path(), "orders");
        assert_eq!(received.delivery_count(), 1);
        assert_eq!(broker.active_message_count("orders"), 0);
        assert_eq!(broker.locked_message_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_removes_message() {
        let broker = broker_with_message().await;
        let received = broker.receive("orders").unwrap();

        broker
            .complete_message(&received, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(broker.locked_message_count(), 0);
        assert!(broker.receive("orders").is_none());
    }

    #[tokio::test]
    async fn test_abandon_makes_message_available_again() {
        let broker = broker_with_message().await;
        let received = broker.receive("orders").unwrap();

        broker
            .abandon_message(&received, &CancellationToken::new())
            .await
            .unwrap();

        let redelivered = broker.receive("orders").expect("redelivered");
        assert_eq!(redelivered.message_id(), "msg-1");
        assert_eq!(redelivered.delivery_count(), 2);
        assert_ne!(redelivered.lock_token(), received.lock_token());
    }

    #[tokio::test]
    async fn test_settling_twice_reports_lost_lock() {
        let broker = broker_with_message().await;
        let received = broker.receive("orders").unwrap();
        let token = CancellationToken::new();

        broker.complete_message(&received, &token).await.unwrap();
        let again = broker.complete_message(&received, &token).await;

        assert!(matches!(again, Err(RemoteError::NotFound { .. })));
    }

    #[test]
    fn test_enqueue_requires_existing_queue() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.enqueue("missing", "msg-1"),
            Err(RemoteError::NotFound { .. })
        ));
    }
}

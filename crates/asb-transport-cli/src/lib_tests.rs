//! Tests for the asb-transport-cli library module.

use super::*;
use asb_transport_core::InMemoryBroker;
use std::sync::Arc;

fn no_queue_args() -> QueueArgs {
    QueueArgs {
        size: None,
        partitioned: false,
    }
}

fn in_memory() -> (Arc<InMemoryBroker>, ProvisioningOrchestrator<Arc<InMemoryBroker>>) {
    let broker = Arc::new(InMemoryBroker::new());
    (broker.clone(), ProvisioningOrchestrator::new(broker))
}

mod parsing {
    use super::*;

    #[test]
    fn test_endpoint_create_parses_all_options() {
        let cli = Cli::try_parse_from([
            "asb-transport",
            "endpoint",
            "create",
            "orders",
            "-c",
            "Endpoint=sb://contoso.servicebus.windows.net/",
            "-s",
            "10",
            "-p",
            "-t",
            "sales",
            "-b",
            "orders-sub",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Endpoint {
                action:
                    Some(EndpointCommands::Create {
                        name,
                        connection,
                        queue,
                        topic,
                        subscription,
                    }),
            }) => {
                assert_eq!(name, "orders");
                assert_eq!(
                    connection.connection_string.as_deref(),
                    Some("Endpoint=sb://contoso.servicebus.windows.net/")
                );
                assert_eq!(queue.size, Some(10));
                assert!(queue.partitioned);
                assert_eq!(topic.as_deref(), Some("sales"));
                assert_eq!(subscription.as_deref(), Some("orders-sub"));
            }
            other => panic!("Expected endpoint create, got {:?}", other),
        }
    }

    #[test]
    fn test_group_without_action_parses() {
        let cli = Cli::try_parse_from(["asb-transport", "queue"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Queue { action: None })));

        let cli = Cli::try_parse_from(["asb-transport"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags_are_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "asb-transport",
            "queue",
            "delete",
            "orders",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.json_logs);
    }

    #[test]
    fn test_negative_size_is_a_usage_error() {
        let result = Cli::try_parse_from(["asb-transport", "queue", "create", "orders", "-s", "-1"]);
        assert!(result.is_err());
    }
}

mod resolution {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let topology = resolve_endpoint("orders", &no_queue_args(), None, None).unwrap();

        assert_eq!(topology.queue().max_size_in_mb(), 5120);
        assert_eq!(topology.topic().name().as_str(), "bundle-1");
        assert_eq!(topology.subscription().name().as_str(), "orders");
        assert_eq!(topology.subscription().forward_to().as_str(), "orders");
    }

    #[test]
    fn test_invalid_names_are_invalid_arguments() {
        let err = resolve_endpoint("bad!name", &no_queue_args(), None, None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "name"));

        let err = resolve_endpoint("orders", &no_queue_args(), Some("-sales"), None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "--topic"));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_long_endpoint_name_needs_explicit_subscription() {
        let endpoint = "a".repeat(60);

        let err = resolve_endpoint(&endpoint, &no_queue_args(), None, None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "name"));

        let topology =
            resolve_endpoint(&endpoint, &no_queue_args(), None, Some("short-sub")).unwrap();
        assert_eq!(topology.subscription().name().as_str(), "short-sub");
    }

    #[test]
    fn test_slash_in_subscription_is_invalid_argument() {
        let err = resolve_endpoint("billing/invoices", &no_queue_args(), None, None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "name"));

        let err = resolve_endpoint("orders", &no_queue_args(), None, Some("a/b")).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "--subscription"));

        let err = resolve_queue("sales/../orders", &no_queue_args()).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "name"));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let args = QueueArgs {
            size: Some(0),
            partitioned: false,
        };

        let err = resolve_queue("orders", &args).unwrap_err();

        assert!(matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "--size"));
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_create_on_fresh_namespace() {
        let (broker, orchestrator) = in_memory();
        let args = QueueArgs {
            size: Some(10),
            partitioned: true,
        };
        let topology = resolve_endpoint("orders", &args, Some("sales"), Some("orders-sub")).unwrap();
        let mut out = Vec::new();

        execute_endpoint_create(&orchestrator, &topology, &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Endpoint 'orders' is ready.\n");
        assert_eq!(broker.queue("orders").unwrap().max_size_in_mb(), 10240);
        assert!(broker.topic("sales").unwrap().partitioned());
        assert_eq!(broker.rules("sales", "orders-sub"), Some(vec![]));
    }

    #[tokio::test]
    async fn test_endpoint_create_rerun_prints_notes() {
        let (_broker, orchestrator) = in_memory();
        let topology = resolve_endpoint("orders", &no_queue_args(), None, None).unwrap();
        execute_endpoint_create(&orchestrator, &topology, &mut Vec::new())
            .await
            .unwrap();
        let mut out = Vec::new();

        execute_endpoint_create(&orchestrator, &topology, &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Queue already exists, skipping creation\n\
             Topic already exists, skipping creation\n\
             Subscription already exists, skipping creation\n\
             Endpoint 'orders' is ready.\n"
        );
    }

    #[tokio::test]
    async fn test_queue_create_reports_resolved_settings() {
        let (_broker, orchestrator) = in_memory();
        let args = QueueArgs {
            size: Some(10),
            partitioned: true,
        };
        let spec = resolve_queue("orders", &args).unwrap();
        let mut out = Vec::new();

        execute_queue_create(&orchestrator, &spec, &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Queue name 'orders', size '10GB', partitioned 'true' created\n"
        );
    }

    #[tokio::test]
    async fn test_queue_delete_and_missing_queue() {
        let (broker, orchestrator) = in_memory();
        let spec = resolve_queue("orders", &no_queue_args()).unwrap();
        execute_queue_create(&orchestrator, &spec, &mut Vec::new())
            .await
            .unwrap();
        let mut out = Vec::new();

        execute_queue_delete(&orchestrator, spec.name(), &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Queue name 'orders' deleted\n");
        assert!(broker.queue("orders").is_none());

        let err = execute_queue_delete(&orchestrator, spec.name(), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Provisioning(_)));
        assert_eq!(err.exit_code(), 2);
    }
}

mod entry_point {
    use super::*;

    #[tokio::test]
    async fn test_missing_subcommand_prints_help() {
        let mut out = Vec::new();

        let err = run(["asb-transport"], &mut out).await.unwrap_err();

        let output = String::from_utf8(out).unwrap();
        assert!(matches!(err, CliError::MissingSubcommand));
        assert_eq!(err.exit_code(), 1);
        assert!(output.starts_with("Specify a subcommand\n"));
        assert!(output.contains("Usage: asb-transport"));
    }

    #[tokio::test]
    async fn test_missing_group_subcommand_prints_group_help() {
        let mut out = Vec::new();

        let err = run(["asb-transport", "endpoint"], &mut out).await.unwrap_err();

        let output = String::from_utf8(out).unwrap();
        assert!(matches!(err, CliError::MissingSubcommand));
        assert!(output.contains("Usage: asb-transport endpoint"));
        assert!(output.contains("create"));
    }

    #[tokio::test]
    async fn test_help_flag_succeeds() {
        let mut out = Vec::new();

        run(["asb-transport", "--help"], &mut out).await.unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("endpoint"));
        assert!(output.contains("queue"));
    }

    #[tokio::test]
    async fn test_unknown_flag_is_usage_error() {
        let err = run(["asb-transport", "queue", "create", "orders", "--bogus"], &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Usage(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_malformed_connection_string_is_invalid_argument() {
        let err = run(
            ["asb-transport", "queue", "delete", "orders", "-c", "not-a-connection-string"],
            &mut Vec::new(),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, CliError::InvalidArgument { ref arg, .. } if arg == "--connection-string")
        );
    }
}

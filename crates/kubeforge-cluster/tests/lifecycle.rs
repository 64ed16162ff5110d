//! End-to-end lifecycle tests: manager + real providers + mock executor

use std::sync::Arc;
use std::time::Duration;

use kubeforge_cluster::{
    CancellationToken, ClusterManager, CommandResult, CreateOutcome, ExponentialBackoffPolicy,
    K3dOptions, KindOptions, MockExecutor, RetryingExecutor,
};
use kubeforge_core::{ClusterConfig, ClusterError, ClusterType};

const ONE_CLUSTER: &str = r#"[{"name":"dev","serversCount":"1","serversRunning":"1","agentsCount":"2","agentsRunning":"2","image":"rancher/k3s:v1.31.5-k3s1"}]"#;

fn manager(mock: &MockExecutor) -> ClusterManager {
    ClusterManager::with_default_providers(
        Arc::new(mock.clone()),
        K3dOptions::default(),
        KindOptions::default(),
    )
}

/// Only k3d answers `version`; kind is not installed
fn k3d_only() -> MockExecutor {
    let mock = MockExecutor::new();
    mock.missing_binary("kind ");
    mock
}

mod status {
    use super::*;

    #[tokio::test]
    async fn test_missing_cluster_is_wrapped_not_found() {
        let mock = k3d_only();
        mock.respond_ok("cluster list", "[]");
        let ctx = CancellationToken::new();

        let err = manager(&mock)
            .get_cluster_status(&ctx, "missing-cluster")
            .await
            .unwrap_err();

        match &err {
            ClusterError::Operation { verb, name, source } => {
                assert_eq!(verb, "status");
                assert_eq!(name, "missing-cluster");
                assert!(matches!(**source, ClusterError::ClusterNotFound { .. }));
            }
            other => panic!("expected Operation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_cluster_status() {
        let mock = k3d_only();
        mock.respond_ok("cluster list", ONE_CLUSTER);
        let ctx = CancellationToken::new();

        let info = manager(&mock).get_cluster_status(&ctx, "dev").await.unwrap();
        assert_eq!(info.cluster_type, ClusterType::K3D);
        assert_eq!(info.node_count, 3);
        assert_eq!(info.status, "1/1");
        assert!(info.is_ready());
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_runs_k3d_once_then_is_noop() {
        let mock = k3d_only();
        mock.respond_sequence(
            "cluster list",
            vec![CommandResult::ok("[]"), CommandResult::ok(ONE_CLUSTER)],
        );
        let ctx = CancellationToken::new();
        let manager = manager(&mock);
        let config = ClusterConfig::new("dev", ClusterType::K3D);

        assert_eq!(manager.create_cluster(&ctx, &config).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            manager.create_cluster(&ctx, &config).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(mock.count_matching("k3d cluster create"), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_runs_nothing() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();

        let config = ClusterConfig::new("", ClusterType::K3D);
        let err = manager(&mock).create_cluster(&ctx, &config).await.unwrap_err();

        assert!(matches!(err, ClusterError::InvalidConfig { .. }));
        assert_eq!(mock.command_count(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_stderr() {
        let mock = k3d_only();
        mock.respond_err("cluster create", "FATA[0000] Failed to create cluster 'dev'");
        let ctx = CancellationToken::new();

        let err = manager(&mock)
            .create_cluster(&ctx, &ClusterConfig::new("dev", ClusterType::K3D))
            .await
            .unwrap_err();

        assert_eq!(err.verb(), Some("create"));
        assert!(err.to_string().contains("Failed to create cluster 'dev'"));
    }
}

mod detect {
    use super::*;

    #[tokio::test]
    async fn test_detects_kind_when_k3d_does_not_know_the_name() {
        let mock = MockExecutor::new();
        mock.respond_err("k3d cluster get", "No nodes found for given cluster")
            .respond_ok("kind get clusters", "dev\n");
        let ctx = CancellationToken::new();

        let detected = manager(&mock).detect_cluster_type(&ctx, "dev").await.unwrap();
        assert_eq!(detected, ClusterType::KIND);
    }

    #[tokio::test]
    async fn test_no_provider_knows_the_name() {
        let mock = k3d_only();
        mock.respond_err("k3d cluster get", "No nodes found for given cluster");
        let ctx = CancellationToken::new();

        let err = manager(&mock).detect_cluster_type(&ctx, "ghost").await.unwrap_err();
        assert!(matches!(err, ClusterError::ClusterNotFound { ref name } if name == "ghost"));
    }

    #[tokio::test]
    async fn test_interrupted_lookups_report_cancelled() {
        let mock = MockExecutor::new();
        mock.respond_ok("k3d cluster list", ONE_CLUSTER);
        let ctx = CancellationToken::new();
        ctx.cancel();
        let manager = manager(&mock);

        let err = manager.detect_cluster_type(&ctx, "dev").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_not_found());

        let err = manager.get_cluster_status(&ctx, "dev").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_not_found());

        assert!(manager.list_clusters(&ctx).await.unwrap_err().is_cancelled());
        assert_eq!(mock.command_count(), 0);
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn test_list_all_survives_broken_backend() {
        let mock = MockExecutor::new();
        mock.respond_ok("k3d cluster list", ONE_CLUSTER)
            .respond_err("kind get clusters", "ERROR: failed to list clusters");
        let ctx = CancellationToken::new();

        let clusters = manager(&mock).list_all_clusters(&ctx).await;
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name, "dev");
    }
}

mod retrying {
    use super::*;

    #[tokio::test]
    async fn test_transient_list_failure_is_retried_below_the_manager() {
        let mock = k3d_only();
        mock.respond_sequence(
            "cluster list",
            vec![
                CommandResult::failed(1, "Cannot connect: connection refused"),
                CommandResult::ok(ONE_CLUSTER),
            ],
        );
        let policy = ExponentialBackoffPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
            .with_jitter(false);
        let executor = RetryingExecutor::new(mock.clone(), policy);
        let manager = ClusterManager::with_default_providers(
            Arc::new(executor),
            K3dOptions::default(),
            KindOptions::default(),
        );
        let ctx = CancellationToken::new();

        let info = manager.get_cluster_status(&ctx, "dev").await.unwrap();
        assert_eq!(info.name, "dev");
        assert_eq!(mock.count_matching("cluster list"), 2);
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_everything() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = manager(&mock)
            .create_cluster(&ctx, &ClusterConfig::new("dev", ClusterType::K3D))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!mock.was_executed("cluster create"));
    }
}

//! Integration tests for start, stop, restart, remove and status refresh of
//! installed instances.

mod common;

use berth_core::runtime::RuntimeStatus;
use berth_core::{
    BerthError, ContainerRuntime, ContainerStatus, FixedResolver, InstallOptions, InstanceStatus,
    RemoveOptions,
};
use common::{fixture, fixture_with, Fixture, RecordingRegistrar};
use std::sync::Arc;

async fn install(fx: &Fixture, service: &str) {
    fx.orchestrator.install(InstallOptions::new(service), &FixedResolver::default()).await.unwrap();
}

#[tokio::test]
async fn test_stop_and_start_single_container() {
    let fx = fixture().await;
    install(&fx, "cache").await;

    let stopped = fx.orchestrator.stop("cache-7").await.unwrap();
    assert_eq!(stopped.status, InstanceStatus::Stopped);
    assert_eq!(fx.runtime.calls_of("stop"), vec!["berth-cache-7"]);

    let started = fx.orchestrator.start("cache-7").await.unwrap();
    assert_eq!(started.status, InstanceStatus::Running);
    assert_eq!(fx.state.get_instance("cache-7").await.unwrap().status, InstanceStatus::Running);
}

#[tokio::test]
async fn test_multi_container_stop_reverse_start_forward() {
    let fx = fixture().await;
    install(&fx, "tracing").await;
    let installed_starts = fx.runtime.calls_of("start").len();

    let stopped = fx.orchestrator.stop("tracing-1.57").await.unwrap();
    assert_eq!(stopped.status, InstanceStatus::Stopped);
    assert!(stopped.containers.iter().all(|c| c.status == ContainerStatus::Stopped));
    assert_eq!(
        fx.runtime.calls_of("stop"),
        vec!["berth-tracing-1.57-collector", "berth-tracing-1.57-query"]
    );

    fx.orchestrator.start("tracing-1.57").await.unwrap();
    let starts = fx.runtime.calls_of("start");
    assert_eq!(
        &starts[installed_starts..],
        &["berth-tracing-1.57-query".to_string(), "berth-tracing-1.57-collector".to_string()]
    );
}

#[tokio::test]
async fn test_restart() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    install(&fx, "tracing").await;

    fx.orchestrator.restart("cache-7").await.unwrap();
    assert_eq!(fx.runtime.calls_of("restart"), vec!["berth-cache-7"]);

    let instance = fx.orchestrator.restart("tracing-1.57").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(fx.runtime.calls_of("restart").len(), 1);
    assert_eq!(
        fx.runtime.calls_of("stop"),
        vec!["berth-tracing-1.57-collector", "berth-tracing-1.57-query"]
    );
}

#[tokio::test]
async fn test_remove_multi_container_in_reverse_order() {
    let fx = fixture().await;
    install(&fx, "tracing").await;

    let report = fx.orchestrator.remove("tracing-1.57", RemoveOptions::default()).await.unwrap();

    assert_eq!(report.removed_containers, 2);
    assert_eq!(report.removed_volumes, vec!["berth-tracing-1.57-badger"]);
    assert!(report.warnings.is_empty());
    assert_eq!(
        fx.runtime.calls_of("remove"),
        vec!["berth-tracing-1.57-collector", "berth-tracing-1.57-query"]
    );
    assert!(fx.runtime.container_names().is_empty());
    assert!(fx.runtime.volumes().is_empty());
    assert!(fx.state.find_instance("tracing-1.57").await.unwrap().is_none());
    assert!(fx.state.get_env_snapshot("tracing-1.57").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_keep_volumes() {
    let fx = fixture().await;
    install(&fx, "cache").await;

    let report = fx
        .orchestrator
        .remove("cache-7", RemoveOptions { keep_volumes: true })
        .await
        .unwrap();

    assert!(report.removed_volumes.is_empty());
    assert_eq!(fx.runtime.volumes(), vec!["berth-cache-7-data"]);
    assert!(fx.state.get_env_snapshot("cache-7").await.unwrap().is_some());
    assert!(fx.state.find_instance("cache-7").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_leaves_longer_named_instance_volumes() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    fx.orchestrator
        .install(InstallOptions::new("cache").new_instance(), &FixedResolver::default())
        .await
        .unwrap();

    fx.orchestrator.remove("cache-7", RemoveOptions::default()).await.unwrap();

    assert_eq!(fx.runtime.volumes(), vec!["berth-cache-7-2-data"]);
    assert!(fx.state.find_instance("cache-7-2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_stop_failure_is_a_warning() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    fx.runtime.fail_on("stop", "berth-cache-7");

    let report = fx.orchestrator.remove("cache-7", RemoveOptions::default()).await.unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("berth-cache-7"));
    assert_eq!(report.removed_containers, 1);
    assert!(fx.state.find_instance("cache-7").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_container_failure_keeps_record() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    fx.runtime.fail_on("remove", "berth-cache-7");

    let err = fx.orchestrator.remove("cache-7", RemoveOptions::default()).await.unwrap_err();

    assert!(matches!(err, BerthError::Runtime { .. }));
    assert!(fx.state.find_instance("cache-7").await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_unregisters_hostname() {
    let registrar = Arc::new(RecordingRegistrar::default());
    let fx = fixture_with(registrar.clone()).await;
    install(&fx, "cache").await;
    assert!(registrar.hosts.lock().unwrap().contains_key("cache-7"));

    fx.orchestrator.remove("cache-7", RemoveOptions::default()).await.unwrap();

    assert!(registrar.hosts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_operations_on_missing_instance() {
    let fx = fixture().await;

    assert!(matches!(
        fx.orchestrator.start("ghost").await,
        Err(BerthError::InstanceNotFound { .. })
    ));
    assert!(matches!(
        fx.orchestrator.remove("ghost", RemoveOptions::default()).await,
        Err(BerthError::InstanceNotFound { .. })
    ));
    assert!(matches!(
        fx.orchestrator.status("ghost").await,
        Err(BerthError::InstanceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_status_of_vanished_container_is_unknown() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    fx.runtime.set_status("berth-cache-7", RuntimeStatus::Exited);

    let instance = fx.orchestrator.status("cache-7").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Stopped);

    // Container deleted behind our back
    let id = instance.container_id.clone().unwrap();
    fx.runtime.remove_container(&id, true).await.unwrap();

    let instance = fx.orchestrator.status("cache-7").await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Unknown);
}

#[tokio::test]
async fn test_refresh_all_reports_every_instance() {
    let fx = fixture().await;
    install(&fx, "tracing").await;
    install(&fx, "cache").await;
    fx.runtime.set_status("berth-cache-7", RuntimeStatus::Exited);

    let instances = fx.orchestrator.refresh_all().await.unwrap();

    let summary: Vec<(&str, InstanceStatus)> =
        instances.iter().map(|i| (i.name.as_str(), i.status)).collect();
    assert_eq!(
        summary,
        vec![("cache-7", InstanceStatus::Stopped), ("tracing-1.57", InstanceStatus::Running)]
    );
    assert_eq!(fx.orchestrator.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_operations_on_different_instances() {
    let fx = fixture().await;
    install(&fx, "cache").await;
    install(&fx, "tracing").await;

    let a = fx.orchestrator.clone();
    let b = fx.orchestrator.clone();
    let (cache, tracing) = tokio::join!(a.stop("cache-7"), b.stop("tracing-1.57"));

    assert_eq!(cache.unwrap().status, InstanceStatus::Stopped);
    assert_eq!(tracing.unwrap().status, InstanceStatus::Stopped);
}

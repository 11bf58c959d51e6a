//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "tests"
//! ws_type: "source"
//! ws_scope: "test"
//! ws_description: "Operator lifecycle commands against recording collaborators."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
mod support;

use std::time::Duration;

use support::Harness;
use worldshift_cluster::{InstanceReadiness, UpdatePlan};
use worldshift_core::{LifecycleError, LifecycleRunner, LifecycleSettings};

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        countdown: vec![30, 20, 10, 5],
        backup_on_stop: true,
        ready_timeout: Duration::from_secs(300),
        settle: Duration::from_secs(10),
        restart_pause: Duration::from_secs(10),
    }
}

fn runner(harness: &Harness) -> LifecycleRunner {
    LifecycleRunner::new(harness.cluster.clone(), settings())
        .with_publisher(harness.publisher.clone())
        .with_console(harness.console.clone())
        .with_world_sync(harness.sync.clone())
        .with_registry(harness.registry.clone())
}

#[tokio::test(start_paused = true)]
async fn stop_refuses_while_players_are_online() {
    let harness = Harness::new(1);
    harness.console.join("Alex");
    let err = runner(&harness).stop(false).await.unwrap_err();

    match err {
        LifecycleError::PlayersOnline { online, names } => {
            assert_eq!(online, 1);
            assert_eq!(names, vec!["Alex"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.cluster.replica_count(), 1);
    assert!(!harness.log.contains("set_replica_count(0)"));
}

#[tokio::test(start_paused = true)]
async fn forced_stop_warns_backs_up_saves_then_scales_down() {
    let harness = Harness::new(1);
    harness.console.join("Alex");
    let started = tokio::time::Instant::now();
    let outcome = runner(&harness).stop(true).await.unwrap();

    assert!(outcome.backed_up);
    assert!(outcome.saved);
    let calls = harness.log.calls();
    let expected_tail = [
        "broadcast(Server shutting down in 30 seconds!)",
        "save_world",
        "sync_to_backup(mc-0)",
        "broadcast(Server shutting down in 20 seconds!)",
        "broadcast(Server shutting down in 10 seconds!)",
        "broadcast(Server shutting down in 5 seconds!)",
        "save_world",
        "set_replica_count(0)",
    ];
    assert_eq!(&calls[calls.len() - expected_tail.len()..], expected_tail);
    assert_eq!(harness.cluster.replica_count(), 0);
    // countdown, flush pause and settle delay
    assert!(started.elapsed() >= Duration::from_secs(30 + 2 + 10));
}

#[tokio::test(start_paused = true)]
async fn stopping_a_stopped_server_is_a_no_op() {
    let harness = Harness::new(0);
    let outcome = runner(&harness).stop(false).await.unwrap();
    assert!(outcome.already_stopped);
    assert_eq!(harness.log.calls(), vec!["get_replica_count".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn start_scales_up_and_waits_for_primary() {
    let harness = Harness::new(0);
    let outcome = runner(&harness).start().await.unwrap();

    assert!(!outcome.already_running);
    assert!(outcome.confirmed);
    assert_eq!(outcome.players.unwrap().online, 0);
    assert_eq!(
        harness.log.calls(),
        vec![
            "get_replica_count".to_owned(),
            "set_replica_count(1)".to_owned(),
            "wait_ready(mc-0)".to_owned(),
        ]
    );

    let again = runner(&harness).start().await.unwrap();
    assert!(again.already_running);
}

#[tokio::test(start_paused = true)]
async fn restart_publishes_before_cycling() {
    let harness = Harness::new(1);
    let plan = UpdatePlan::new(1).with_override("image.tag", "1.21.4");
    let outcome = runner(&harness)
        .restart(Some(&plan.release_values(1)), false)
        .await
        .unwrap();

    assert!(!outcome.already_running);
    let at = |call: &str| harness.log.position(call).unwrap();
    assert!(at("publish(replicaCount=1)") < at("set_replica_count(0)"));
    assert!(at("set_replica_count(0)") < at("set_replica_count(1)"));
    assert_eq!(harness.cluster.replica_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_pauses_between_stop_and_start() {
    let elapsed_with = |pause: Duration| async move {
        let harness = Harness::new(1);
        let runner = LifecycleRunner::new(
            harness.cluster.clone(),
            LifecycleSettings {
                restart_pause: pause,
                ..settings()
            },
        )
        .with_console(harness.console.clone())
        .with_registry(harness.registry.clone());
        let started = tokio::time::Instant::now();
        runner.restart(None, false).await.unwrap();
        assert_eq!(harness.cluster.replica_count(), 1);
        started.elapsed()
    };

    let paused = elapsed_with(Duration::from_secs(10)).await;
    let immediate = elapsed_with(Duration::ZERO).await;
    assert!(paused >= immediate + Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn failed_publish_aborts_restart_unless_forced() {
    let harness = Harness::new(1);
    harness.publisher.reject();
    let values = UpdatePlan::new(1).release_values(1);

    let err = runner(&harness)
        .restart(Some(&values), false)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Publish(_)));
    assert_eq!(harness.cluster.replica_count(), 1);

    runner(&harness).restart(Some(&values), true).await.unwrap();
    assert!(harness.log.contains("set_replica_count(0)"));
}

#[tokio::test(start_paused = true)]
async fn status_reports_instances_and_players() {
    let harness = Harness::new(1);
    harness.console.join("Steve");
    let status = runner(&harness).status().await.unwrap();

    assert!(status.running());
    assert_eq!(status.workload, "games/mc");
    assert_eq!(status.instances.len(), 1);
    assert_eq!(status.instances[0].instance, "mc-0");
    assert_eq!(status.instances[0].readiness, InstanceReadiness::Ready);
    assert_eq!(status.players.unwrap().names, vec!["Steve"]);
}

#[tokio::test(start_paused = true)]
async fn backup_requires_a_sync_agent() {
    let harness = Harness::new(1);
    runner(&harness).backup().await.unwrap();
    assert_eq!(harness.log.count("sync_to_backup(mc-0)"), 1);

    let bare = LifecycleRunner::new(harness.cluster.clone(), settings())
        .with_registry(harness.registry.clone());
    assert!(matches!(
        bare.backup().await,
        Err(LifecycleError::MissingWorldSync)
    ));
}

#[tokio::test(start_paused = true)]
async fn lifecycle_commands_respect_running_sessions() {
    let harness = Harness::new(1);
    let _session = harness.registry.begin(&harness.workload()).unwrap();
    assert!(matches!(
        runner(&harness).stop(true).await,
        Err(LifecycleError::SessionInProgress(_))
    ));
}

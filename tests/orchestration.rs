//! Save-and-apply behaviour against an in-memory worker runtime.

use std::fs;
use std::time::Duration;

use trader_control::config::settings::WorkerSettings;
use trader_control::config::store::SnapshotOrigin;
use trader_control::orchestration::{ApplyOutcome, OrchestrationError, OrchestrationState, Step};
use trader_control::workers::status::StackStatus;
use trader_control::workers::{WorkerId, WorkerState};

mod common;

use common::{edited_config, Call, Fixture, Op};

fn ids(names: &[&str]) -> Vec<WorkerId> {
    names.iter().map(|n| WorkerId::from(*n)).collect()
}

#[tokio::test]
async fn test_apply_pauses_persists_unpauses_and_signals() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running), ("orchestrator", WorkerState::Running)]);
    let original = fs::read_to_string(fx.persistence.path()).unwrap();

    let report = fx.controller.save_and_apply(edited_config(7)).await.unwrap();

    assert_eq!(report.outcome, ApplyOutcome::Applied);
    assert!(report.errors.is_empty());
    assert_eq!(report.paused, ids(&["scanner", "orchestrator"]));
    assert_eq!(report.unpaused, ids(&["scanner", "orchestrator"]));
    assert_eq!(report.signaled, ids(&["scanner", "orchestrator"]));

    // Every pause precedes every unpause, which precedes every signal.
    let ops: Vec<Op> = fx.registry.calls().iter().filter_map(Call::op).collect();
    assert_eq!(
        ops,
        vec![Op::Pause, Op::Pause, Op::Unpause, Op::Unpause, Op::Signal, Op::Signal]
    );
    assert!(fx
        .registry
        .calls()
        .iter()
        .any(|c| *c == Call::Signal("scanner".into(), "SIGUSR1".into())));

    let snapshot = fx.store.get().unwrap();
    assert_eq!(snapshot.config, edited_config(7));
    assert_eq!(snapshot.origin, SnapshotOrigin::Orchestrated);
    assert_eq!(report.version, Some(snapshot.version));

    let backups = fx.persistence.list_backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(&backups[0].path).unwrap(), original);
    assert_eq!(report.backup.as_ref().map(|b| b.name.as_str()), Some(backups[0].name.as_str()));

    let status = fx.aggregator().poll().await;
    assert_eq!(status.status, StackStatus::Running);
    assert_eq!(fx.controller.state(), OrchestrationState::Idle);
}

#[tokio::test]
async fn test_failed_write_unpauses_and_keeps_previous_config() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running), ("orchestrator", WorkerState::Running)]);
    let before = fx.store.get().unwrap();
    fx.break_canonical_path();

    let err = fx.controller.save_and_apply(edited_config(7)).await.unwrap_err();

    let report = match &err {
        OrchestrationError::Persistence { report, .. } => report,
        other => panic!("expected persistence failure, got {other:?}"),
    };
    assert_eq!(report.outcome, ApplyOutcome::Failed);
    assert_eq!(report.errors_in(Step::Persist).count(), 1);
    assert_eq!(report.paused, ids(&["scanner", "orchestrator"]));
    assert_eq!(report.unpaused, ids(&["scanner", "orchestrator"]));
    assert!(report.signaled.is_empty());

    assert_eq!(fx.registry.state_of("scanner"), WorkerState::Running);
    assert_eq!(fx.registry.state_of("orchestrator"), WorkerState::Running);
    assert!(fx.registry.targets(Op::Signal).is_empty());

    let after = fx.store.get().unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.config, before.config);
    assert_eq!(fx.controller.last_report().unwrap().id, report.id);
}

#[tokio::test]
async fn test_recovery_unpauses_exactly_the_workers_it_paused() {
    let fx = Fixture::new(&[
        ("scanner", WorkerState::Running),
        ("orchestrator", WorkerState::Running),
        ("reporter", WorkerState::Running),
    ]);
    fx.registry.fail(Op::Pause, "reporter");
    fx.break_canonical_path();

    let err = fx.controller.save_and_apply(edited_config(7)).await.unwrap_err();
    let report = err.report().unwrap();

    assert_eq!(report.paused, ids(&["scanner", "orchestrator"]));
    assert_eq!(report.errors_in(Step::Pause).count(), 1);
    assert_eq!(
        report.errors_in(Step::Pause).next().unwrap().worker,
        Some(WorkerId::from("reporter"))
    );

    let mut unpaused = fx.registry.targets(Op::Unpause);
    unpaused.sort();
    assert_eq!(unpaused, vec!["orchestrator".to_string(), "scanner".to_string()]);
    assert_eq!(fx.registry.state_of("scanner"), WorkerState::Running);
    assert_eq!(fx.registry.state_of("orchestrator"), WorkerState::Running);
}

#[tokio::test]
async fn test_recovery_also_unpauses_workers_whose_pause_timed_out() {
    let fx = Fixture::new(&[
        ("scanner", WorkerState::Running),
        ("orchestrator", WorkerState::Running),
        ("reporter", WorkerState::Running),
    ]);
    fx.registry.delay(Op::Pause, "reporter", Duration::from_secs(30));
    fx.break_canonical_path();

    let started = std::time::Instant::now();
    let err = fx.controller.save_and_apply(edited_config(7)).await.unwrap_err();
    let report = err.report().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.paused, ids(&["scanner", "orchestrator"]));
    let timeout = report.errors_in(Step::Pause).next().unwrap();
    assert_eq!(timeout.worker, Some(WorkerId::from("reporter")));

    // The pause may have landed after the deadline, so reporter is recovered too.
    let mut unpaused = fx.registry.targets(Op::Unpause);
    unpaused.sort();
    assert_eq!(
        unpaused,
        vec!["orchestrator".to_string(), "reporter".to_string(), "scanner".to_string()]
    );
    assert_eq!(report.unpaused, ids(&["scanner", "orchestrator", "reporter"]));
    assert_eq!(report.outcome, ApplyOutcome::Failed);
}

#[tokio::test]
async fn test_individual_worker_failures_are_reported_not_fatal() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running), ("orchestrator", WorkerState::Running)]);
    fx.registry.fail(Op::Pause, "scanner");
    fx.registry.fail(Op::Signal, "orchestrator");

    let report = fx.controller.save_and_apply(edited_config(3)).await.unwrap();

    assert_eq!(report.outcome, ApplyOutcome::AppliedWithErrors);
    assert_eq!(report.errors_in(Step::Pause).count(), 1);
    assert_eq!(report.errors_in(Step::Signal).count(), 1);
    assert_eq!(report.signaled, ids(&["scanner"]));
    assert_eq!(fx.store.get().unwrap().config, edited_config(3));

    // Both attempts of the failing pause were made.
    let scanner_pauses = fx
        .registry
        .targets(Op::Pause)
        .into_iter()
        .filter(|w| w == "scanner")
        .count();
    assert_eq!(scanner_pauses, 2);
}

#[tokio::test]
async fn test_unresponsive_worker_times_out_without_blocking_others() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running), ("orchestrator", WorkerState::Running)]);
    fx.registry.delay(Op::Signal, "scanner", Duration::from_secs(30));

    let started = std::time::Instant::now();
    let report = fx.controller.save_and_apply(edited_config(4)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.signaled, ids(&["orchestrator"]));
    let timeout = report.errors_in(Step::Signal).next().unwrap();
    assert_eq!(timeout.worker, Some(WorkerId::from("scanner")));
    assert!(timeout.message.contains("did not respond"));
}

#[tokio::test]
async fn test_concurrent_apply_is_rejected_as_busy() {
    let settings = WorkerSettings {
        operation_timeout_ms: 2_000,
        ..common::fast_worker_settings()
    };
    let fx = Fixture::with_settings(&[("scanner", WorkerState::Running)], settings);
    fx.registry.delay(Op::Pause, "scanner", Duration::from_millis(300));

    let controller = fx.controller.clone();
    let first = tokio::spawn(async move { controller.save_and_apply(edited_config(2)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(fx.controller.state(), OrchestrationState::Idle);
    let second = fx.controller.save_and_apply(edited_config(3)).await;
    assert!(matches!(second, Err(OrchestrationError::Busy)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.outcome, ApplyOutcome::Applied);
    assert_eq!(fx.store.get().unwrap().config, edited_config(2));
    assert_eq!(fx.registry.targets(Op::Pause), vec!["scanner".to_string()]);
    assert_eq!(fx.controller.state(), OrchestrationState::Idle);
}

#[tokio::test]
async fn test_zero_workers_still_saves() {
    let fx = Fixture::new(&[]);

    let report = fx.controller.save_and_apply(edited_config(9)).await.unwrap();

    assert_eq!(report.outcome, ApplyOutcome::Applied);
    assert!(report.paused.is_empty() && report.unpaused.is_empty() && report.signaled.is_empty());
    assert_eq!(fx.store.get().unwrap().config, edited_config(9));
    assert_eq!(fx.persistence.load().unwrap().config, edited_config(9));
}

#[tokio::test]
async fn test_runtime_unavailable_aborts_before_persisting() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running)]);
    fx.registry.set_unavailable(true);
    let before = fx.store.get().unwrap();

    let err = fx.controller.save_and_apply(edited_config(9)).await.unwrap_err();

    assert!(matches!(err, OrchestrationError::RuntimeUnavailable { .. }));
    assert_eq!(err.report().unwrap().errors_in(Step::Discover).count(), 1);
    assert_eq!(fx.store.get().unwrap().version, before.version);
    assert_eq!(fx.persistence.load().unwrap().config, before.config);
    assert!(fx.persistence.list_backups().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_config_never_touches_workers() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running)]);
    let mut config = edited_config(5);
    config.trading.mode = "yolo".to_string();

    let err = fx.controller.save_and_apply(config).await.unwrap_err();

    match err {
        OrchestrationError::Invalid(errors) => assert_eq!(errors[0].field, "trading.mode"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(fx.registry.calls().is_empty());
    assert!(fx.controller.last_report().is_none());
}

#[tokio::test]
async fn test_paused_and_stopped_workers() {
    let fx = Fixture::new(&[
        ("scanner", WorkerState::Running),
        ("orchestrator", WorkerState::Paused),
        ("backfill", WorkerState::Stopped),
    ]);

    let report = fx.controller.save_and_apply(edited_config(6)).await.unwrap();

    // Already-paused workers are not re-paused; stopped ones are left alone.
    assert_eq!(fx.registry.targets(Op::Pause), vec!["scanner".to_string()]);
    assert_eq!(report.unpaused, ids(&["scanner", "orchestrator"]));
    assert_eq!(report.signaled, ids(&["scanner", "orchestrator"]));
    assert_eq!(fx.registry.state_of("backfill"), WorkerState::Stopped);
    assert!(!fx.registry.targets(Op::Signal).contains(&"backfill".to_string()));
}

#[tokio::test]
async fn test_restore_backup_reapplies_previous_document() {
    let fx = Fixture::new(&[("scanner", WorkerState::Running)]);
    let original = fx.store.get().unwrap().config.clone();

    let report = fx.controller.save_and_apply(edited_config(8)).await.unwrap();
    let backup = report.backup.unwrap();

    let restored = fx.controller.restore_backup(&backup.name).await.unwrap();
    assert_eq!(restored.outcome, ApplyOutcome::Applied);
    assert_eq!(fx.store.get().unwrap().config, original);

    let missing = fx.controller.restore_backup("config-19700101-000000-000.toml").await;
    assert!(matches!(missing, Err(OrchestrationError::Backup(_))));
}

use dcman::docker::ComposeClient;
use dcman::registry::{CommandKind, Project, Reconciler, ReconcilerHandle, ServiceKey, Snapshot, Status};
use dcman::{Error, Executor, Poller};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn write_stub(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("compose-stub.sh");
    fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("Failed to write stub");
    let mut perms = fs::metadata(&path).expect("stub metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to chmod stub");
    path
}

fn project_with_services(dir: &Path, services: &[&str]) -> Project {
    Project::new(
        dir.join("docker-compose.yml"),
        services.iter().map(|s| s.to_string()).collect(),
        Vec::new(),
    )
}

struct Harness {
    reconciler: ReconcilerHandle,
    executor: Executor,
    poller: Poller,
}

fn harness(stub: &Path) -> Harness {
    let client = ComposeClient::with_command(stub.to_string_lossy(), Vec::new());
    let reconciler = Reconciler::spawn();
    let poller = Poller::new(client.clone(), reconciler.clone());
    let executor = Executor::new(client, reconciler.clone(), poller.clone());
    Harness {
        reconciler,
        executor,
        poller,
    }
}

async fn wait_for(
    reconciler: &ReconcilerHandle,
    mut predicate: impl FnMut(&Snapshot) -> bool,
) -> Snapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = reconciler.snapshot();
        if predicate(&snapshot) {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached before timeout");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn status_of(snapshot: &Snapshot, key: &ServiceKey) -> Option<Status> {
    snapshot.service(key).map(|row| row.status)
}

/// Stub that tracks "running" state in a marker file inside the project dir.
const STATEFUL_STUB: &str = r#"
case "$1" in
  ps)
    if [ -f started ]; then
      printf '{"Service":"web","State":"running","ID":"abc123"}\n'
    fi
    ;;
  up)
    echo "Creating web"
    touch started
    ;;
  stop)
    rm -f started
    ;;
esac
exit 0
"#;

#[tokio::test]
async fn start_moves_service_through_loading_to_running() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stub = write_stub(temp.path(), STATEFUL_STUB);
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web"])]);
    let key = ServiceKey::new(project_dir.clone(), "web");

    // Nothing running yet: the poll defaults the service to stopped.
    h.poller.poll(project_dir.clone()).await;
    let snapshot = wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Stopped)
    })
    .await;
    assert!(snapshot.service(&key).unwrap().in_flight.is_none());

    let mut stream = h
        .executor
        .execute(key.clone(), CommandKind::Start)
        .await
        .expect("start accepted");

    // Transient status becomes visible right after admission.
    let snapshot = wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Loading)
    })
    .await;
    assert_eq!(
        snapshot.service(&key).unwrap().in_flight,
        Some(CommandKind::Start)
    );

    // Output arrives incrementally and ends when the command finishes.
    let mut lines = Vec::new();
    while let Some(line) = stream.next_line().await {
        lines.push(line);
    }
    assert_eq!(lines, vec!["Creating web"]);

    // Success plus the confirming poll leave the service running. The
    // optimistic running status lands first; the container id only arrives
    // with the poll, so both belong in the predicate.
    wait_for(&h.reconciler, |s| {
        s.service(&key)
            .map(|r| {
                r.status == Status::Running
                    && r.in_flight.is_none()
                    && r.container_id.as_deref() == Some("abc123")
            })
            .unwrap_or(false)
    })
    .await;

    // And stop brings it back down.
    let mut stream = h
        .executor
        .execute(key.clone(), CommandKind::Stop)
        .await
        .expect("stop accepted");
    while stream.next_line().await.is_some() {}
    wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Stopped)
    })
    .await;
}

#[tokio::test]
async fn failed_command_marks_service_error_with_diagnostic() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stub = write_stub(
        temp.path(),
        r#"
case "$1" in
  ps) ;;
  up)
    echo "pulling image" >&2
    echo "boom: no such image" >&2
    exit 17
    ;;
esac
exit 0
"#,
    );
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web"])]);
    let key = ServiceKey::new(project_dir.clone(), "web");

    let mut stream = h
        .executor
        .execute(key.clone(), CommandKind::Start)
        .await
        .expect("start accepted");

    // Stderr is forwarded into the live output, tagged.
    let mut lines = Vec::new();
    while let Some(line) = stream.next_line().await {
        lines.push(line);
    }
    assert!(lines.iter().any(|l| l.contains("boom: no such image")));

    let snapshot = wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Error)
    })
    .await;
    let row = snapshot.service(&key).unwrap();
    assert!(row.in_flight.is_none());
    let err = row.last_error.as_deref().expect("diagnostic recorded");
    assert!(err.contains("boom: no such image"));

    // The failure cleared the in-flight marker, so a retry is admitted.
    h.executor
        .execute(key.clone(), CommandKind::Start)
        .await
        .expect("retry accepted after failure");
}

#[tokio::test]
async fn failure_status_is_not_overwritten_by_a_confirming_poll() {
    let temp = tempfile::tempdir().expect("tempdir");
    // ps would report the service stopped; the error from the failed start
    // must stay on screen anyway.
    let stub = write_stub(
        temp.path(),
        r#"
case "$1" in
  ps) ;;
  up)
    echo "no such image" >&2
    exit 17
    ;;
esac
exit 0
"#,
    );
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web"])]);
    let key = ServiceKey::new(project_dir.clone(), "web");

    let mut stream = h
        .executor
        .execute(key.clone(), CommandKind::Start)
        .await
        .expect("start accepted");
    while stream.next_line().await.is_some() {}

    wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Error)
    })
    .await;

    // Give any stray post-command poll time to land, then re-check.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = h.reconciler.snapshot();
    let row = snapshot.service(&key).unwrap();
    assert_eq!(row.status, Status::Error);
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .contains("no such image"));
}

#[tokio::test]
async fn overlapping_command_on_same_service_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stub = write_stub(
        temp.path(),
        r#"
case "$1" in
  ps) ;;
  up) sleep 1 ;;
esac
exit 0
"#,
    );
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web"])]);
    let key = ServiceKey::new(project_dir.clone(), "web");

    let mut first = h
        .executor
        .execute(key.clone(), CommandKind::Start)
        .await
        .expect("first command accepted");

    let second = h.executor.execute(key.clone(), CommandKind::Restart).await;
    assert!(matches!(
        second,
        Err(Error::CommandAlreadyInProgress { .. })
    ));

    // Once the first finishes the service accepts commands again.
    while first.next_line().await.is_some() {}
    wait_for(&h.reconciler, |s| {
        s.service(&key)
            .map(|r| r.in_flight.is_none())
            .unwrap_or(false)
    })
    .await;
    h.executor
        .execute(key, CommandKind::Restart)
        .await
        .expect("command accepted after first finished");
}

#[tokio::test]
async fn commands_on_different_services_run_concurrently() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stub = write_stub(
        temp.path(),
        r#"
case "$1" in
  ps) ;;
  up) sleep 1 ;;
esac
exit 0
"#,
    );
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web", "db"])]);
    let web = ServiceKey::new(project_dir.clone(), "web");
    let db = ServiceKey::new(project_dir.clone(), "db");

    h.executor
        .execute(web.clone(), CommandKind::Start)
        .await
        .expect("web accepted");
    h.executor
        .execute(db.clone(), CommandKind::Start)
        .await
        .expect("db accepted while web is in flight");

    wait_for(&h.reconciler, |s| {
        status_of(s, &web) == Some(Status::Loading) && status_of(s, &db) == Some(Status::Loading)
    })
    .await;
}

#[tokio::test]
async fn in_flight_service_is_shielded_from_polls() {
    let temp = tempfile::tempdir().expect("tempdir");
    // ps claims the service is running while a slow stop is in flight; the
    // command's view must win until it finishes.
    let stub = write_stub(
        temp.path(),
        r#"
case "$1" in
  ps) printf '{"Service":"web","State":"running","ID":"abc"}\n' ;;
  stop) sleep 1 ;;
esac
exit 0
"#,
    );
    let h = harness(&stub);

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    h.reconciler
        .discovered(vec![project_with_services(&project_dir, &["web"])]);
    let key = ServiceKey::new(project_dir.clone(), "web");

    h.executor
        .execute(key.clone(), CommandKind::Stop)
        .await
        .expect("stop accepted");

    wait_for(&h.reconciler, |s| {
        status_of(s, &key) == Some(Status::Loading)
    })
    .await;

    // The poll reports "running" but the in-flight stop shields the service.
    h.poller.poll(project_dir.clone()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        status_of(&h.reconciler.snapshot(), &key),
        Some(Status::Loading)
    );
}

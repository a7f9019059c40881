use dcman::docker::ComposeClient;
use dcman::registry::ServiceKey;
use dcman::LogStreamer;
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

fn streamer(stub: &Path) -> LogStreamer {
    LogStreamer::new(ComposeClient::with_command(
        stub.to_string_lossy(),
        Vec::new(),
    ))
}

#[tokio::test]
async fn lines_arrive_in_emission_order_and_stream_ends_on_exit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stub = write_stub(
        temp.path(),
        r#"
if [ "$1" = "logs" ]; then
  echo "line one"
  echo "line two"
  echo "line three"
fi
exit 0
"#,
    );

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    let key = ServiceKey::new(project_dir, "web");

    let mut stream = streamer(&stub).stream(key).expect("stream opened");

    let mut lines = Vec::new();
    while let Some(line) = stream.next_line().await {
        lines.push(line);
    }
    assert_eq!(lines, vec!["line one", "line two", "line three"]);
}

#[tokio::test]
async fn cancel_terminates_the_tail_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    // The stub records its pid, emits one line, then hangs until killed.
    let stub = write_stub(
        temp.path(),
        r#"
if [ "$1" = "logs" ]; then
  echo $$ > logpid
  echo "tailing"
  while :; do sleep 0.2; done
fi
exit 0
"#,
    );

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    let key = ServiceKey::new(project_dir.clone(), "web");

    let mut stream = streamer(&stub).stream(key).expect("stream opened");
    assert_eq!(stream.next_line().await.as_deref(), Some("tailing"));

    let pid: u32 = fs::read_to_string(project_dir.join("logpid"))
        .expect("pid recorded")
        .trim()
        .parse()
        .expect("pid parses");

    // Shutdown waits until the process is terminated and reaped.
    stream.shutdown().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if !Path::new(&format!("/proc/{}", pid)).exists() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("log tail (pid {}) still alive after shutdown", pid);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn independent_streams_do_not_interfere() {
    let temp = tempfile::tempdir().expect("tempdir");
    // Identify the service in the emitted lines: it is the last argument.
    let stub = write_stub(
        temp.path(),
        r#"
if [ "$1" = "logs" ]; then
  for a in "$@"; do svc="$a"; done
  echo "from $svc"
fi
exit 0
"#,
    );

    let project_dir = temp.path().join("proj");
    fs::create_dir_all(&project_dir).expect("project dir");
    let streamer = streamer(&stub);

    let mut web = streamer
        .stream(ServiceKey::new(project_dir.clone(), "web"))
        .expect("web stream");
    let mut db = streamer
        .stream(ServiceKey::new(project_dir.clone(), "db"))
        .expect("db stream");

    assert_eq!(web.next_line().await.as_deref(), Some("from web"));
    assert_eq!(db.next_line().await.as_deref(), Some("from db"));
    assert!(web.next_line().await.is_none());
    assert!(db.next_line().await.is_none());
}

//! Process-level tests for the `headless-host` binary.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use headless_ipc::IpcClient;
use tempfile::{tempdir, TempDir};

const BIN: &str = env!("CARGO_BIN_EXE_headless-host");

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(extra_dummy: &str) -> Self {
        let dir = tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("sessions")).unwrap();
        std::fs::write(
            root.join("sessions").join("demo.session"),
            "name: demo\ntracks:\n  - name: Drums\n    channels: 2\nconnections:\n  - from: Drums/audio_out 1\n    to: system:playback_1\n",
        )
        .unwrap();

        let config = format!(
            "data_dir: {data}\nlog_level: info\ncontrol:\n  socket_path: {sock}\ndummy:\n  buffer_size: 256\n{extra}",
            data = root.join("data").display(),
            sock = root.join("host.sock").display(),
            extra = extra_dummy,
        );
        std::fs::write(root.join("config.yaml"), config).unwrap();

        Self { dir }
    }

    fn socket(&self) -> PathBuf {
        self.dir.path().join("host.sock")
    }

    fn command(&self, extra: &[&str]) -> Command {
        let mut cmd = Command::new(BIN);
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.dir.path().join("config.yaml"))
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_demo(&self) -> Child {
        self.command(&[])
            .arg(self.dir.path().join("sessions"))
            .arg("demo")
            .spawn()
            .unwrap()
    }
}

fn wait_for(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        thread::sleep(Duration::from_millis(20));
    }
}

fn wait_with_timeout(mut child: Child) -> Output {
    let deadline = Instant::now() + Duration::from_secs(10);
    while child.try_wait().unwrap().is_none() {
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("headless-host did not exit");
        }
        thread::sleep(Duration::from_millis(20));
    }
    child.wait_with_output().unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_teardown_order(log: &str) {
    let positions: Vec<usize> = [
        "step=UnbindSession",
        "step=DestroySession",
        "step=StopEngine",
        "step=DestroyEngine",
    ]
    .iter()
    .map(|needle| {
        log.find(needle)
            .unwrap_or_else(|| panic!("missing {needle} in:\n{log}"))
    })
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{log}");
    assert_eq!(log.matches("Teardown complete").count(), 1, "{log}");
}

#[test]
fn test_help_exits_zero() {
    let output = Command::new(BIN).arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("SNAPSHOT_NAME"));
}

#[test]
fn test_version_exits_zero() {
    let output = Command::new(BIN).arg("-v").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_positionals_print_usage_and_fail() {
    let output = Command::new(BIN).arg("/tmp").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

#[test]
fn test_unknown_flag_fails() {
    let output = Command::new(BIN)
        .args(["--bogus", "/tmp", "demo"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_debug_list_fails_after_listing() {
    let output = Command::new(BIN)
        .args(["-D", "list", "/tmp", "demo"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("shutdown"));
}

#[test]
fn test_debug_list_alone_lists_flags() {
    let output = Command::new(BIN).args(["-D", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available debug flags"), "{stdout}");
    assert!(!stdout.contains("Usage"), "{stdout}");
}

#[test]
fn test_unknown_backend_fails_without_teardown() {
    let fixture = Fixture::new("");
    let output = fixture
        .command(&["--backend", "nonexistent-backend"])
        .arg(fixture.dir.path().join("sessions"))
        .arg("demo")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let log = stderr(&output);
    assert!(log.contains("nonexistent-backend"), "{log}");
    assert!(!log.contains("Teardown"), "{log}");
}

#[test]
fn test_missing_session_fails() {
    let fixture = Fixture::new("");
    let output = fixture
        .command(&[])
        .arg(fixture.dir.path().join("sessions"))
        .arg("absent")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("absent.session"));
}

#[test]
fn test_sigterm_tears_down_and_exits_zero() {
    let fixture = Fixture::new("");
    let child = fixture.spawn_demo();
    wait_for(&fixture.socket());

    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
        libc::kill(pid, libc::SIGINT);
    }

    let output = wait_with_timeout(child);
    let log = stderr(&output);
    assert!(output.status.success(), "{log}");
    assert_eq!(log.matches("Shutdown requested").count(), 1, "{log}");
    assert_teardown_order(&log);
    assert!(!fixture.socket().exists());
}

#[test]
fn test_quit_action_tears_down_and_exits_zero() {
    let fixture = Fixture::new("");
    let child = fixture.spawn_demo();
    wait_for(&fixture.socket());

    let client = IpcClient::with_socket_path(fixture.socket());
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(async {
            client.send_action("Common", "Save").await.unwrap();
            client.quit().await.unwrap();
        });

    let output = wait_with_timeout(child);
    let log = stderr(&output);
    assert!(output.status.success(), "{log}");
    assert!(log.contains("Quit action received"), "{log}");
    assert_teardown_order(&log);
}

#[test]
fn test_engine_halt_tears_down_and_exits_zero() {
    let fixture = Fixture::new("  halt_after_ms: 300\n");
    let child = fixture.spawn_demo();

    let output = wait_with_timeout(child);
    let log = stderr(&output);
    assert!(output.status.success(), "{log}");
    assert!(
        log.contains("The audio backend has been shutdown: device removed"),
        "{log}"
    );
    assert_teardown_order(&log);
}

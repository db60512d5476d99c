#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use localsock::channel::connect;
use localsock::transport::EndpointId;

const TIMEOUT: Duration = Duration::from_secs(5);

fn spawn_serve(extra: &[&str]) -> (Child, EndpointId, BufReader<std::process::ChildStdout>) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_localsock"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    // The first stdout line is the endpoint identifier hand-off. The reader
    // stays open so later output from the child does not hit a closed pipe.
    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .expect("serve should print its endpoint id");
    let id = EndpointId::from_name(line.trim());
    (child, id, reader)
}

#[test]
fn serve_echoes_and_exits_after_count() {
    let (mut child, id, _stdout) = spawn_serve(&["--echo", "--count", "1"]);

    let channel = connect(&id, TIMEOUT).expect("client should connect to serve process");
    channel
        .send(b"ping", TIMEOUT)
        .expect("send to serve should succeed");
    let reply = channel
        .receive(TIMEOUT)
        .expect("echo reply should come back");
    assert_eq!(&reply[..], b"ping");

    let status = child.wait().expect("serve should exit");
    assert!(status.success());
}

#[test]
fn send_command_round_trips_through_serve() {
    let (mut serve, id, _stdout) = spawn_serve(&["--echo", "--count", "1"]);

    let output = Command::new(env!("CARGO_BIN_EXE_localsock"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("raw")
        .arg("send")
        .arg(id.as_str())
        .arg("--data")
        .arg("over and out")
        .arg("--wait")
        .output()
        .expect("send command should run");

    assert!(output.status.success(), "send failed: {output:?}");
    assert_eq!(output.stdout, b"over and out");

    let status = serve.wait().expect("serve should exit");
    assert!(status.success());
}

#[test]
fn send_to_absent_endpoint_reports_transport_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_localsock"))
        .arg("--log-level")
        .arg("error")
        .arg("send")
        .arg(EndpointId::generate().as_str())
        .arg("--data")
        .arg("nobody home")
        .output()
        .expect("send command should run");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_localsock"))
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

//! Shutdown behavior of the binary when reading stdin.
#![cfg(unix)]

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn sigint_stops_process_while_stdin_is_open() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_slackout"))
        .arg("-c")
        .arg(fixture_path("config_webhook.yaml"))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run slackout");

    // Held open for the whole test so stdin never reaches EOF.
    let _stdin = child.stdin.take().expect("stdin is piped");

    let stderr = child.stderr.take().expect("stderr is piped");
    let (log_tx, log_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if log_tx.send(line).is_err() {
                break;
            }
        }
    });

    let started = Instant::now();
    loop {
        let line = log_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("slackout did not log startup");
        if line.contains("slackout starting") {
            break;
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }
    // Leave time for the signal handler to be installed.
    thread::sleep(Duration::from_millis(500));

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().expect("try_wait failed") {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("slackout still running 10s after SIGINT");
        }
        thread::sleep(Duration::from_millis(50));
    };

    assert!(exit.success(), "exit status: {:?}", exit);

    let mut logs = Vec::new();
    while let Ok(line) = log_rx.recv_timeout(Duration::from_secs(2)) {
        logs.push(line);
    }
    assert!(
        logs.iter().any(|l| l.contains("slackout shutdown complete")),
        "{:?}",
        logs
    );
}

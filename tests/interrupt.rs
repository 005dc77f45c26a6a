#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn sigint_in_the_menu_still_cleans_up_children() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_string_lossy().into_owned();

    // Ten processes puts the menu into line mode.
    let mut processes = vec![serde_json::json!({
        "name": "first",
        "cmd": "echo $$ > first.pid; exec sleep 30",
        "cwd": cwd,
    })];
    for i in 2..=10 {
        processes.push(serde_json::json!({ "name": format!("p{}", i), "cmd": "exec sleep 30" }));
    }
    let config = serde_json::json!({
        "logs": dir.path().join("logs").to_string_lossy(),
        "processes": processes,
    });
    let config_path = dir.path().join("tsk.json");
    fs::write(&config_path, config.to_string()).unwrap();

    let mut tsk = Command::new(env!("CARGO_BIN_EXE_tsk"))
        .arg(&config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut stdin = tsk.stdin.take().unwrap();
    stdin.write_all(b"1\n").unwrap();
    stdin.flush().unwrap();

    let pid_file = dir.path().join("first.pid");
    wait_until("first process", || {
        fs::read_to_string(&pid_file).is_ok_and(|pid| pid.ends_with('\n'))
    });
    let child: libc::pid_t = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();

    unsafe { libc::kill(tsk.id() as libc::pid_t, libc::SIGINT) };

    let mut status = None;
    wait_until("tsk to exit", || {
        status = tsk.try_wait().unwrap();
        status.is_some()
    });
    let status = status.unwrap();
    drop(stdin);

    assert_eq!(status.signal(), None, "tsk died from the signal");
    assert!(status.success());
    assert!(unsafe { libc::kill(child, 0) } == -1, "managed process {} survived", child);
}

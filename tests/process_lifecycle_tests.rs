//! Child process lifecycle tests
//!
//! Capabilities start external programs through the command runner. These
//! tests verify that:
//! 1. A timed-out command takes its whole process tree down
//! 2. Process group signaling reaches grandchildren
//! 3. Detached launches outlive the call that started them

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use ainux::command_runner::{run_command_safe, spawn_detached};
use ainux::commands::ProgramArgs;
use ainux::process_guard::{self, is_process_alive};

/// Wait for a process to die (or become a zombie) with timeout
fn wait_for_process_death(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

fn read_pid(path: &std::path::Path, timeout: Duration) -> Option<u32> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(text) = fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return Some(pid);
            }
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

// =============================================================================
// Timeout kills the process tree
// =============================================================================

#[test]
fn test_timeout_kills_grandchildren() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = format!("sleep 1000 & echo $! > {}; wait", pid_file.display());
    let args = ProgramArgs::new("bash", ["-c", script.as_str()]);

    let start = Instant::now();
    let output = run_command_safe(&args, Duration::from_millis(500)).unwrap();
    assert!(output.timed_out);
    assert!(!output.success);
    assert!(start.elapsed() < Duration::from_secs(10));

    let grandchild = read_pid(&pid_file, Duration::from_secs(2)).expect("grandchild pid written");
    assert!(
        wait_for_process_death(grandchild, Duration::from_secs(3)),
        "grandchild {} should die with its process group",
        grandchild
    );
}

#[test]
fn test_group_signal_reaches_whole_group() {
    use nix::sys::signal::Signal;
    use std::process::{Command, Stdio};
    use ainux::CommandProcessGroup;

    let mut child = Command::new("bash")
        .args(["-c", "sleep 1000 & wait"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .in_new_process_group()
        .spawn()
        .expect("spawn bash");
    let pid = child.id();
    thread::sleep(Duration::from_millis(100));
    assert!(is_process_alive(pid));

    process_guard::signal_group(pid, Signal::SIGTERM).unwrap();
    let _ = child.wait();
    assert!(!is_process_alive(pid));
}

// =============================================================================
// Detached launches
// =============================================================================

#[test]
fn test_detached_launch_returns_immediately() {
    let args = ProgramArgs::new("sleep", ["2"]);
    let start = Instant::now();
    let pid = spawn_detached(&args).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(is_process_alive(pid));
    assert!(wait_for_process_death(pid, Duration::from_secs(10)));
}

#[test]
fn test_detached_launch_of_missing_program_fails() {
    let args = ProgramArgs::new("ainux-no-such-launcher", Vec::<String>::new());
    let err = spawn_detached(&args).unwrap_err();
    assert!(ainux::command_runner::is_not_found(&err));
}

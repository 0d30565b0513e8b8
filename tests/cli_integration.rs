//! End-to-end runs of the `netscope` binary against the live host.
//!
//! Sources that are missing or forbidden in the test environment surface in
//! the `errors` section; the run itself must still succeed.

use std::process::Command;

fn netscope() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_netscope"));
    // Keep runs offline and independent of installed tools.
    cmd.args([
        "--no-dns",
        "--lsof",
        "/nonexistent/lsof",
        "--pfctl",
        "/nonexistent/pfctl",
        "--arp",
        "/nonexistent/arp",
    ]);
    cmd
}

#[test]
fn single_poll_json() {
    let output = netscope()
        .args(["--format", "json", "--count", "1"])
        .output()
        .expect("failed to execute");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let snap: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is one JSON document");
    assert_eq!(snap["seq"], 1);
    for key in [
        "interfaces",
        "routes",
        "sockets",
        "unix_sockets",
        "processes",
        "firewall",
        "arp",
        "errors",
    ] {
        assert!(snap[key].is_array(), "{key} missing");
    }

    let sources: Vec<&str> = snap["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["source"].as_str())
        .collect();
    assert!(sources.contains(&"lsof-inet"), "{sources:?}");
    assert!(sources.contains(&"arp"), "{sources:?}");
    assert!(sources.contains(&"firewall"), "{sources:?}");
}

#[test]
fn two_polls_tsv() {
    let output = netscope()
        .args(["--count", "2", "--interval", "0.5"])
        .output()
        .expect("failed to execute");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("# interfaces\n").count(), 2);
    assert_eq!(stdout.matches("# errors\n").count(), 2);
}

#[test]
fn rejects_out_of_range_interval() {
    let output = netscope()
        .args(["--interval", "0.1"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("interval"));
}

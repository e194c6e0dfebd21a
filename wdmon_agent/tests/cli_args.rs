//! CLI arg parsing tests for wdmon_agent (server)
use std::process::Command;

#[test]
fn test_help_mentions_short_and_long_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_wdmon_agent"))
        .arg("--help")
        .output()
        .expect("run wdmon_agent --help");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    for flag in ["--port", "-p", "--bind", "-b", "--device", "-D", "--timeout", "-t", "--simulate"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn test_simulated_agent_starts_on_short_and_long_port() {
    // Use unlikely ports to avoid conflicts; the agent is killed after binding.
    let exe = env!("CARGO_BIN_EXE_wdmon_agent");
    for args in [
        ["--simulate", "--port", "9555", "-b", "127.0.0.1"],
        ["--simulate", "-p", "9556", "-b", "127.0.0.1"],
    ] {
        let mut child = Command::new(exe).args(args).spawn().expect("spawn agent");
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert!(child.try_wait().expect("poll agent").is_none(), "agent exited early: {args:?}");
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[test]
fn test_rejects_bad_bind_address() {
    let out = Command::new(env!("CARGO_BIN_EXE_wdmon_agent"))
        .args(["--simulate", "--bind", "not-an-ip"])
        .output()
        .expect("run wdmon_agent");
    assert!(!out.status.success());
}

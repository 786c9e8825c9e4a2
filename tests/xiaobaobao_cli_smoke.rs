use std::path::PathBuf;
use std::process::Command;

fn xiaobaobao_cli_exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_xiaobaobao-cli")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut fallback = PathBuf::from("target");
            fallback.push("debug");
            #[cfg(windows)]
            {
                fallback.push("xiaobaobao-cli.exe");
            }
            #[cfg(not(windows))]
            {
                fallback.push("xiaobaobao-cli");
            }
            fallback
        })
}

#[test]
fn config_show_prints_resolved_endpoints() {
    let temp_root = tempfile::tempdir().expect("create temp root");
    let output = Command::new(xiaobaobao_cli_exe())
        .arg("config")
        .arg("show")
        .arg("--temp-root")
        .arg(temp_root.path())
        .output()
        .expect("run config show");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "config show failed: status={:?}, stderr={}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("graphql_endpoint"));
    assert!(stdout.contains("stream_endpoint"));
    assert!(stdout.contains("base_url"));
}

#[test]
fn config_show_honors_override_file() {
    let temp_root = tempfile::tempdir().expect("create temp root");
    let base = temp_root.path().join("base.yaml");
    std::fs::write(
        &base,
        "chat:\n  model: deepseek-reasoner\n  stream_endpoint: https://stream.test.local/v1/chat/completions\n",
    )
    .expect("write base config");

    let output = Command::new(xiaobaobao_cli_exe())
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(&base)
        .arg("--temp-root")
        .arg(temp_root.path())
        .output()
        .expect("run config show");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("deepseek-reasoner"));
    assert!(stdout.contains("https://stream.test.local/v1/chat/completions"));
    // 未覆盖的字段保持默认。
    assert!(stdout.contains("https://agent.juzhiqiang.shop"));
}

#[test]
fn travel_rejects_empty_destinations_offline() {
    let temp_root = tempfile::tempdir().expect("create temp root");
    let output = Command::new(xiaobaobao_cli_exe())
        .arg("travel")
        .arg(" ，、 ")
        .arg("--temp-root")
        .arg(temp_root.path())
        .output()
        .expect("run travel");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("请至少输入一个目的地"));
}

#[test]
fn completion_script_generates() {
    let temp_root = tempfile::tempdir().expect("create temp root");
    let output = Command::new(xiaobaobao_cli_exe())
        .arg("completion")
        .arg("bash")
        .arg("--temp-root")
        .arg(temp_root.path())
        .output()
        .expect("run completion");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("xiaobaobao-cli"));
}

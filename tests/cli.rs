use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn kiln(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kiln"))
        .args(args)
        .current_dir(dir)
        .env_remove("KILN_ENV")
        .output()
        .expect("failed to run kiln")
}

fn write_build_file(dir: &Path, content: &str) {
    fs::write(dir.join("kiln.toml"), content).unwrap();
}

#[test]
fn runs_target_and_forwards_output() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.echo]
mode = "forward-out"

[target.hello]
steps = ["echo hello from kiln"]
"#,
    );

    let out = kiln(dir.path(), &["hello"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello from kiln\n");
}

#[test]
fn failing_step_sets_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.sh]

[target.broken]
steps = ["sh -c 'exit 3'"]
"#,
    );

    let out = kiln(dir.path(), &["broken"]);
    assert_eq!(out.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("has exited with code 3"), "stderr: {stderr}");
}

#[test]
fn ignored_failure_continues() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.fail]
exec = "false"
die = false

[command.echo]
mode = "forward-out"

[target.all]
steps = ["fail", "echo after"]
"#,
    );

    let out = kiln(dir.path(), &["all"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "after\n");
}

#[test]
fn unknown_target_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(dir.path(), "[target.all]\nsteps = []\n");

    let out = kiln(dir.path(), &["deploy"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unknown target \"deploy\""));
}

#[test]
fn missing_build_file_bails_out() {
    let dir = tempfile::tempdir().unwrap();
    let out = kiln(dir.path(), &["all"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("No \"kiln.toml\" found. Bailing out!"));
}

#[test]
fn unresolvable_command_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.touch]

[command.ghost]
exec = "kiln-no-such-tool"

[target.all]
steps = ["touch made.txt"]
"#,
    );

    let out = kiln(dir.path(), &["all"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Could not find \"kiln-no-such-tool\" in PATH"));
    assert!(!dir.path().join("made.txt").exists());
}

#[test]
fn dry_run_prints_resolved_steps() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "").unwrap();
    fs::write(dir.path().join("b.c"), "").unwrap();
    write_build_file(
        dir.path(),
        r#"
[env]
OUT = "main"

[command.touch]

[target.build]
steps = ["touch ${OUT} *.c"]
"#,
    );

    let out = kiln(dir.path(), &["--dry-run", "build"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("touch main a.c b.c"));
    assert!(!dir.path().join("main").exists());
}

#[test]
fn list_and_default_usage_show_targets() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[target.build]
description = "Compile everything"
steps = []
"#,
    );

    let listed = kiln(dir.path(), &["--list"]);
    assert!(listed.status.success());
    let text = String::from_utf8_lossy(&listed.stdout);
    assert!(text.contains("build") && text.contains("Compile everything"));

    let usage = kiln(dir.path(), &[]);
    assert!(usage.status.success());
    assert!(String::from_utf8_lossy(&usage.stdout).contains("Usage:"));
}

#[test]
fn help_target_runs_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.echo]
mode = "forward-out"

[target.help]
steps = ["echo custom help"]
"#,
    );

    let out = kiln(dir.path(), &[]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "custom help\n");
}

#[test]
fn static_stdin_and_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.cat]
stdin = "y\n"
stdout = { file = "answer.log" }

[target.all]
steps = ["cat"]
"#,
    );

    let out = kiln(dir.path(), &["all"]);
    assert!(out.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("answer.log")).unwrap(), "y\n");
}

#[test]
fn prompt_session_relays_one_answer_per_line() {
    use std::io::Write;
    use std::process::Stdio;

    let dir = tempfile::tempdir().unwrap();
    write_build_file(
        dir.path(),
        r#"
[command.cat]
mode = "forward-out"
stdin = { prompt = "Cat >" }

[target.repl]
steps = ["cat"]
"#,
    );

    let mut child = Command::new(env!("CARGO_BIN_EXE_kiln"))
        .arg("repl")
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"one\ntwo\n").unwrap();
    let out = child.wait_with_output().unwrap();

    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "Cat > one\nCat > two\nCat > "
    );
}

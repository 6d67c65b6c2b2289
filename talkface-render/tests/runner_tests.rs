//! `RenderJobRunner` against real child processes (`sh -c` stand-ins).
#![cfg(unix)]

use std::time::Duration;

use talkface_core::{Config, ErrorKind, RenderJob};
use talkface_render::{RenderJobRunner, RunnerError, RunnerSettings, STDERR_TAIL_CHARS};
use tempfile::TempDir;

/// Settings running `sh -c <script>`; the fixed render arguments follow, so
/// inside the script `$0` is the data root and `$2` the workspace root.
fn shell(project_root: &std::path::Path, script: &str) -> RunnerSettings {
    let mut cfg = Config::for_project_root(project_root);
    cfg.render.program = "sh".into();
    cfg.render.program_args = vec!["-c".into(), script.into()];
    cfg.render.script = None;
    RunnerSettings::from_config(&cfg)
}

fn job(tmp: &TempDir) -> RenderJob {
    RenderJob::new(
        tmp.path().join("demo").join("a.wav"),
        tmp.path().join("data").join("May"),
        tmp.path().join("model").join("trial_may"),
    )
}

#[tokio::test]
async fn zero_exit_captures_output() {
    let tmp = TempDir::new().unwrap();
    let runner = RenderJobRunner::new(shell(tmp.path(), "echo rendering \"$2\"; echo warn >&2"));

    let outcome = runner.run(&job(&tmp)).await.expect("run");
    assert!(outcome.succeeded);
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stdout.contains("trial_may"), "stdout: {}", outcome.stdout);
    assert_eq!(outcome.stderr.trim(), "warn");
}

#[tokio::test]
async fn nonzero_exit_is_process_failed_with_stderr_tail() {
    let tmp = TempDir::new().unwrap();
    let runner = RenderJobRunner::new(shell(tmp.path(), "echo 'CUDA error' >&2; exit 1"));

    let err = runner.run(&job(&tmp)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderProcessFailed);
    match err {
        RunnerError::ProcessFailed { exit_code, stderr_tail } => {
            assert_eq!(exit_code, 1);
            assert!(stderr_tail.contains("CUDA error"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn stderr_tail_is_bounded() {
    let tmp = TempDir::new().unwrap();
    let script = "i=0; while [ $i -lt 1000 ]; do printf 'line-%04d\\n' $i >&2; i=$((i+1)); done; exit 2";
    let runner = RenderJobRunner::new(shell(tmp.path(), script));

    match runner.run(&job(&tmp)).await.unwrap_err() {
        RunnerError::ProcessFailed { exit_code, stderr_tail } => {
            assert_eq!(exit_code, 2);
            assert_eq!(stderr_tail.chars().count(), STDERR_TAIL_CHARS);
            assert!(stderr_tail.ends_with("line-0999\n"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn killed_by_signal_reports_minus_one() {
    let tmp = TempDir::new().unwrap();
    let runner = RenderJobRunner::new(shell(tmp.path(), "kill -9 $$"));

    match runner.run(&job(&tmp)).await.unwrap_err() {
        RunnerError::ProcessFailed { exit_code, .. } => assert_eq!(exit_code, -1),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn child_sees_environment_overrides() {
    let tmp = TempDir::new().unwrap();
    let mut settings = shell(
        tmp.path(),
        "printf '%s\\n' \"$TALKFACE_TEST_SEARCH\" \"$DISABLE_MIC\" \"[$CUDA_VISIBLE_DEVICES]\" \"$EXTRA_FLAG\"",
    );
    settings.search_path_var = "TALKFACE_TEST_SEARCH".into();
    settings.cpu_only = true;
    settings.env.insert("EXTRA_FLAG".into(), "on".into());

    let outcome = RenderJobRunner::new(settings).run(&job(&tmp)).await.expect("run");
    let lines: Vec<&str> = outcome.stdout.lines().collect();
    assert_eq!(lines[0], tmp.path().to_string_lossy());
    assert_eq!(lines[1], "1");
    assert_eq!(lines[2], "[]");
    assert_eq!(lines[3], "on");
}

#[tokio::test]
async fn job_extras_are_passed_last() {
    let tmp = TempDir::new().unwrap();
    let runner = RenderJobRunner::new(shell(tmp.path(), "for last; do :; done; echo \"$last\""));
    let job = job(&tmp).with_extra_args(["--fps", "30"]);

    let outcome = runner.run(&job).await.expect("run");
    assert_eq!(outcome.stdout.trim(), "30");
}

#[tokio::test]
async fn deadline_kills_the_child() {
    let tmp = TempDir::new().unwrap();
    let mut settings = shell(tmp.path(), "sleep 30");
    settings.timeout = Some(Duration::from_millis(300));

    let started = std::time::Instant::now();
    let err = RenderJobRunner::new(settings).run(&job(&tmp)).await.unwrap_err();
    assert!(matches!(err, RunnerError::Timeout { .. }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let tmp = TempDir::new().unwrap();
    let mut settings = shell(tmp.path(), "true");
    settings.program = "/nonexistent/render-binary".into();

    let err = RenderJobRunner::new(settings).run(&job(&tmp)).await.unwrap_err();
    assert!(matches!(err, RunnerError::Spawn { .. }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::Io);
}

//! Tests for the process runners.

use super::*;
use rstest::rstest;

fn shell(script: &str) -> Invocation {
    Invocation::new("sh").args(["-c", script])
}

#[rstest]
#[case::buffered_success("printf out && printf err 1>&2", Some(0), "out", "err")]
#[case::buffered_failure("printf out; exit 42", Some(42), "out", "")]
fn process_runner_captures_output(
    #[case] script: &str,
    #[case] code: Option<i32>,
    #[case] stdout: &str,
    #[case] stderr: &str,
) {
    let output = ProcessCommandRunner
        .run(&shell(script))
        .expect("command should execute");

    assert_eq!(output.code, code);
    assert_eq!(output.stdout, stdout);
    assert_eq!(output.stderr, stderr);
}

#[rstest]
fn streaming_runner_keeps_no_copy_of_forwarded_output() {
    let output = StreamingCommandRunner
        .run(&shell("printf out && printf err 1>&2; exit 3"))
        .expect("command should execute");

    assert_eq!(output.code, Some(3));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}

#[rstest]
fn only_the_streaming_runner_reports_live_output() {
    assert!(StreamingCommandRunner.streams_output());
    assert!(!ProcessCommandRunner.streams_output());
}

#[rstest]
fn environment_overrides_reach_the_child() {
    let invocation = shell("printf \"$GAUNTLET_PROBE\"").env("GAUNTLET_PROBE", "layered");
    let output = ProcessCommandRunner
        .run(&invocation)
        .expect("command should execute");

    assert_eq!(output.stdout, "layered");
}

#[rstest]
fn spawn_failure_names_the_program() {
    let err = ProcessCommandRunner
        .run(&Invocation::new("gauntlet-definitely-missing-binary"))
        .expect_err("missing program should fail to spawn");

    assert!(
        matches!(err, ProcessError::Spawn { ref program, .. } if program == "gauntlet-definitely-missing-binary"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn argv_renders_program_then_arguments() {
    let invocation = Invocation::new("cargo").arg("test").arg("--lib");
    assert_eq!(invocation.argv(), vec!["cargo", "test", "--lib"]);
}

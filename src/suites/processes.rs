//! Exit-test self-checks
//!
//! The parent side launches this binary again; the child side runs one of
//! the bodies registered in [`exit_tests`].

use crate::exit_test::{
    expect_exit, require_exit, CapturedValues, ExitCondition, ExitTest, ExitTestRegistry,
};
use crate::expect::{expect, expect_eq, log_message, record_issue, KnownIssue};
use crate::models::{Test, TestId, Trait};

pub(super) fn tests() -> Vec<Test> {
    let suite = TestId::new(["ExitTests"]);

    vec![
        Test::suite(suite.clone())
            .with_display_name("Exit tests")
            .with_trait(Trait::tags(["exit-test"])),
        Test::function(suite.child("exit code"), exit_code),
        Test::function(suite.child("clean exit"), clean_exit),
        Test::function(suite.child("abort"), abort),
        Test::function(suite.child("panic"), panic),
        Test::function(suite.child("standard output"), standard_output),
        Test::function(suite.child("forwarded issue"), forwarded_issue),
    ]
}

/// Bodies this binary runs when re-entered as an exit test
pub fn exit_tests() -> ExitTestRegistry {
    ExitTestRegistry::new()
        .with("exit-with-code", exit_with_code)
        .with("succeed", |_| async { Ok(()) })
        .with("abort", child_aborts)
        .with("panic", child_panics)
        .with("print", print)
        .with("record-issue", child_records_issue)
}

async fn exit_code() -> anyhow::Result<()> {
    let captures = CapturedValues::new().with("code", &123i32)?;
    let artifacts = expect_exit(
        ExitTest::new("exit-with-code").with_captures(captures),
        ExitCondition::ExitCode(123),
    )
    .await;
    expect(
        ExitCondition::Failure.matches(&artifacts.exit_condition),
        "a nonzero exit code is a failure",
    );
    Ok(())
}

async fn clean_exit() -> anyhow::Result<()> {
    require_exit(ExitTest::new("succeed"), ExitCondition::Success).await?;
    Ok(())
}

async fn abort() -> anyhow::Result<()> {
    let artifacts = expect_exit(ExitTest::new("abort"), ExitCondition::Failure).await;
    #[cfg(unix)]
    expect_eq(artifacts.exit_condition, ExitCondition::Signal(6));
    #[cfg(not(unix))]
    let _ = artifacts;
    Ok(())
}

async fn panic() -> anyhow::Result<()> {
    let artifacts = expect_exit(ExitTest::new("panic").observing_stderr(), ExitCondition::Failure).await;
    expect(
        artifacts.stderr_lossy().contains("child gave up"),
        "the panic message reached stderr",
    );
    Ok(())
}

async fn standard_output() -> anyhow::Result<()> {
    let artifacts = expect_exit(ExitTest::new("print").observing_stdout(), ExitCondition::Success).await;
    expect_eq(artifacts.stdout_lossy().as_str(), "hello from the child\n");
    expect(artifacts.stderr.is_empty(), "stderr was not observed");
    Ok(())
}

async fn forwarded_issue() -> anyhow::Result<()> {
    KnownIssue::new("the child always reports this")
        .matching(|issue| issue.comments.iter().any(|c| c == "reported by the child"))
        .run(async {
            expect_exit(ExitTest::new("record-issue"), ExitCondition::Success).await;
            Ok(())
        })
        .await;
    Ok(())
}

async fn exit_with_code(captures: CapturedValues) -> anyhow::Result<()> {
    let code: i32 = captures.get("code")?;
    std::process::exit(code)
}

async fn child_aborts(_: CapturedValues) -> anyhow::Result<()> {
    std::process::abort()
}

async fn child_panics(_: CapturedValues) -> anyhow::Result<()> {
    panic!("child gave up")
}

async fn print(_: CapturedValues) -> anyhow::Result<()> {
    println!("hello from the child");
    Ok(())
}

async fn child_records_issue(_: CapturedValues) -> anyhow::Result<()> {
    log_message("about to record");
    record_issue("reported by the child");
    Ok(())
}

//! Engine self-checks
//!
//! Exercises expectations, confirmations, polling, known issues,
//! parameterization and serialization through the real runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::expect::{
    confirm_passes_eventually, confirmation, expect, expect_eq, log_message, require, require_some,
    KnownIssue, PollingOptions,
};
use crate::models::{Case, Test, TestId, Trait};

pub(super) fn tests() -> Vec<Test> {
    let suite = TestId::new(["Engine"]);
    let serialized = suite.child("Serialized");

    vec![
        Test::suite(suite.clone()).with_display_name("Engine self-checks"),
        Test::function(suite.child("expectations"), expectations)
            .with_trait(Trait::tags(["smoke"])),
        Test::parameterized(suite.child("squares"), [1u32, 2, 3, 12], squares)
            .with_trait(Trait::tags(["smoke"])),
        Test::function(suite.child("confirmations"), confirmations),
        Test::function(suite.child("polling"), polling)
            .with_trait(Trait::time_limit(Duration::from_secs(5))),
        Test::function(suite.child("known issues"), known_issues),
        Test::function(suite.child("platform specific"), || async { Ok(()) })
            .with_trait(Trait::enabled_if("runs on unix only", || Ok(cfg!(unix)))),
        Test::function(suite.child("never runs"), || async { Ok(()) })
            .with_trait(Trait::disabled_because("kept as an example of a disabled test")),
        Test::suite(serialized.clone()).with_trait(Trait::serialized()),
        Test::function(serialized.child("first"), one_at_a_time),
        Test::function(serialized.child("second"), one_at_a_time),
        Test::function(serialized.child("third"), one_at_a_time),
    ]
}

async fn expectations() -> anyhow::Result<()> {
    let items = vec!["bolt", "nut", "washer"];
    require(!items.is_empty(), "items were loaded")?;
    let first = require_some(items.first(), "a first item exists")?;
    expect_eq(*first, "bolt");
    expect(items.len() == 3, "three items");
    log_message(format!("checked {} items", items.len()));
    Ok(())
}

async fn squares(case: Case) -> anyhow::Result<()> {
    let n: u32 = case.argument()?;
    expect_eq(n * n / n, n);
    expect(n * n >= n, format!("{n} squared is at least {n}"));
    Ok(())
}

async fn confirmations() -> anyhow::Result<()> {
    confirmation("every tick is seen", 3usize, |ticks| async move {
        for _ in 0..3 {
            tokio::task::yield_now().await;
            ticks.confirm();
        }
        Ok(())
    })
    .await?;

    confirmation("batches arrive in range", 2usize..=4, |batches| async move {
        batches.confirm_by(3);
        Ok(())
    })
    .await
}

async fn polling() -> anyhow::Result<()> {
    let ready = Arc::new(AtomicUsize::new(0));
    let background = {
        let ready = ready.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ready.store(1, Ordering::SeqCst);
        })
    };

    let options = PollingOptions::new(Duration::from_millis(5), Duration::from_secs(2))?;
    let observed = confirm_passes_eventually("background work finishes", options, || {
        let ready = ready.clone();
        async move { Ok(ready.load(Ordering::SeqCst) == 1) }
    })
    .await;
    background.await?;
    expect(observed, "polling saw the background work");
    Ok(())
}

async fn known_issues() -> anyhow::Result<()> {
    KnownIssue::new("rounding is off by one")
        .run(async {
            expect_eq(7 / 2, 4);
            Ok(())
        })
        .await;

    KnownIssue::new("only fails under load")
        .intermittent()
        .run(async { Ok(()) })
        .await;
    Ok(())
}

static RUNNING: AtomicUsize = AtomicUsize::new(0);

async fn one_at_a_time() -> anyhow::Result<()> {
    let running = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(10)).await;
    RUNNING.fetch_sub(1, Ordering::SeqCst);
    expect(running == 1, format!("{running} serialized tests ran at once"));
    Ok(())
}

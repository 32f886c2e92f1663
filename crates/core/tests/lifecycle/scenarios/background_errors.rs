//! Errors raised by background activity during a test.

use std::thread;

use virtrun_core::bus::BG_ERR_FILE;
use virtrun_core::runner::from_fn;
use virtrun_core::{BackgroundError, PipelineOutcome, TestError, TestTypeRegistry};

use crate::helpers::{Harness, params};

fn read_report(h: &Harness) -> String {
    std::fs::read_to_string(h.ctx.logdir().join(BG_ERR_FILE)).unwrap()
}

#[tokio::test]
async fn background_errors_error_the_test_and_are_reported_in_order() {
    // Given: A type whose helper activity records three errors
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "migrate",
            Box::new(from_fn(|ctx, _, _| {
                for i in 0..3 {
                    ctx.background_errors()
                        .record(BackgroundError::new("MigrationError", format!("watcher {i} lost")));
                }
                Ok(())
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("migrate")).await;

    // Then: Errored, with a report holding exactly three numbered entries
    assert_eq!(
        outcome,
        PipelineOutcome::Errored(
            "Background errors are detected, please refer to file: 'background-error.log' for more details."
                .to_owned()
        )
    );
    let report = read_report(&h);
    assert!(report.starts_with("BACKGROUND ERROR LIST:"));
    assert_eq!(report.matches("- ERROR #").count(), 3);
    let positions: Vec<usize> = (0..3)
        .map(|i| report.find(&format!("watcher {i} lost")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "append order kept");
    assert!(report.contains("- ERROR #2 -"));
    assert!(!report.contains("- ERROR #3 -"));
    assert!(h.events.contains("postprocess_on_error"));
}

#[tokio::test]
async fn concurrent_background_writers_are_all_reported() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "stress",
            Box::new(from_fn(|ctx, _, _| {
                let handles: Vec<_> = (0..4)
                    .map(|t| {
                        let bus = ctx.background_errors().clone();
                        thread::spawn(move || {
                            for i in 0..25 {
                                bus.record(BackgroundError::new("IOError", format!("t{t}-{i}")));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().map_err(|_| TestError::error("writer thread panicked"))?;
                }
                Ok(())
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("stress")).await;

    assert!(matches!(outcome, PipelineOutcome::Errored(_)));
    assert_eq!(read_report(&h).matches("- ERROR #").count(), 100);
}

#[tokio::test]
async fn single_background_error_uses_singular_message() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "boot",
            Box::new(from_fn(|ctx, _, _| {
                let handle = ctx
                    .background_errors()
                    .spawn_watched("serial-reader", || {
                        Err(std::io::Error::other("console closed unexpectedly"))
                    })
                    .map_err(|e| TestError::error(e.to_string()))?;
                handle.join().map_err(|_| TestError::error("reader panicked"))?;
                Ok(())
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    let result = pipeline.run(&h.ctx, &mut params("boot")).await;

    let err = result.unwrap_err();
    assert!(err.message().starts_with("Background error is detected"), "got: {err}");
    assert!(read_report(&h).contains("console closed unexpectedly"));
}

#[tokio::test]
async fn bus_is_cleared_when_a_test_starts() {
    // Given: A stale error from a previous test
    let h = Harness::new();
    h.ctx
        .background_errors()
        .record(BackgroundError::new("Stale", "left over"));
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    // Then
    assert_eq!(outcome, PipelineOutcome::Passed);
    assert!(h.ctx.background_errors().is_empty());
    assert!(!h.ctx.logdir().join(BG_ERR_FILE).exists());
}

#[tokio::test]
async fn runner_error_wins_but_report_is_still_written() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "boot",
            Box::new(from_fn(|ctx, _, _| {
                ctx.background_errors()
                    .record(BackgroundError::new("QMPError", "monitor went away"));
                Err(TestError::fail("login timed out"))
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("boot")).await;

    assert_eq!(outcome, PipelineOutcome::Failed("login timed out".to_owned()));
    assert!(read_report(&h).contains("monitor went away"));
}

#[tokio::test]
async fn background_error_stops_remaining_types() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "a",
            Box::new(from_fn(|ctx, _, _| {
                ctx.background_errors().record(BackgroundError::new("E", "x"));
                Ok(())
            })),
        )
        .unwrap();
    h.register_ok(&mut registry, "b");
    let pipeline = h.pipeline(registry, h.process());

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a b")).await;

    assert!(matches!(outcome, PipelineOutcome::Errored(_)));
    assert!(!h.events.contains("run:b"));
}

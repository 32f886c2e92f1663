//! Error recovery and postprocess failure handling.

use virtrun_core::runner::from_fn;
use virtrun_core::{ExitFunction, PipelineOutcome, TestError, TestTypeRegistry};

use crate::helpers::{Harness, params};

#[tokio::test]
async fn postprocess_failure_after_pass_propagates() {
    let h = Harness::new();
    let process = h.process().failing_postprocess(TestError::error("could not collect logs"));
    let pipeline = h.pipeline(h.passing_registry(&["a"]), process);

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    assert_eq!(outcome, PipelineOutcome::Errored("could not collect logs".to_owned()));
}

#[tokio::test]
async fn postprocess_failure_after_failed_run_is_suppressed() {
    // Given: A failing type and a failing postprocess
    let h = Harness::new();
    let mut registry = h.passing_registry(&[]);
    h.register_err(&mut registry, "a", TestError::fail("checksum mismatch"));
    let process = h.process().failing_postprocess(TestError::error("could not collect logs"));
    let pipeline = h.pipeline(registry, process);

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    // Then: The running error is what gets reported
    assert_eq!(outcome, PipelineOutcome::Failed("checksum mismatch".to_owned()));
    assert!(h.events.contains("postprocess(test_passed=false)"));
}

#[tokio::test]
async fn warning_raised_by_a_body_takes_the_error_path() {
    let h = Harness::new();
    let mut registry = h.passing_registry(&[]);
    h.register_err(&mut registry, "a", TestError::warn("slow boot"));
    let process = h.process().failing_postprocess(TestError::fail("guest left dirty"));
    let pipeline = h.pipeline(registry, process);

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    // The body did not pass, so the postprocess failure is suppressed
    assert_eq!(outcome, PipelineOutcome::Warned("slow boot".to_owned()));
    assert!(h.events.contains("postprocess(test_passed=false)"));
}

#[tokio::test]
async fn postprocess_failure_replaces_an_exit_function_warning() {
    // Given: A passing body whose exit function fails, and a failing postprocess
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "a",
            Box::new(from_fn(|ctx, _, _| {
                ctx.exit_functions()
                    .register("a", ExitFunction::new("stop_netperf", || Err(TestError::error("no pid"))));
                Ok(())
            })),
        )
        .unwrap();
    let process = h.process().failing_postprocess(TestError::fail("guest left dirty"));
    let pipeline = h.pipeline(registry, process);

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    // Then
    assert_eq!(outcome, PipelineOutcome::Failed("guest left dirty".to_owned()));
}

#[tokio::test]
async fn postprocess_on_error_failure_keeps_original_error() {
    let h = Harness::new();
    let mut registry = h.passing_registry(&[]);
    h.register_err(&mut registry, "a", TestError::fail("original"));
    let process = h
        .process()
        .failing_postprocess_on_error(TestError::error("on-error hook broke"));
    let pipeline = h.pipeline(registry, process);

    let result = pipeline.run(&h.ctx, &mut params("a")).await;

    assert_eq!(result, Err(TestError::fail("original")));
    assert_eq!(h.store.saves(), 4, "preprocess, type, recovery, finalization");
}

#[tokio::test]
async fn skip_raised_by_a_type_is_reported_as_skip() {
    let h = Harness::new();
    let mut registry = h.passing_registry(&[]);
    h.register_err(&mut registry, "a", TestError::skip("host lacks SR-IOV"));
    let pipeline = h.pipeline(registry, h.process());

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    assert_eq!(outcome, PipelineOutcome::Skipped("host lacks SR-IOV".to_owned()));
    assert!(h.events.contains("postprocess_on_error"));
}

#[tokio::test]
async fn unknown_type_fails_before_loading_the_environment() {
    let h = Harness::new();
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());

    let result = pipeline.run(&h.ctx, &mut params("a missing")).await;

    assert_eq!(
        result,
        Err(TestError::error("No test module found for type 'missing'"))
    );
    assert_eq!(h.store.loads(), 0);
    assert!(!h.events.contains("preprocess"));
}

#[tokio::test]
async fn missing_type_parameter_is_an_error() {
    let h = Harness::new();
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());

    let outcome = pipeline
        .run_outcome(&h.ctx, &mut virtrun_core::Params::new())
        .await;

    assert!(matches!(outcome, PipelineOutcome::Errored(_)));
    assert_eq!(h.store.saves(), 0);
}

//! Exit functions run by the pipeline and job cleanup registration.

use virtrun_core::exit_fn::JOB_EXIT_KEY;
use virtrun_core::runner::from_fn;
use virtrun_core::{ExitFunction, PipelineOutcome, TestError, TestTypeRegistry};

use crate::helpers::{EventLog, Harness, params};

/// Type `name` that registers an exit function logging `exit:<name>`.
fn register_with_exit(
    registry: &mut TestTypeRegistry,
    events: &EventLog,
    name: &'static str,
    result: Result<(), TestError>,
) {
    let events = events.clone();
    registry
        .register(
            name,
            Box::new(from_fn(move |ctx, _, _| {
                events.push(format!("run:{name}"));
                let exit_events = events.clone();
                ctx.exit_functions().register(
                    name,
                    ExitFunction::new(format!("cleanup_{name}"), move || {
                        exit_events.push(format!("exit:{name}"));
                        Ok(())
                    }),
                );
                result.clone()
            })),
        )
        .unwrap();
}

#[tokio::test]
async fn error_recovery_runs_exit_functions_of_the_failing_type_only() {
    // Given: `a` passes, `b` fails, both register exit functions
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    register_with_exit(&mut registry, &h.events, "a", Ok(()));
    register_with_exit(&mut registry, &h.events, "b", Err(TestError::fail("b broke")));
    let pipeline = h.pipeline(registry, h.process());

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a b")).await;

    // Then
    assert_eq!(outcome, PipelineOutcome::Failed("b broke".to_owned()));
    assert!(!h.events.contains("exit:a"), "exit functions of `a` never run");
    assert_eq!(h.events.count("exit:b"), 1);
    assert!(
        h.events.position("exit:b") < h.events.position("postprocess_on_error"),
        "exit functions run before postprocess on error"
    );
    assert_eq!(h.ctx.exit_functions().pending_count("a"), 1);
}

#[tokio::test]
async fn passing_test_runs_exit_functions_of_last_type_before_postprocess() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    register_with_exit(&mut registry, &h.events, "a", Ok(()));
    let pipeline = h.pipeline(registry, h.process());

    let outcome = pipeline.run_outcome(&h.ctx, &mut params("a")).await;

    assert_eq!(outcome, PipelineOutcome::Passed);
    assert!(h.events.position("exit:a") < h.events.position("postprocess(test_passed=true)"));
}

#[tokio::test]
async fn failing_exit_function_downgrades_pass_to_warn() {
    // Given: A passing type whose cleanup fails
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "boot",
            Box::new(from_fn(|ctx, _, _| {
                ctx.exit_functions().register(
                    "boot",
                    ExitFunction::new("remove_iso", || Err(TestError::error("iso busy"))),
                );
                Ok(())
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("boot")).await;

    // Then: Warned, postprocess still ran with test_passed=true
    assert_eq!(
        outcome,
        PipelineOutcome::Warned("funcatexit failed with: Error in remove_iso: iso busy".to_owned())
    );
    assert!(h.events.contains("postprocess(test_passed=true)"));
}

#[tokio::test]
async fn failing_exit_function_goes_through_error_recovery() {
    // Given: A passing type whose once-only cleanup fails
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "boot",
            Box::new(from_fn(|ctx, _, _| {
                ctx.exit_functions().register(
                    "boot",
                    ExitFunction::new("remove_iso", || Err(TestError::error("iso busy"))),
                );
                Ok(())
            })),
        )
        .unwrap();
    let pipeline = h.pipeline(registry, h.process());

    // When
    let outcome = pipeline.run_outcome(&h.ctx, &mut params("boot")).await;

    // Then: Recovery ran and saved before postprocess, which still sees a pass
    assert!(matches!(outcome, PipelineOutcome::Warned(_)));
    assert_eq!(
        h.events.events(),
        vec![
            "load",
            "preprocess",
            "save",
            "save",
            "postprocess_on_error",
            "save",
            "postprocess(test_passed=true)",
            "save",
        ]
    );
    assert_eq!(h.store.saves(), 4, "preprocess, type, recovery, finalization");
}

#[tokio::test]
async fn job_cleanup_is_registered_once_and_destroys_the_environment() {
    // Given: Two tests sharing the default environment
    let h = Harness::new();
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());
    pipeline.run(&h.ctx, &mut params("a")).await.unwrap();
    pipeline.run(&h.ctx, &mut params("a")).await.unwrap();
    assert!(h.env_dir().join("env").exists());

    // Then: One pending job cleanup
    assert_eq!(h.ctx.exit_functions().pending_count(JOB_EXIT_KEY), 1);

    // When: The job ends
    let message = h.ctx.exit_functions().run_exit_functions(JOB_EXIT_KEY);

    // Then: The environment file is gone and the cleanup does not rerun
    assert!(message.is_none());
    assert!(!h.env_dir().join("env").exists());
    assert_eq!(h.store.destroys(), 1);
    h.ctx.exit_functions().run_exit_functions(JOB_EXIT_KEY);
    assert_eq!(h.store.destroys(), 1);
}

#[tokio::test]
async fn job_env_cleanup_no_skips_registration() {
    let h = Harness::new();
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());
    let mut p = params("a");
    p.set("job_env_cleanup", "no");

    pipeline.run(&h.ctx, &mut p).await.unwrap();

    assert_eq!(h.ctx.exit_functions().pending_count(JOB_EXIT_KEY), 0);
}

#[tokio::test]
async fn once_exit_function_requested_twice_runs_once() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    register_with_exit(&mut registry, &h.events, "a", Ok(()));
    let pipeline = h.pipeline(registry, h.process());

    pipeline.run(&h.ctx, &mut params("a")).await.unwrap();
    pipeline.run(&h.ctx, &mut params("a")).await.unwrap();

    assert_eq!(h.events.count("run:a"), 2);
    assert_eq!(h.events.count("exit:a"), 1, "once identity already executed");
}

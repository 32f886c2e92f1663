//! Finalization on panics and cancellation.

use std::sync::Arc;
use std::time::Duration;

use virtrun_core::runner::from_fn;
use virtrun_core::{Environment, Params, TestContext, TestError, TestRunner, TestTypeRegistry};

use crate::helpers::{Harness, params};

/// A body that never completes.
struct Hang;

impl TestRunner for Hang {
    async fn run(
        &self,
        _ctx: &TestContext,
        _params: &Params,
        _env: &mut Environment,
    ) -> Result<(), TestError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn panicking_type_still_finalizes_the_environment() {
    // Given: A type that panics, with env_cleanup requested up front
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry
        .register(
            "crash",
            Box::new(from_fn(|_, _, _| panic!("qemu monitor protocol desync"))),
        )
        .unwrap();
    let pipeline = Arc::new(h.pipeline(registry, h.process()));
    let ctx = h.ctx.clone();

    // When: The run panics inside a task
    let handle = tokio::spawn(async move {
        let mut p = params("crash");
        p.set("env_cleanup", "yes");
        pipeline.run(&ctx, &mut p).await
    });
    let join_err = handle.await.unwrap_err();

    // Then: Finalization saved once more and destroyed
    assert!(join_err.is_panic());
    assert_eq!(h.store.saves(), 2, "preprocess and finalization");
    assert_eq!(h.store.destroys(), 1);
    assert!(!h.env_dir().join("env").exists());
}

#[tokio::test]
async fn cancelled_run_still_finalizes_the_environment() {
    let h = Harness::new();
    let mut registry = TestTypeRegistry::new();
    registry.register("hang", Box::new(Hang)).unwrap();
    let pipeline = h.pipeline(registry, h.process());

    let mut p = params("hang");
    let timed_out = tokio::time::timeout(Duration::from_millis(50), pipeline.run(&h.ctx, &mut p)).await;

    assert!(timed_out.is_err());
    assert_eq!(h.store.saves(), 2, "preprocess and finalization");
    assert_eq!(h.events.events().last().map(String::as_str), Some("save"));
}

#[tokio::test]
async fn finalization_runs_exactly_once_on_the_normal_path() {
    let h = Harness::new();
    let pipeline = h.pipeline(h.passing_registry(&["a"]), h.process());

    pipeline.run(&h.ctx, &mut params("a")).await.unwrap();

    assert_eq!(h.store.saves(), 3);
    assert_eq!(h.store.destroys(), 0);
}

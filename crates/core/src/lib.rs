//! # virtrun-core
//!
//! 가상화 테스트 실행을 위한 생명주기 코어
//!
//! 하나의 테스트는 공유 [`Environment`] (VM, tap, 모니터 연결, 일반 데이터) 위에서
//! 순서대로 실행되는 *타입* 목록입니다. [`ExecutionPipeline`]은 preprocess,
//! 타입 본문, postprocess를 구동하고 어느 단계에서 실패하든 환경이 저장되거나
//! 파괴되도록 보장합니다. 주변 구성 요소:
//!
//! - [`EnvironmentStore`]: 테스트 사이에 환경을 영속화
//! - [`BackgroundErrorBus`]: 보조 스레드에서 발생한 에러 수집
//! - [`ExitFunctionRegistry`]: 키별 정리 콜백 실행
//! - [`AbortPolicy`]: 요청 시 실패를 작업 중단으로 승격
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use virtrun_core::{ExecutionPipeline, Params, TestContext, TestTypeRegistry};
//! use virtrun_core::runner::from_fn;
//!
//! let mut registry = TestTypeRegistry::new();
//! registry.register("boot", Box::new(from_fn(|_, _, _| Ok(()))))?;
//!
//! let pipeline = ExecutionPipeline::builder().registry(registry).build()?;
//! let ctx = TestContext::new("boot", "results/boot");
//! let mut params = Params::from([("type", "boot")]);
//! let outcome = pipeline.run_outcome(&ctx, &mut params).await;
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod bus;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod exit_fn;
pub mod metrics;
pub mod outcome;
pub mod params;
pub mod pipeline;
pub mod runner;
pub mod store;

// --- 재공개 ---

// 에러
pub use error::{ConfigError, EnvError, RegistryError, TestError, VirtrunError};

// 설정
pub use config::RunnerConfig;

// 생명주기
pub use abort::AbortPolicy;
pub use bus::{BackgroundError, BackgroundErrorBus};
pub use context::TestContext;
pub use env::{EnvEntry, Environment, Resource, ResourceKind};
pub use exit_fn::{ExitFunction, ExitFunctionRegistry};
pub use outcome::PipelineOutcome;
pub use params::Params;
pub use pipeline::{ExecutionPipeline, ExecutionPipelineBuilder};
pub use runner::{DynEnvProcess, DynTestRunner, EnvProcess, TestRunner, TestTypeRegistry};
pub use store::{EnvironmentStore, FileEnvStore};

//! 실행 파이프라인 -- 마무리가 보장되는 preprocess, run, postprocess
//!
//! # 상태 머신
//! ```text
//! Init → Preprocessing → Running → Postprocessing → Finalizing → Done
//!             │              │            ▲
//!             └──────┬───────┘            │
//!                    ▼                    │
//!              ErrorRecovery ─────────────┘
//! ```
//!
//! 환경은 preprocess 후, 각 테스트 타입 후, 에러 복구 후, 그리고 마무리 단계에서
//! 저장됩니다. 마무리는 RAII 가드가 소유하므로 협력자가 패닉하거나 실행 중에
//! future가 drop되어도 실행됩니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::abort::AbortPolicy;
use crate::bus::{self, BG_ERR_FILE};
use crate::context::TestContext;
use crate::env::Environment;
use crate::error::{ConfigError, TestError};
use crate::exit_fn::{ExitFunction, JOB_EXIT_KEY};
use crate::metrics as m;
use crate::outcome::PipelineOutcome;
use crate::params::{
    DEFAULT_ENV_NAME, KEY_ABORT_ON_ERROR, KEY_DEPENDENCY_FAILED, KEY_ENV, KEY_ENV_CLEANUP,
    KEY_JOB_ENV_CLEANUP, KEY_TEST_PASSED, Params,
};
use crate::runner::{DynEnvProcess, NoopEnvProcess, ResolvedType, TestTypeRegistry};
use crate::store::{ENV_VERSION, EnvironmentStore, FileEnvStore};

/// 의존 테스트가 통과하지 못한 테스트에 발생시키는 skip 메시지
pub const DEPENDENCY_FAILED_MESSAGE: &str = "Test dependency failed";

// ─── ExecutionPipeline ───────────────────────────────────────────────

/// 테스트 하나를 생명주기에 따라 실행
///
/// 파이프라인은 재사용 가능합니다. 매 [`run`](Self::run)은 자신의 환경을 로드하며
/// 파이프라인 자체에는 아무것도 남기지 않습니다.
pub struct ExecutionPipeline {
    store: Arc<dyn EnvironmentStore>,
    env_process: Arc<dyn DynEnvProcess>,
    registry: Arc<TestTypeRegistry>,
    abort_policy: AbortPolicy,
    env_dir: PathBuf,
    env_version: u32,
}

impl ExecutionPipeline {
    pub fn builder() -> ExecutionPipelineBuilder {
        ExecutionPipelineBuilder::new()
    }

    pub fn env_dir(&self) -> &Path {
        &self.env_dir
    }

    pub fn registry(&self) -> &TestTypeRegistry {
        &self.registry
    }

    /// `params`를 가진 테스트가 사용하는 환경 파일 경로
    pub fn env_path(&self, params: &Params) -> PathBuf {
        self.env_dir.join(params.get_or(KEY_ENV, DEFAULT_ENV_NAME))
    }

    /// 테스트 하나를 실행하고 결과를 보고
    ///
    /// `params`는 preprocess에 가변으로 전달됩니다. 반환 시점에는 `test_passed`와
    /// preprocess가 바꾼 값이 들어 있습니다.
    pub async fn run(&self, ctx: &TestContext, params: &mut Params) -> Result<(), TestError> {
        let result = self.execute(ctx, params).await;

        let outcome = PipelineOutcome::from_result(&result);
        metrics::counter!(m::TESTS_TOTAL, m::LABEL_OUTCOME => outcome.label()).increment(1);
        info!(test = ctx.name(), id = %ctx.id(), outcome = %outcome, "test finished");

        result
    }

    /// [`PipelineOutcome`]으로 변환한 [`run`](Self::run)
    pub async fn run_outcome(&self, ctx: &TestContext, params: &mut Params) -> PipelineOutcome {
        PipelineOutcome::from_result(&self.run(ctx, params).await)
    }

    async fn execute(&self, ctx: &TestContext, params: &mut Params) -> Result<(), TestError> {
        if params.get_boolean(KEY_DEPENDENCY_FAILED, false) {
            info!(test = ctx.name(), "skipping test, a dependency did not pass");
            return Err(TestError::skip(DEPENDENCY_FAILED_MESSAGE));
        }

        info!(
            test = ctx.name(),
            id = %ctx.id(),
            version = env!("CARGO_PKG_VERSION"),
            "starting test"
        );
        for (key, value) in params.iter() {
            debug!(test = ctx.name(), "    {} = {}", key, value);
        }

        // ─── Init ───
        let types = params.test_types()?;
        let resolved = self.registry.resolve(&types)?;

        let env_path = self.env_path(params);
        let env = self.store.load(&env_path, self.env_version);
        ctx.background_errors().clear();

        if params.get_boolean(KEY_JOB_ENV_CLEANUP, true) {
            self.register_job_cleanup(ctx, &env_path);
        }

        let mut guard = EnvGuard::new(
            Arc::clone(&self.store),
            env,
            params.get_boolean(KEY_ENV_CLEANUP, false),
        );

        let result = self.run_phases(ctx, params, &resolved, guard.env_mut()).await;

        // ─── Finalizing ───
        let env = guard.finalize(params.get_boolean(KEY_ENV_CLEANUP, false));

        // ─── Abort check ───
        match result {
            Err(e) if e.is_failure() && params.get_boolean(KEY_ABORT_ON_ERROR, false) => {
                Err(self.abort_policy.escalate(&e, &env))
            }
            other => other,
        }
    }

    fn register_job_cleanup(&self, ctx: &TestContext, env_path: &Path) {
        let store = Arc::clone(&self.store);
        let path = env_path.to_path_buf();
        let version = self.env_version;
        let name = format!("cleanup_env({})", path.display());

        ctx.exit_functions().register(
            JOB_EXIT_KEY,
            ExitFunction::new(name, move || {
                let mut env = store.load(&path, version);
                store.destroy(&mut env);
                Ok(())
            }),
        );
    }

    async fn run_phases(
        &self,
        ctx: &TestContext,
        params: &mut Params,
        types: &[ResolvedType],
        env: &mut Environment,
    ) -> Result<(), TestError> {
        let mut current: Option<&str> = None;
        let body = self.run_body(ctx, params, types, env, &mut current).await;

        let (test_passed, result) = match body {
            Ok(()) => match self.exit_functions_after_pass(ctx, current) {
                Ok(()) => (true, Ok(())),
                // 본문은 통과: 복구는 하되 postprocess는 test_passed=true를 본다.
                Err(warning) => {
                    self.recover(ctx, params, env, current, &warning).await;
                    (true, Err(warning))
                }
            },
            Err(e) => {
                self.recover(ctx, params, env, current, &e).await;
                (false, Err(e))
            }
        };

        // ─── Postprocessing ───
        params.set(KEY_TEST_PASSED, test_passed.to_string());
        match self.env_process.postprocess(ctx, params, env).await {
            Ok(()) => result,
            Err(e) if test_passed => {
                error!(test = ctx.name(), kind = e.kind(), error = %e, "postprocessing failed");
                Err(e)
            }
            Err(e) => {
                error!(
                    test = ctx.name(),
                    kind = e.kind(),
                    "Exception raised during postprocessing: {}", e
                );
                result
            }
        }
    }

    /// Preprocessing과 Running. 마지막으로 시작한 타입을 `current`에 남김
    async fn run_body<'t>(
        &self,
        ctx: &TestContext,
        params: &mut Params,
        types: &'t [ResolvedType],
        env: &mut Environment,
        current: &mut Option<&'t str>,
    ) -> Result<(), TestError> {
        // ─── Preprocessing ───
        let preprocessed = self.env_process.preprocess(ctx, params, env).await;
        self.store.save(env);
        preprocessed?;

        // ─── Running ───
        for resolved in types {
            *current = Some(&resolved.name);
            info!(test = ctx.name(), test_type = %resolved.name, "running test type");

            let ran = resolved.runner.run(ctx, params, env).await;
            let verified = verify_background_errors(ctx);
            self.store.save(env);

            ran?;
            verified?;
        }
        Ok(())
    }

    fn exit_functions_after_pass(&self, ctx: &TestContext, last: Option<&str>) -> Result<(), TestError> {
        let Some(last) = last else {
            return Ok(());
        };
        match ctx.exit_functions().run_exit_functions(last) {
            Some(message) => Err(TestError::warn(format!("funcatexit failed with: {message}"))),
            None => Ok(()),
        }
    }

    // ─── ErrorRecovery ───
    async fn recover(
        &self,
        ctx: &TestContext,
        params: &Params,
        env: &mut Environment,
        current: Option<&str>,
        err: &TestError,
    ) {
        error!(
            test = ctx.name(),
            test_type = current.unwrap_or("<preprocess>"),
            kind = err.kind(),
            error = %err,
            "test raised an error"
        );

        if let Some(t) = current {
            if let Some(message) = ctx.exit_functions().run_exit_functions(t) {
                error!(test = ctx.name(), test_type = t, "{}", message);
            }
        }

        if let Err(e) = self.env_process.postprocess_on_error(ctx, params, env).await {
            error!(test = ctx.name(), kind = e.kind(), error = %e, "postprocess on error failed");
        }
        self.store.save(env);
    }
}

impl std::fmt::Debug for ExecutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPipeline")
            .field("registry", &self.registry)
            .field("env_dir", &self.env_dir)
            .field("env_version", &self.env_version)
            .finish_non_exhaustive()
    }
}

/// 백그라운드 작업이 기록한 에러를 승격
///
/// 버스가 비어 있지 않으면 테스트 로그 디렉토리에 [`BG_ERR_FILE`]을 쓰고 이를
/// 가리키는 [`TestError::Error`]를 반환합니다.
fn verify_background_errors(ctx: &TestContext) -> Result<(), TestError> {
    let errors = ctx.background_errors().drain_all();
    if errors.is_empty() {
        return Ok(());
    }

    metrics::counter!(m::BACKGROUND_ERRORS_TOTAL).increment(errors.len() as u64);
    match bus::write_report(ctx.logdir(), &errors) {
        Ok(path) => info!(test = ctx.name(), path = %path.display(), count = errors.len(), "background error report written"),
        Err(e) => warn!(test = ctx.name(), error = %e, "failed to write background error report"),
    }

    let verb = if errors.len() > 1 { "s are" } else { " is" };
    Err(TestError::error(format!(
        "Background error{verb} detected, please refer to file: '{BG_ERR_FILE}' for more details."
    )))
}

// ─── 마무리 가드 ─────────────────────────────────────────────────────

/// 단계가 진행되는 동안 환경을 소유
///
/// 마무리(저장 후, 저장 실패 또는 cleanup 요청 시 파괴)는 정확히 한 번
/// 실행됩니다. 정상 경로에서는 [`finalize`](Self::finalize)로, 언와인드나 취소
/// 시에는 `Drop`에서 실행됩니다.
struct EnvGuard {
    store: Arc<dyn EnvironmentStore>,
    env: Environment,
    cleanup: bool,
    armed: bool,
}

impl EnvGuard {
    fn new(store: Arc<dyn EnvironmentStore>, env: Environment, cleanup: bool) -> Self {
        Self {
            store,
            env,
            cleanup,
            armed: true,
        }
    }

    fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// 현재 cleanup 플래그로 마무리하고 남은 환경을 반환
    fn finalize(mut self, cleanup: bool) -> Environment {
        self.cleanup = cleanup;
        self.run_finalization();
        std::mem::take(&mut self.env)
    }

    fn run_finalization(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let save_failed = self.store.save(&self.env);
        if save_failed || self.cleanup {
            info!(
                env = self.env.name(),
                save_failed,
                cleanup = self.cleanup,
                "destroying environment"
            );
            self.store.destroy(&mut self.env);
            metrics::counter!(m::ENV_DESTROYED_TOTAL).increment(1);
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(env = self.env.name(), "test did not complete, finalizing environment");
            self.run_finalization();
        }
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// [`ExecutionPipeline`] 빌더
///
/// 기본값: [`FileEnvStore`], [`NoopEnvProcess`], 빈 레지스트리, VM 전용
/// [`AbortPolicy`], 환경 디렉토리는 `<tmp>/virtrun`
pub struct ExecutionPipelineBuilder {
    store: Arc<dyn EnvironmentStore>,
    env_process: Arc<dyn DynEnvProcess>,
    registry: Arc<TestTypeRegistry>,
    abort_policy: AbortPolicy,
    env_dir: PathBuf,
    env_version: u32,
}

impl ExecutionPipelineBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(FileEnvStore::new()),
            env_process: Arc::new(NoopEnvProcess),
            registry: Arc::new(TestTypeRegistry::new()),
            abort_policy: AbortPolicy::default(),
            env_dir: std::env::temp_dir().join("virtrun"),
            env_version: ENV_VERSION,
        }
    }

    pub fn store(mut self, store: Arc<dyn EnvironmentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn env_process(mut self, env_process: Arc<dyn DynEnvProcess>) -> Self {
        self.env_process = env_process;
        self
    }

    pub fn registry(mut self, registry: TestTypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn shared_registry(mut self, registry: Arc<TestTypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    /// `env` 파라미터의 기준 디렉토리
    pub fn env_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.env_dir = dir.into();
        self
    }

    /// 기대하는 환경 버전. 버전이 다른 파일은 버려집니다.
    pub fn env_version(mut self, version: u32) -> Self {
        self.env_version = version;
        self
    }

    pub fn build(self) -> Result<ExecutionPipeline, ConfigError> {
        if self.env_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "env_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.env_version == 0 {
            return Err(ConfigError::InvalidValue {
                field: "env_version".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(ExecutionPipeline {
            store: self.store,
            env_process: self.env_process,
            registry: self.registry,
            abort_policy: self.abort_policy,
            env_dir: self.env_dir,
            env_version: self.env_version,
        })
    }
}

impl Default for ExecutionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

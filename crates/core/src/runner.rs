//! 테스트 협력자 -- 타입별 러너와 환경 처리
//!
//! [`TestRunner`]는 테스트 타입 하나의 본문이고, [`EnvProcess`]는 본문 전후로
//! 환경을 준비하고 정리합니다. 두 trait 모두 RPITIT를 사용하므로 dyn 호환
//! 쌍둥이([`DynTestRunner`], [`DynEnvProcess`])가 자동 구현되어 trait 객체가
//! 필요한 곳에 쓰입니다.
//!
//! [`TestTypeRegistry`]는 타입 이름을 러너에 매핑하며, 테스트마다 환경 작업 전에
//! 한 번 조회됩니다.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::TestContext;
use crate::env::Environment;
use crate::error::{RegistryError, TestError};
use crate::params::Params;

/// dyn 호환 trait이 사용하는 힙 할당 `Send` future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── TestRunner ──────────────────────────────────────────────────────

/// 단일 테스트 타입의 본문
///
/// # 사용 예시
/// ```ignore
/// struct Boot;
///
/// impl TestRunner for Boot {
///     async fn run(
///         &self,
///         ctx: &TestContext,
///         params: &Params,
///         env: &mut Environment,
///     ) -> Result<(), TestError> {
///         let vm = env.get("vm1").ok_or_else(|| TestError::error("vm1 missing"))?;
///         // ...
///         Ok(())
///     }
/// }
/// ```
pub trait TestRunner: Send + Sync {
    fn run(
        &self,
        ctx: &TestContext,
        params: &Params,
        env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send;
}

/// dyn 호환 [`TestRunner`]
pub trait DynTestRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>>;
}

impl<T: TestRunner> DynTestRunner for T {
    fn run<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>> {
        Box::pin(TestRunner::run(self, ctx, params, env))
    }
}

/// 동기 클로저 기반 [`TestRunner`]
pub struct FnRunner<F> {
    f: F,
}

/// 클로저를 [`TestRunner`]로 감쌈
pub fn from_fn<F>(f: F) -> FnRunner<F>
where
    F: Fn(&TestContext, &Params, &mut Environment) -> Result<(), TestError> + Send + Sync,
{
    FnRunner { f }
}

impl<F> TestRunner for FnRunner<F>
where
    F: Fn(&TestContext, &Params, &mut Environment) -> Result<(), TestError> + Send + Sync,
{
    fn run(
        &self,
        ctx: &TestContext,
        params: &Params,
        env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send {
        std::future::ready((self.f)(ctx, params, env))
    }
}

// ─── EnvProcess ──────────────────────────────────────────────────────

/// 테스트 본문 전후의 환경 준비 및 정리
///
/// `preprocess`는 받은 파라미터를 조정할 수 있습니다 (예: 파생 값 채우기).
/// 조정된 집합을 본문과 postprocess가 보게 됩니다.
pub trait EnvProcess: Send + Sync {
    fn preprocess(
        &self,
        ctx: &TestContext,
        params: &mut Params,
        env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send;

    /// `params`에 `test_passed`가 설정된 상태로 호출됨
    fn postprocess(
        &self,
        ctx: &TestContext,
        params: &Params,
        env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send;

    /// 에러 경로에서 `postprocess` 전에 수행하는 추가 정리
    fn postprocess_on_error(
        &self,
        _ctx: &TestContext,
        _params: &Params,
        _env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send {
        std::future::ready(Ok(()))
    }
}

/// dyn 호환 [`EnvProcess`]
pub trait DynEnvProcess: Send + Sync {
    fn preprocess<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a mut Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>>;

    fn postprocess<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>>;

    fn postprocess_on_error<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>>;
}

impl<T: EnvProcess> DynEnvProcess for T {
    fn preprocess<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a mut Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>> {
        Box::pin(EnvProcess::preprocess(self, ctx, params, env))
    }

    fn postprocess<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>> {
        Box::pin(EnvProcess::postprocess(self, ctx, params, env))
    }

    fn postprocess_on_error<'a>(
        &'a self,
        ctx: &'a TestContext,
        params: &'a Params,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<(), TestError>> {
        Box::pin(EnvProcess::postprocess_on_error(self, ctx, params, env))
    }
}

/// 아무 일도 하지 않는 [`EnvProcess`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnvProcess;

impl EnvProcess for NoopEnvProcess {
    fn preprocess(
        &self,
        _ctx: &TestContext,
        _params: &mut Params,
        _env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send {
        std::future::ready(Ok(()))
    }

    fn postprocess(
        &self,
        _ctx: &TestContext,
        _params: &Params,
        _env: &mut Environment,
    ) -> impl Future<Output = Result<(), TestError>> + Send {
        std::future::ready(Ok(()))
    }
}

// ─── TestTypeRegistry ────────────────────────────────────────────────

/// 러너에 바인딩된 테스트 타입 이름
#[derive(Clone)]
pub struct ResolvedType {
    pub name: String,
    pub runner: Arc<dyn DynTestRunner>,
}

impl std::fmt::Debug for ResolvedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedType")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// 타입 이름을 키로 하는 테스트 러너 레지스트리
///
/// 등록 순서가 유지되며 [`list`](Self::list)가 그 순서로 보고합니다.
#[derive(Default)]
pub struct TestTypeRegistry {
    runners: Vec<(String, Arc<dyn DynTestRunner>)>,
}

impl TestTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name`으로 `runner` 등록
    ///
    /// 이미 사용 중인 이름이면 실패합니다.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        runner: Box<dyn DynTestRunner>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        self.runners.push((name, Arc::from(runner)));
        Ok(())
    }

    /// `name`으로 등록된 러너를 제거하고 반환
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn DynTestRunner>, RegistryError> {
        match self.runners.iter().position(|(n, _)| n == name) {
            Some(idx) => Ok(self.runners.remove(idx).1),
            None => Err(RegistryError::NotFound {
                name: name.to_owned(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynTestRunner>> {
        self.runners
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| Arc::clone(r))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runners.iter().any(|(n, _)| n == name)
    }

    pub fn count(&self) -> usize {
        self.runners.len()
    }

    pub fn list(&self) -> Vec<&str> {
        self.runners.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// 선언된 모든 타입을 선언 순서대로 러너에 바인딩
    ///
    /// 알 수 없는 타입이 하나라도 있으면 전체가 실패합니다.
    pub fn resolve(&self, types: &[String]) -> Result<Vec<ResolvedType>, TestError> {
        types
            .iter()
            .map(|t| {
                self.get(t)
                    .map(|runner| ResolvedType {
                        name: t.clone(),
                        runner,
                    })
                    .ok_or_else(|| TestError::error(format!("No test module found for type '{t}'")))
            })
            .collect()
    }
}

impl std::fmt::Debug for TestTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTypeRegistry")
            .field("types", &self.list())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

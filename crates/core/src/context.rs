//! 모든 협력자에게 전달되는 테스트별 컨텍스트

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::bus::BackgroundErrorBus;
use crate::exit_fn::ExitFunctionRegistry;

/// 실행 중인 테스트의 식별 정보와 공유 핸들
///
/// 백그라운드 에러 버스와 exit function 레지스트리는 명시적 핸들입니다. 작업
/// 러너는 모든 테스트에 같은 레지스트리를 넘겨 작업 종료 콜백이 테스트 간에
/// 누적되게 합니다.
#[derive(Debug, Clone)]
pub struct TestContext {
    id: Uuid,
    name: String,
    logdir: PathBuf,
    background_errors: BackgroundErrorBus,
    exit_functions: ExitFunctionRegistry,
}

impl TestContext {
    /// 새 버스와 레지스트리로 컨텍스트 생성
    pub fn new(name: impl Into<String>, logdir: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            logdir: logdir.into(),
            background_errors: BackgroundErrorBus::new(),
            exit_functions: ExitFunctionRegistry::new(),
        }
    }

    pub fn with_background_errors(mut self, bus: BackgroundErrorBus) -> Self {
        self.background_errors = bus;
        self
    }

    pub fn with_exit_functions(mut self, registry: ExitFunctionRegistry) -> Self {
        self.exit_functions = registry;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 이 테스트의 결과 디렉토리. 백그라운드 에러 보고서도 여기에 기록됩니다.
    pub fn logdir(&self) -> &Path {
        &self.logdir
    }

    pub fn background_errors(&self) -> &BackgroundErrorBus {
        &self.background_errors
    }

    pub fn exit_functions(&self) -> &ExitFunctionRegistry {
        &self.exit_functions
    }
}

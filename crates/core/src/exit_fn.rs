//! Exit function -- 정해진 생명주기 지점에서 실행되는 정리 콜백
//!
//! 테스트 코드는 키(보통 테스트 타입) 아래에 콜백을 등록하고, 파이프라인은 해당
//! 타입이 끝나면 그 키로 [`ExitFunctionRegistry::run_exit_functions`]를
//! 호출합니다. [`JOB_EXIT_KEY`] 아래 등록된 콜백은 마지막 테스트 후 작업 러너가
//! 실행합니다.
//!
//! `once` 등록은 `(key, name)`으로 식별되며, 몇 번 등록되거나 요청되든
//! 레지스트리 수명 동안 최대 한 번만 실행됩니다.

use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::bus::panic_message;
use crate::error::TestError;
use crate::metrics as m;

/// 작업 전역 정리 콜백이 등록되는 키
pub const JOB_EXIT_KEY: &str = "__job__";

/// 박싱된 정리 콜백. 인자는 클로저가 캡처합니다.
pub type ExitCallback = Box<dyn FnOnce() -> Result<(), TestError> + Send>;

/// 이름 있는 정리 콜백
pub struct ExitFunction {
    name: String,
    callback: ExitCallback,
    once: bool,
}

impl ExitFunction {
    /// `once` exit function 생성
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce() -> Result<(), TestError> + Send + 'static,
    {
        Self {
            name: name.into(),
            callback: Box::new(callback),
            once: true,
        }
    }

    /// 같은 `(key, name)`의 반복 등록과 실행을 허용
    pub fn repeatable(mut self) -> Self {
        self.once = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_once(&self) -> bool {
        self.once
    }
}

impl fmt::Debug for ExitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitFunction")
            .field("name", &self.name)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    pending: Vec<(String, ExitFunction)>,
    executed: HashSet<(String, String)>,
}

/// 키별로 순서가 유지되는 [`ExitFunction`] 레지스트리
///
/// 복제 비용이 낮으며 복제본은 같은 레지스트리를 공유합니다.
#[derive(Clone, Default)]
pub struct ExitFunctionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ExitFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `key` 아래에 `func` 등록
    ///
    /// 같은 이름의 `once` 함수가 이미 대기 중이거나 `key` 아래에서 실행된 적이
    /// 있으면 아무것도 추가하지 않고 `false`를 반환합니다.
    pub fn register(&self, key: impl Into<String>, func: ExitFunction) -> bool {
        let key = key.into();
        let mut state = self.lock();

        if func.once {
            let identity = (key.clone(), func.name.clone());
            let pending = state
                .pending
                .iter()
                .any(|(k, f)| f.once && *k == key && f.name == func.name);
            if pending || state.executed.contains(&identity) {
                debug!(key = %key, name = %func.name, "exit function already registered");
                return false;
            }
        }

        debug!(key = %key, name = %func.name, once = func.once, "exit function registered");
        state.pending.push((key, func));
        true
    }

    /// `key` 아래 대기 중인 모든 함수를 등록 순서대로 실행
    ///
    /// 일부가 실패해도 모두 실행합니다. 실패(반환된 에러와 패닉)는 실패한 함수당
    /// 한 줄씩 하나의 메시지로 합쳐집니다. 콜백 실행 중에는 레지스트리 락을 잡지
    /// 않으므로 콜백이 다른 함수를 추가로 등록할 수 있습니다.
    pub fn run_exit_functions(&self, key: &str) -> Option<String> {
        let matching = {
            let mut state = self.lock();
            let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|(k, _)| k == key);
            state.pending = rest;
            for (k, func) in &matching {
                if func.once {
                    state.executed.insert((k.clone(), func.name.clone()));
                }
            }
            matching
        };

        let mut errors = Vec::new();
        for (_, func) in matching {
            let ExitFunction { name, callback, .. } = func;
            debug!(key, name = %name, "running exit function");
            let failure = match panic::catch_unwind(AssertUnwindSafe(callback)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(&*payload)),
            };
            warn!(key, name = %name, error = %failure, "exit function failed");
            metrics::counter!(m::EXIT_FUNCTION_FAILURES_TOTAL).increment(1);
            errors.push(format!("Error in {name}: {failure}"));
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors.join("\n"))
        }
    }

    /// `key` 아래 실행 대기 중인 함수 수
    pub fn pending_count(&self, key: &str) -> usize {
        self.lock().pending.iter().filter(|(k, _)| k == key).count()
    }
}

impl fmt::Debug for ExitFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ExitFunctionRegistry")
            .field("pending", &state.pending.len())
            .field("executed", &state.executed.len())
            .finish()
    }
}

//! 백그라운드 에러 버스 -- 주 테스트 흐름 밖에서 발생한 에러
//!
//! 테스트 본문은 보조 스레드(시리얼 콘솔 리더, 마이그레이션 감시자)를 자주
//! 띄웁니다. 이 스레드들은 파이프라인에 에러를 반환할 수 없으므로 대신 여기에
//! [`record`](BackgroundErrorBus::record)합니다. 파이프라인은 각 테스트 타입 후에
//! 버스를 확인하고, 비어 있지 않으면 테스트를 에러로 처리하고 테스트 로그
//! 디렉토리에 [`BG_ERR_FILE`] 보고서를 남깁니다.
//!
//! 버스는 복제 비용이 낮은 핸들이며 모든 복제본이 같은 목록을 공유합니다.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::SystemTime;

/// 테스트 로그 디렉토리에 기록되는 보고서 이름
pub const BG_ERR_FILE: &str = "background-error.log";

/// 백그라운드 작업에서 포착된 에러
///
/// 생성 후 불변이며 버스는 공유 참조만 내줍니다.
#[derive(Debug, Clone)]
pub struct BackgroundError {
    kind: String,
    message: String,
    context: String,
    origin: Option<String>,
    captured_at: SystemTime,
}

impl BackgroundError {
    /// 추가 컨텍스트 없이 현재 스레드 이름으로 에러 생성
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            context: String::new(),
            origin: thread::current().name().map(str::to_owned),
            captured_at: SystemTime::now(),
        }
    }

    /// 현재 백트레이스와 함께 에러 포착
    pub fn capture(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_context(Backtrace::force_capture().to_string())
    }

    /// `std::error::Error`를 포착하고 source 체인을 컨텍스트로 사용
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let mut context = String::new();
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = writeln!(context, "caused by: {cause}");
            source = cause.source();
        }
        Self::new(std::any::type_name::<E>(), err.to_string()).with_context(context)
    }

    /// 트레이스백 형태의 컨텍스트 첨부
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// 에러가 포착된 스레드 이름 (있는 경우)
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// 보고서 파일에 쓰이는 트레이스백 형식 출력
    pub fn format(&self) -> String {
        let mut out = String::new();
        if let Some(origin) = &self.origin {
            let _ = writeln!(out, "Thread: {origin}");
        }
        if !self.context.is_empty() {
            out.push_str(self.context.trim_end());
            out.push('\n');
        }
        let _ = writeln!(out, "{}: {}", self.kind, self.message);
        out
    }
}

/// 스레드 안전한 추가 전용 [`BackgroundError`] 공유 목록
#[derive(Debug, Clone, Default)]
pub struct BackgroundErrorBus {
    errors: Arc<Mutex<Vec<Arc<BackgroundError>>>>,
}

impl BackgroundErrorBus {
    pub fn new() -> Self {
        Self::default()
    }

    // push는 전부 아니면 전무이므로 락을 쥔 채 패닉한 writer도 깨진 항목을
    // 남기지 않는다. poisoning은 무시한다.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<BackgroundError>>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 기록된 에러를 모두 제거
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 에러 추가. 어느 스레드에서든 호출 가능합니다.
    pub fn record(&self, error: BackgroundError) {
        tracing::error!(
            kind = error.kind(),
            origin = error.origin().unwrap_or("<unnamed>"),
            message = error.message(),
            "background error recorded"
        );
        self.lock().push(Arc::new(error));
    }

    /// 기록된 모든 에러의 스냅샷 (추가 순서)
    ///
    /// 항목은 제거되지 않습니다. 제거는 [`clear`](Self::clear)만 합니다.
    pub fn drain_all(&self) -> Vec<Arc<BackgroundError>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 실패가 이 버스에 기록되는 이름 있는 스레드 생성
    ///
    /// `Err` 반환은 [`BackgroundError::from_error`]로, 패닉은 페이로드를 메시지로
    /// 기록합니다.
    pub fn spawn_watched<F, E>(&self, name: impl Into<String>, f: F) -> std::io::Result<thread::JoinHandle<()>>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let bus = self.clone();
        thread::Builder::new().name(name.into()).spawn(move || {
            match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => bus.record(BackgroundError::from_error(&e)),
                Err(payload) => bus.record(BackgroundError::capture("panic", panic_message(&*payload))),
            }
        })
    }
}

/// 패닉 페이로드의 텍스트 (가능한 경우)
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// 보고서 본문 생성: 헤더 뒤에 에러마다 번호 붙은 블록 하나
pub fn format_report(errors: &[Arc<BackgroundError>]) -> String {
    let mut lines = vec!["BACKGROUND ERROR LIST:".to_owned()];
    for (index, error) in errors.iter().enumerate() {
        lines.push(format!("- ERROR #{index} -\n{}", error.format()));
    }
    lines.join("\n")
}

/// `dir`에 [`BG_ERR_FILE`]을 쓰고 경로를 반환
pub fn write_report(dir: &Path, errors: &[Arc<BackgroundError>]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(BG_ERR_FILE);
    std::fs::write(&path, format_report(errors))?;
    Ok(path)
}

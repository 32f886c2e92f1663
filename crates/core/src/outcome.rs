//! 보고용 테스트 결과

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TestError;

/// 파이프라인 실행 한 번의 최종 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Passed,
    Skipped(String),
    Warned(String),
    Failed(String),
    Errored(String),
    /// 실패로 작업 전체가 멈춤
    Aborted(String),
}

impl PipelineOutcome {
    /// 파이프라인 결과를 결과 상태로 변환
    pub fn from_result(result: &Result<(), TestError>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(TestError::Skip(m)) => Self::Skipped(m.clone()),
            Err(TestError::Warn(m)) => Self::Warned(m.clone()),
            Err(TestError::Fail(m)) => Self::Failed(m.clone()),
            Err(TestError::Error(m)) => Self::Errored(m.clone()),
            Err(e @ TestError::JobAbort(_)) => Self::Aborted(e.to_string()),
        }
    }

    /// 작업을 실패로 만드는 결과이면 `true`
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Errored(_) | Self::Aborted(_))
    }

    /// 의존성 판단상 통과로 간주되면 `true`
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed | Self::Warned(_))
    }

    /// 메트릭 레이블 값
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "pass",
            Self::Skipped(_) => "skip",
            Self::Warned(_) => "warn",
            Self::Failed(_) => "fail",
            Self::Errored(_) => "error",
            Self::Aborted(_) => "abort",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Skipped(r) | Self::Warned(r) | Self::Failed(r) | Self::Errored(r) | Self::Aborted(r) => {
                Some(r.as_str())
            }
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.label().to_ascii_uppercase();
        match self.reason() {
            Some(reason) => write!(f, "{status}: {reason}"),
            None => write!(f, "{status}"),
        }
    }
}

//! 중단 정책 -- 테스트 실패를 작업 중단으로 승격
//!
//! 승격 전에 정책 필터가 선택한 모든 살아 있는 자원을 로그에 기술합니다 (이름,
//! 제어 채널, 생성 명령). 작업이 멈춘 뒤 사람이 남은 자원에 접속할 수 있도록
//! 하기 위함입니다.

use std::fmt;

use tracing::{error, info};

use crate::env::{Environment, Resource, ResourceKind};
use crate::error::TestError;
use crate::metrics as m;

type ResourceFilter = Box<dyn Fn(&dyn Resource) -> bool + Send + Sync>;

/// 작업 중단 시 어떤 자원을 기술할지 결정
pub struct AbortPolicy {
    filter: ResourceFilter,
}

impl AbortPolicy {
    /// `filter`가 허용한 자원을 기술하는 정책
    pub fn new<F>(filter: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool + Send + Sync + 'static,
    {
        Self {
            filter: Box::new(filter),
        }
    }

    /// 특정 종류의 자원을 기술하는 정책
    pub fn for_kind(kind: ResourceKind) -> Self {
        Self::new(move |r| r.kind() == kind)
    }

    pub fn matches(&self, resource: &dyn Resource) -> bool {
        (self.filter)(resource)
    }

    /// 조건에 맞는 모든 살아 있는 자원의 진단 정보를 로그로 출력
    ///
    /// 기술한 자원 수를 반환합니다.
    pub fn log_diagnostics(&self, env: &Environment) -> usize {
        let mut described = 0;
        for (key, resource) in env.resources() {
            if !resource.is_alive() || !self.matches(resource) {
                continue;
            }
            let diag = resource.diagnostics();
            info!(key, "{} '{}' is alive.", resource.kind(), diag.name);
            for channel in &diag.control_channels {
                info!(
                    key,
                    "It has a {} control channel at: {}", channel.protocol, channel.address
                );
            }
            if let Some(command) = &diag.create_command {
                info!(key, "The command line used to start it was:\n{}", command);
            }
            described += 1;
        }
        described
    }

    /// `err`를 메시지를 유지한 [`TestError::JobAbort`]로 변환
    ///
    /// 환경은 읽기만 합니다.
    pub fn escalate(&self, err: &TestError, env: &Environment) -> TestError {
        error!(kind = err.kind(), "Aborting job ({})", err);
        let described = self.log_diagnostics(env);
        info!(env = env.name(), described, "abort diagnostics collected");
        metrics::counter!(m::JOB_ABORTS_TOTAL).increment(1);
        TestError::JobAbort(err.to_string())
    }
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self::for_kind(ResourceKind::Vm)
    }
}

impl fmt::Debug for AbortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortPolicy").finish_non_exhaustive()
    }
}

//! 메트릭 이름 및 레이블 상수
//!
//! 생명주기 코어가 `metrics` 파사드로 내보내는 모든 카운터의 이름을 여기서
//! 정의합니다. 레코더가 설치되지 않았으면 매크로는 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `virtrun_`
//! - 접미어: `_total` (counter)
//!
//! ```ignore
//! metrics::counter!(virtrun_core::metrics::TESTS_TOTAL, virtrun_core::metrics::LABEL_OUTCOME => "pass")
//!     .increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (pass, skip, warn, fail, error, abort)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// 파이프라인으로 실행된 테스트 수 (counter, label: outcome)
pub const TESTS_TOTAL: &str = "virtrun_tests_total";

/// 중단 정책으로 중단된 작업 수 (counter)
pub const JOB_ABORTS_TOTAL: &str = "virtrun_job_aborts_total";

// ─── Environment 메트릭 ─────────────────────────────────────────────

/// 실패한 환경 저장 시도 수 (counter)
pub const ENV_SAVE_FAILURES_TOTAL: &str = "virtrun_env_save_failures_total";

/// 마무리 단계에서 파괴된 환경 수 (counter)
pub const ENV_DESTROYED_TOTAL: &str = "virtrun_env_destroyed_total";

// ─── 백그라운드 에러 / exit function 메트릭 ─────────────────────────

/// 테스트 타입 실행 후 발견된 백그라운드 에러 수 (counter)
pub const BACKGROUND_ERRORS_TOTAL: &str = "virtrun_background_errors_total";

/// 실패한 exit function 콜백 수 (counter)
pub const EXIT_FUNCTION_FAILURES_TOTAL: &str = "virtrun_exit_function_failures_total";

// ─── Job 메트릭 ─────────────────────────────────────────────────────

/// 작업이 일찍 멈춰 실행되지 않은 테스트 수 (counter)
pub const JOB_TESTS_NOT_RUN_TOTAL: &str = "virtrun_job_tests_not_run_total";

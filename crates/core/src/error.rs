//! 에러 타입 -- 도메인별 에러 정의
//!
//! [`TestError`]는 모든 단계 경계에서 쓰이는 분류 체계입니다. 협력자는 `Ok(())`
//! 또는 그 종류 중 하나를 반환합니다. 나머지 열거형은 설정, 환경 영속화, 테스트
//! 타입 레지스트리 에러를 다루며 [`VirtrunError`]가 이를 모두 감쌉니다.

/// virtrun 최상위 에러
#[derive(Debug, thiserror::Error)]
pub enum VirtrunError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 환경 영속화 에러
    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    /// 테스트 타입 레지스트리 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 테스트가 통과하지 못한 상태로 종료됨
    #[error("test error: {0}")]
    Test(#[from] TestError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 테스트 단계에서 발생하는, 결과를 결정하는 에러
///
/// variant가 테스트의 보고 방식을 결정합니다. 페이로드는 사람이 읽을 수 있는
/// 원인이며 어떤 승격을 거쳐도 보존됩니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    /// 사전 조건 때문에 테스트를 실행할 수 없음
    #[error("{0}")]
    Skip(String),

    /// 본문은 통과했지만 부수 조건이 잘못됨
    #[error("{0}")]
    Warn(String),

    /// 테스트 본문이 실패를 감지함
    #[error("{0}")]
    Fail(String),

    /// 테스트를 완료할 수 없음 (인프라 또는 예상치 못한 에러)
    #[error("{0}")]
    Error(String),

    /// 실패가 작업 전체 중단으로 승격됨
    #[error("Abort requested ({0})")]
    JobAbort(String),
}

impl TestError {
    /// [`TestError::Skip`] 생성
    pub fn skip(message: impl Into<String>) -> Self {
        Self::Skip(message.into())
    }

    /// [`TestError::Warn`] 생성
    pub fn warn(message: impl Into<String>) -> Self {
        Self::Warn(message.into())
    }

    /// [`TestError::Fail`] 생성
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    /// [`TestError::Error`] 생성
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// 로그 필드로 쓰이는 variant의 짧은 소문자 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Skip(_) => "skip",
            Self::Warn(_) => "warn",
            Self::Fail(_) => "fail",
            Self::Error(_) => "error",
            Self::JobAbort(_) => "abort",
        }
    }

    /// variant 장식을 제외한 원인 메시지
    pub fn message(&self) -> &str {
        match self {
            Self::Skip(m) | Self::Warn(m) | Self::Fail(m) | Self::Error(m) | Self::JobAbort(m) => m,
        }
    }

    /// [`TestError::Fail`]과 [`TestError::Error`]이면 `true`
    ///
    /// abort 정책이 승격할 수 있는 종류입니다.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail(_) | Self::Error(_))
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 잘못된 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 환경 영속화 에러
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// 하나 이상의 항목을 영속 형식으로 표현할 수 없음
    #[error("unrepresentable environment content: {}", .details.join("; "))]
    Unrepresentable { details: Vec<String> },

    /// 영속 형식 직렬화 실패
    #[error("failed to serialize environment: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 환경 파일 쓰기 실패
    #[error("failed to write environment file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 테스트 타입 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 같은 타입 이름의 러너가 이미 등록됨
    #[error("test type already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 해당 타입 이름으로 등록된 러너가 없음
    #[error("test type not found: {name}")]
    NotFound { name: String },
}

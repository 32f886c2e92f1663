//! 러너 설정 -- virtrun.toml 파싱 및 런타임 설정
//!
//! [`RunnerConfig`]는 작업 자체를 제외하고 작업 러너에 필요한 모든 설정(로깅,
//! 환경 저장 위치, 결과 저장 위치)을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 순서
//! 1. 설정 파일 (`virtrun.toml`)
//! 2. 환경변수 (`VIRTRUN_ENV_TMP_DIR=/srv/vt` 형식)
//! 3. `validate()`
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), virtrun_core::error::VirtrunError> {
//! use virtrun_core::config::RunnerConfig;
//!
//! let config = RunnerConfig::load("virtrun.toml").await?;
//! let config = RunnerConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, VirtrunError};
use crate::store::ENV_VERSION;

/// virtrun 러너 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub env: EnvConfig,
    #[serde(default)]
    pub job: JobConfig,
}

impl RunnerConfig {
    /// TOML 파일에서 로드한 뒤 환경변수 오버라이드 적용 및 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, VirtrunError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 환경변수 오버라이드 없이 TOML 파일에서 로드
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, VirtrunError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VirtrunError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                VirtrunError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    pub fn parse(toml_str: &str) -> Result<Self, VirtrunError> {
        toml::from_str(toml_str).map_err(|e| {
            VirtrunError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// `VIRTRUN_{SECTION}_{FIELD}` 환경변수로 값 오버라이드
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "VIRTRUN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "VIRTRUN_GENERAL_LOG_FORMAT");

        override_path(&mut self.env.tmp_dir, "VIRTRUN_ENV_TMP_DIR");
        override_u32(&mut self.env.version, "VIRTRUN_ENV_VERSION");

        override_path(&mut self.job.results_dir, "VIRTRUN_JOB_RESULTS_DIR");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        if self.env.tmp_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "env.tmp_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.env.version == 0 {
            return Err(ConfigError::InvalidValue {
                field: "env.version".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.job.results_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "job.results_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 환경 영속화 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// 환경 파일을 보관하는 디렉토리
    pub tmp_dir: PathBuf,
    /// 기대하는 환경 형식 버전
    pub version: u32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir().join("virtrun"),
            version: ENV_VERSION,
        }
    }
}

/// 작업 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// 이 디렉토리 아래에 테스트마다 하위 디렉토리가 생성됨
    pub results_dir: PathBuf,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_path(target: &mut PathBuf, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

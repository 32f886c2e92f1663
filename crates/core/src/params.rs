//! 테스트 파라미터 -- 모든 단계에 전달되는 평면 키/값 스냅샷
//!
//! [`Params`]는 코어 외부(작업 파일, variant 생성기)에서 만들어지며 파이프라인은
//! 읽기만 합니다. 유일한 예외는 [`KEY_TEST_PASSED`]로, postprocess 직전에
//! 파이프라인이 기록합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TestError};

/// 실행할 테스트 타입 목록 (공백 구분, 실행 순서)
pub const KEY_TYPE: &str = "type";
/// 환경 디렉토리 기준 환경 파일 이름
pub const KEY_ENV: &str = "env";
/// 선행 테스트가 통과하지 못했을 때 설정되며 테스트는 건너뜁니다.
pub const KEY_DEPENDENCY_FAILED: &str = "dependency_failed";
/// 작업 종료 시 환경 파괴 콜백 등록 여부 (기본값: yes)
pub const KEY_JOB_ENV_CLEANUP: &str = "job_env_cleanup";
/// 저장에 성공했더라도 테스트 종료 시 환경을 파괴
pub const KEY_ENV_CLEANUP: &str = "env_cleanup";
/// 실패한 테스트를 작업 중단으로 승격
pub const KEY_ABORT_ON_ERROR: &str = "abort_on_error";
/// postprocess 전에 파이프라인이 기록
pub const KEY_TEST_PASSED: &str = "test_passed";

/// [`KEY_ENV`]가 없을 때의 기본 환경 파일 이름
pub const DEFAULT_ENV_NAME: &str = "env";

/// 테스트 파라미터 스냅샷
///
/// 로깅과 직렬화 결과가 안정적이도록 키는 정렬 상태로 유지됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    /// 빈 파라미터 집합 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 스칼라 값으로 된 TOML 테이블에서 파라미터 생성
    ///
    /// 문자열은 그대로, 숫자와 불리언은 문자열로 변환하고 스칼라 배열은 공백 하나로
    /// 이어 붙입니다 (`type = ["boot", "reboot"]`는 `type = "boot reboot"`와 같음).
    pub fn from_table(table: &toml::Table) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();
        for (key, value) in table {
            values.insert(key.clone(), scalar_to_string(key, value)?);
        }
        Ok(Self { values })
    }

    /// 최상위가 파라미터 테이블인 TOML 문서 파싱
    pub fn parse_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(toml_str).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        Self::from_table(&table)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// 불리언 플래그 읽기
    ///
    /// `yes/no`, `true/false`, `on/off`, `1/0`을 허용합니다 (대소문자 무시).
    /// 인식할 수 없는 값은 로그를 남기고 `default`로 처리합니다.
    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(raw) => parse_bool(raw).unwrap_or_else(|| {
                warn!(key, value = raw, "unrecognized boolean parameter, using default");
                default
            }),
        }
    }

    /// 파라미터를 설정하고 이전 값을 반환
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 선언된 테스트 타입 (실행 순서)
    ///
    /// `type`이 없거나 비어 있으면 실행할 수 없으므로 [`TestError::Error`]로
    /// 보고합니다.
    pub fn test_types(&self) -> Result<Vec<String>, TestError> {
        let types: Vec<String> = self
            .get(KEY_TYPE)
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if types.is_empty() {
            return Err(TestError::error(
                "test parameters do not declare any 'type' to run",
            ));
        }
        Ok(types)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn scalar_to_string(key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "yes" } else { "no" }.to_owned()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::Array(_) | toml::Value::Table(_) => Err(nested(key)),
                other => scalar_to_string(key, other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" ")),
        toml::Value::Table(_) => Err(nested(key)),
    }
}

fn nested(key: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: key.to_owned(),
        reason: "parameters must be scalars or arrays of scalars".to_owned(),
    }
}

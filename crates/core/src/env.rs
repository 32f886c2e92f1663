//! 테스트 환경 -- 한 테스트의 여러 단계가 공유하는 자원
//!
//! [`Environment`]는 이름과 버전을 가진, 문자열 키에서 [`EnvEntry`] 값으로의
//! 맵입니다. 항목은 일반 JSON 데이터, 살아 있는 [`Resource`] 핸들(VM, tap,
//! 모니터 소켓), 또는 디스크에서 복원되었지만 아직 다시 연결되지 않은 자원
//! 스냅샷 중 하나입니다.
//!
//! 영속화는 [`crate::store`]가 담당하며 이 모듈은 데이터 모델만 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ─── ResourceKind ────────────────────────────────────────────────────

/// 살아 있는 자원의 분류
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// 가상 머신
    Vm,
    /// 네트워크 tap 장치
    Tap,
    /// 모니터 / 제어 연결
    Monitor,
    /// 그 외
    Custom(String),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vm => write!(f, "vm"),
            Self::Tap => write!(f, "tap"),
            Self::Monitor => write!(f, "monitor"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

// ─── Resource ────────────────────────────────────────────────────────

/// 자원의 영속 형식
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub kind: ResourceKind,
    pub name: String,
    /// 자원별 상태 (코어는 내용을 해석하지 않음)
    pub state: serde_json::Value,
}

/// 자원이 노출하는 제어 채널 (예: QMP 모니터 소켓)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlChannel {
    pub protocol: String,
    pub address: String,
}

/// 작업 중단 시 로그에 남기는 식별 정보
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDiagnostics {
    pub name: String,
    pub control_channels: Vec<ControlChannel>,
    /// 자원 생성에 사용된 명령줄 또는 설정
    pub create_command: Option<String>,
}

/// 환경에 저장되는 살아 있는 핸들
///
/// 구현체는 [`Resource::snapshot`]으로 저장 후에도 남을 부분을 결정합니다.
/// `Err`를 반환하면 표현 불가능한 핸들(열린 소켓, 자식 프로세스)로 간주되며,
/// 저장소는 일부만 기록된 파일을 쓰는 대신 해당 키를 보고합니다.
pub trait Resource: Send + Sync + fmt::Debug {
    fn kind(&self) -> ResourceKind;

    fn name(&self) -> &str;

    /// 실제 객체가 사라지면 `false` (VM 종료, tap 제거)
    fn is_alive(&self) -> bool {
        true
    }

    /// 직렬화 가능한 자원 상태, 또는 그럴 수 없는 이유
    fn snapshot(&self) -> Result<serde_json::Value, String>;

    fn diagnostics(&self) -> ResourceDiagnostics {
        ResourceDiagnostics {
            name: self.name().to_owned(),
            ..ResourceDiagnostics::default()
        }
    }

    /// 자원 해제. 환경이 파괴될 때 호출됩니다.
    fn release(&mut self) {}
}

// ─── EnvEntry ────────────────────────────────────────────────────────

/// [`Environment`]의 단일 값
#[derive(Debug)]
pub enum EnvEntry {
    /// 일반 데이터
    Value(serde_json::Value),
    /// 살아 있는 자원 핸들
    Resource(Box<dyn Resource>),
    /// 디스크에서 읽은 자원 상태 (살아 있는 객체와 연결되지 않음)
    Detached(ResourceSnapshot),
}

impl EnvEntry {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&dyn Resource> {
        match self {
            Self::Resource(r) => Some(r.as_ref()),
            _ => None,
        }
    }

    pub fn as_detached(&self) -> Option<&ResourceSnapshot> {
        match self {
            Self::Detached(s) => Some(s),
            _ => None,
        }
    }
}

// ─── Environment ─────────────────────────────────────────────────────

/// 한 테스트의 단계 간 공유 상태
///
/// `Default`는 분리된 이름 없는 환경을 만듭니다. 파이프라인이 실제 환경을
/// 호출자에게 돌려준 뒤 그 자리에 남는 값입니다.
#[derive(Debug, Default)]
pub struct Environment {
    name: String,
    path: PathBuf,
    version: u32,
    data: BTreeMap<String, EnvEntry>,
}

impl Environment {
    /// `path`에 바인딩된 빈 환경 생성
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            version,
            data: BTreeMap::new(),
        }
    }

    pub(crate) fn with_data(mut self, data: BTreeMap<String, EnvEntry>) -> Self {
        self.data = data;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn insert_value(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<EnvEntry> {
        self.data.insert(key.into(), EnvEntry::Value(value))
    }

    pub fn insert_resource(
        &mut self,
        key: impl Into<String>,
        resource: Box<dyn Resource>,
    ) -> Option<EnvEntry> {
        self.data.insert(key.into(), EnvEntry::Resource(resource))
    }

    pub fn get(&self, key: &str) -> Option<&EnvEntry> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut EnvEntry> {
        self.data.get_mut(key)
    }

    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.get(key).and_then(EnvEntry::as_value)
    }

    pub fn remove(&mut self, key: &str) -> Option<EnvEntry> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &EnvEntry)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 환경 키별 살아 있는 자원
    pub fn resources(&self) -> impl Iterator<Item = (&str, &dyn Resource)> {
        self.data
            .iter()
            .filter_map(|(k, v)| v.as_resource().map(|r| (k.as_str(), r)))
    }

    /// 특정 종류의 살아 있는 자원
    pub fn resources_of<'a>(
        &'a self,
        kind: &'a ResourceKind,
    ) -> impl Iterator<Item = (&'a str, &'a dyn Resource)> + 'a {
        self.resources().filter(move |(_, r)| &r.kind() == kind)
    }

    /// 모든 살아 있는 자원을 해제하고 항목을 모두 제거
    pub fn clear(&mut self) {
        for entry in self.data.values_mut() {
            if let EnvEntry::Resource(resource) = entry {
                resource.release();
            }
        }
        self.data.clear();
    }
}

//! 환경 영속화 -- 로드, 저장, 파괴
//!
//! [`EnvironmentStore`]는 파이프라인이 사용하는 경계입니다. 계약은 비대칭입니다:
//! `load`는 실패하지 않고(쓸 수 없는 파일은 "이전 상태 없음"), `save`는 에러를
//! 전파하지 않습니다 (실패는 로그로 남기고 `bool`로 보고하여 호출자가 파괴를
//! 강제할 수 있게 함).
//!
//! [`FileEnvStore`]는 환경마다 JSON 문서 하나를 보관합니다:
//!
//! ```text
//! { "version": 1, "data": { "<key>": { "entry": "value" | "resource", "payload": ... } } }
//! ```
//!
//! 쓰기는 같은 디렉토리의 임시 파일에 한 뒤 대상 위에 rename하므로, 읽는 쪽은
//! 일부만 기록된 환경을 보지 않습니다.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::env::{EnvEntry, Environment, ResourceSnapshot};
use crate::error::EnvError;
use crate::metrics as m;

/// 현재 디스크 환경 형식 버전
pub const ENV_VERSION: u32 = 1;

/// [`Environment`] 영속 저장소
pub trait EnvironmentStore: Send + Sync {
    /// `path`의 환경 로드
    ///
    /// 파일이 없거나 읽을 수 없거나 손상되었거나 버전이 다르면 `path`와 `version`에
    /// 바인딩된 빈 환경을 반환합니다.
    fn load(&self, path: &Path, version: u32) -> Environment;

    /// 이전 상태를 대체하여 `env`를 영속화
    fn try_save(&self, env: &Environment) -> Result<(), EnvError>;

    /// 모든 자원을 해제하고 `env`를 비운 뒤 영속 상태 삭제
    ///
    /// 멱등이어야 합니다.
    fn destroy(&self, env: &mut Environment);

    /// 최선 노력 저장. 저장에 **실패**하면 `true`를 반환합니다.
    fn save(&self, env: &Environment) -> bool {
        match self.try_save(env) {
            Ok(()) => {
                debug!(env = env.name(), entries = env.len(), "environment saved");
                false
            }
            Err(e) => {
                warn!(env = env.name(), error = %e, "unable to save environment");
                metrics::counter!(m::ENV_SAVE_FAILURES_TOTAL).increment(1);
                true
            }
        }
    }
}

// ─── 영속 형식 ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEnv {
    version: u32,
    data: BTreeMap<String, PersistedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "entry", content = "payload", rename_all = "snake_case")]
enum PersistedEntry {
    Value(serde_json::Value),
    Resource(ResourceSnapshot),
}

/// 디스크에 쓰기 전 직렬화 가능 여부 점검
///
/// 디스크를 건드리기 전에 모든 항목의 스냅샷을 떠 보고, 표현할 수 없는 항목마다
/// 한 줄씩 모읍니다.
fn to_persisted(env: &Environment) -> Result<PersistedEnv, EnvError> {
    let mut data = BTreeMap::new();
    let mut unrepresentable = Vec::new();

    for (key, entry) in env.entries() {
        let persisted = match entry {
            EnvEntry::Value(value) => PersistedEntry::Value(value.clone()),
            EnvEntry::Detached(snapshot) => PersistedEntry::Resource(snapshot.clone()),
            EnvEntry::Resource(resource) => match resource.snapshot() {
                Ok(state) => PersistedEntry::Resource(ResourceSnapshot {
                    kind: resource.kind(),
                    name: resource.name().to_owned(),
                    state,
                }),
                Err(reason) => {
                    unrepresentable.push(format!(
                        "'{}' ({} '{}'): {}",
                        key,
                        resource.kind(),
                        resource.name(),
                        reason
                    ));
                    continue;
                }
            },
        };
        data.insert(key.to_owned(), persisted);
    }

    if !unrepresentable.is_empty() {
        return Err(EnvError::Unrepresentable {
            details: unrepresentable,
        });
    }

    Ok(PersistedEnv {
        version: env.version(),
        data,
    })
}

fn from_persisted(path: &Path, persisted: PersistedEnv) -> Environment {
    let data = persisted
        .data
        .into_iter()
        .map(|(key, entry)| {
            let entry = match entry {
                PersistedEntry::Value(value) => EnvEntry::Value(value),
                PersistedEntry::Resource(snapshot) => EnvEntry::Detached(snapshot),
            };
            (key, entry)
        })
        .collect();
    Environment::new(path, persisted.version).with_data(data)
}

// ─── FileEnvStore ────────────────────────────────────────────────────

/// JSON 파일 기반 [`EnvironmentStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FileEnvStore;

impl FileEnvStore {
    pub fn new() -> Self {
        Self
    }
}

impl EnvironmentStore for FileEnvStore {
    fn load(&self, path: &Path, version: u32) -> Environment {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no environment file, starting empty");
                return Environment::new(path, version);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read environment file, starting empty");
                return Environment::new(path, version);
            }
        };

        let persisted: PersistedEnv = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupted environment file, starting empty");
                return Environment::new(path, version);
            }
        };

        if persisted.version != version {
            info!(
                path = %path.display(),
                found = persisted.version,
                expected = version,
                "incompatible environment file found, not using it"
            );
            return Environment::new(path, version);
        }

        let env = from_persisted(path, persisted);
        debug!(env = env.name(), entries = env.len(), "environment loaded");
        env
    }

    fn try_save(&self, env: &Environment) -> Result<(), EnvError> {
        let persisted = to_persisted(env)?;
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        write_atomic(env.path(), &bytes)
    }

    fn destroy(&self, env: &mut Environment) {
        env.clear();
        match std::fs::remove_file(env.path()) {
            Ok(()) => info!(path = %env.path().display(), "environment file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %env.path().display(),
                error = %e,
                "failed to remove environment file"
            ),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EnvError> {
    let write_err = |source: std::io::Error| EnvError::Write {
        path: path.display().to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

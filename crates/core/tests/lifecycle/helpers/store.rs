//! Environment store wrapper that counts and logs every call.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use virtrun_core::error::EnvError;
use virtrun_core::{Environment, EnvironmentStore, FileEnvStore};

use super::EventLog;

/// [`FileEnvStore`] with call counters.
///
/// Save attempts are counted in `try_save`, so the provided `save` of the
/// trait is what the pipeline exercises.
#[derive(Debug)]
pub struct CountingStore {
    inner: FileEnvStore,
    events: EventLog,
    saves: AtomicUsize,
    destroys: AtomicUsize,
    loads: AtomicUsize,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new(events: EventLog) -> Self {
        Self {
            inner: FileEnvStore::new(),
            events,
            saves: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Read back what is currently persisted at `path`.
    pub fn peek(&self, path: &Path) -> Environment {
        self.inner.load(path, virtrun_core::store::ENV_VERSION)
    }
}

impl EnvironmentStore for CountingStore {
    fn load(&self, path: &Path, version: u32) -> Environment {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.events.push("load");
        self.inner.load(path, version)
    }

    fn try_save(&self, env: &Environment) -> Result<(), EnvError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.events.push("save");
        self.inner.try_save(env)
    }

    fn destroy(&self, env: &mut Environment) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.events.push("destroy");
        self.inner.destroy(env);
    }
}

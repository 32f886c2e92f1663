//! Mock resources stored in test environments.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use virtrun_core::env::{ControlChannel, ResourceDiagnostics};
use virtrun_core::{Resource, ResourceKind};

/// A VM handle that can be persisted.
#[derive(Debug)]
pub struct MockVm {
    pub name: String,
    pub alive: bool,
    pub released: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockVm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            alive: true,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }

    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl Resource for MockVm {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Vm
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn snapshot(&self) -> Result<serde_json::Value, String> {
        Ok(json!({ "name": self.name, "alive": self.alive }))
    }

    fn diagnostics(&self) -> ResourceDiagnostics {
        ResourceDiagnostics {
            name: self.name.clone(),
            control_channels: vec![ControlChannel {
                protocol: "qmp".to_owned(),
                address: format!("/var/tmp/monitor-{}.sock", self.name),
            }],
            create_command: Some(format!("qemu-kvm -name '{}' -m 1024", self.name)),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// An open monitor connection; it cannot be persisted.
#[derive(Debug)]
pub struct LiveSocket {
    pub path: String,
    pub released: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl LiveSocket {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl Resource for LiveSocket {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Monitor
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn snapshot(&self) -> Result<serde_json::Value, String> {
        Err(format!("open unix socket {}", self.path))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

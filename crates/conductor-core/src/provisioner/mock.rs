use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use conductor_types::ServiceDescriptor;
use tokio::sync::Notify;

use crate::{
    error::{Error, Result},
    provisioner::{ProgressSink, Provisioner},
};

#[derive(Debug, Default)]
struct MockState {
    installed: HashSet<String>,
    failing: HashSet<String>,
    gate: Option<Arc<Notify>>,
    runs: Vec<String>,
}

/// Provisioner that only flips an in-memory "installed" flag.
#[derive(Debug, Clone, Default)]
pub struct MockProvisioner {
    state: Arc<Mutex<MockState>>,
}

impl MockProvisioner {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn installed(self, service: &str) -> Self {
        self.lock().installed.insert(service.to_owned());
        self
    }

    pub fn failing(self, service: &str) -> Self {
        self.lock().failing.insert(service.to_owned());
        self
    }

    /// Every provisioning run blocks until the returned gate is notified.
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().gate = Some(gate.clone());
        gate
    }

    pub fn runs(&self) -> Vec<String> {
        self.lock().runs.clone()
    }
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(&self, service: &ServiceDescriptor, progress: &ProgressSink) -> Result<()> {
        let gate = {
            let mut state = self.lock();
            state.runs.push(service.name.clone());
            state.gate.clone()
        };

        progress.executing("start", "starting to set up python environment");
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.lock();
        if state.failing.contains(&service.name) {
            return Err(Error::MissingManifest(service.work_dir.join("requirements.txt")));
        }
        state.installed.insert(service.name.clone());
        Ok(())
    }

    fn is_installed(&self, service: &ServiceDescriptor) -> bool {
        self.lock().installed.contains(&service.name)
    }

    async fn launch_env(&self, _service: &ServiceDescriptor) -> Vec<(String, String)> {
        Vec::new()
    }
}

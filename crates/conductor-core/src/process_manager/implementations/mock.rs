use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    process_manager::types::{ExitNotifier, ExitWatch, ProcessExit},
    CommandSpec, ProcId, ProcessManager, Spawned,
};

/// What a mocked process does once spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockBehavior {
    #[default]
    KeepRunning,
    ExitImmediately(i32),
    FailSpawn,
}

#[derive(Debug, Default)]
struct MockState {
    behaviors: HashMap<String, MockBehavior>,
    spawned: Vec<CommandSpec>,
    kills: Vec<ProcId>,
    running: HashMap<ProcId, (String, ExitNotifier)>,
    next_id: u64,
}

/// Shared handle: clones observe and drive the same fake processes.
#[derive(Debug, Clone, Default)]
pub struct MockProcessManager {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessManager {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn with_behavior(self, service: &str, behavior: MockBehavior) -> Self {
        self.lock().behaviors.insert(service.to_owned(), behavior);
        self
    }

    pub fn spawn_count(&self, service: &str) -> usize {
        self.lock()
            .spawned
            .iter()
            .filter(|spec| spec.name == service)
            .count()
    }

    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.lock().spawned.clone()
    }

    pub fn kill_count(&self) -> usize {
        self.lock().kills.len()
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Make the live process of `service` exit on its own.
    pub fn exit(&self, service: &str, code: i32) -> bool {
        let mut state = self.lock();
        let Some(id) = state
            .running
            .iter()
            .find(|(_, (name, _))| name == service)
            .map(|(id, _)| *id)
        else {
            return false;
        };
        if let Some((_, notifier)) = state.running.remove(&id) {
            notifier.notify(ProcessExit { code: Some(code) });
        }
        true
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn spawn(&mut self, spec: CommandSpec) -> Result<Spawned> {
        let mut state = self.lock();
        let behavior = state
            .behaviors
            .get(&spec.name)
            .copied()
            .unwrap_or_default();
        state.spawned.push(spec.clone());

        if behavior == MockBehavior::FailSpawn {
            return Err(Error::ProcessSpawn {
                service: spec.name,
                source: std::io::Error::other("mock spawn failure"),
            });
        }

        let id = ProcId(state.next_id);
        state.next_id += 1;

        let (notifier, exited) = ExitWatch::channel();
        match behavior {
            MockBehavior::ExitImmediately(code) => {
                notifier.notify(ProcessExit { code: Some(code) });
            }
            _ => {
                state.running.insert(id, (spec.name, notifier));
            }
        }

        Ok(Spawned {
            id,
            pid: None,
            stdout: Box::pin(futures::stream::empty()),
            stderr: Box::pin(futures::stream::empty()),
            exited,
        })
    }

    async fn wait(&mut self, id: ProcId, _d: Duration) -> Result<Option<ProcessExit>> {
        if self.lock().running.contains_key(&id) {
            Ok(None)
        } else {
            Ok(Some(ProcessExit { code: None }))
        }
    }

    async fn kill(&mut self, id: ProcId) -> Result<()> {
        let mut state = self.lock();
        state.kills.push(id);
        if let Some((_, notifier)) = state.running.remove(&id) {
            notifier.notify(ProcessExit { code: None });
        }
        Ok(())
    }
}

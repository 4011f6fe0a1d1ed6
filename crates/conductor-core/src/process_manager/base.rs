use std::time::Duration;

use crate::{
    error::Result,
    process_manager::types::{CommandSpec, ProcId, ProcessExit, Spawned},
};

#[async_trait::async_trait]
pub trait ProcessManager: Send + Sync {
    /// Spawn a new process. Its exit watch is attached before this returns.
    async fn spawn(&mut self, spec: CommandSpec) -> Result<Spawned>;
    /// Wait for a process to exit.
    async fn wait(&mut self, id: ProcId, d: Duration) -> Result<Option<ProcessExit>>;
    /// Forcefully kill a process.
    async fn kill(&mut self, id: ProcId) -> Result<()>;
}

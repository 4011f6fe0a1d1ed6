mod base;
mod implementations;
mod types;

pub use base::ProcessManager;
#[cfg(test)]
pub(crate) use implementations::{MockBehavior, MockProcessManager};
#[cfg(unix)]
pub use implementations::UnixProcessManager;
pub use types::{BoxStream, CommandSpec, ExitNotifier, ExitWatch, ProcId, ProcessExit, Spawned};

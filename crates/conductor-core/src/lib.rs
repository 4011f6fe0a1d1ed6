pub mod error;
mod output;
mod ports;
pub mod process_manager;
pub mod provisioner;
pub mod readiness;
pub mod registry;

pub use error::{Error, Result};
pub use ports::PortAllocator;
#[cfg(unix)]
pub use process_manager::UnixProcessManager;
pub use process_manager::{CommandSpec, ProcId, ProcessExit, ProcessManager, Spawned};
pub use provisioner::{ProgressSink, Provisioner, PythonEnvProvisioner};
pub use readiness::Readiness;
pub use registry::{BootResult, RegistryEvent, ServiceHandle, ServiceRegistry, SetupProgressStream};

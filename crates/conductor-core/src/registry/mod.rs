mod background;
mod commands;
mod machine;
mod main;

pub use commands::RegistryEvent;
pub use main::{BootResult, ServiceHandle, ServiceRegistry, SetupProgressStream};

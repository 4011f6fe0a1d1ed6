mod run;
mod setup;
mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use conductor_config::load_from_path;
use conductor_core::{PythonEnvProvisioner, ServiceRegistry, UnixProcessManager};

use crate::DEFAULT_FILENAMES;

pub use run::run;
pub use setup::setup;
pub use status::status;

fn config_path(file: Option<String>) -> PathBuf {
    file.map_or_else(
        || {
            DEFAULT_FILENAMES
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILENAMES[0]))
        },
        PathBuf::from,
    )
}

fn open_registry(file: Option<String>) -> Result<ServiceRegistry> {
    let path = config_path(file);
    let config = load_from_path(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::debug!("Loaded configuration from {}", path.display());

    let provisioner = PythonEnvProvisioner::new(&config);
    let registry = ServiceRegistry::bootstrap(&config, UnixProcessManager::new(), provisioner)?;
    Ok(registry)
}

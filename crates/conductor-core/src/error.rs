use std::{io, path::PathBuf};

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required manifest {} does not exist", .0.display())]
    MissingManifest(PathBuf),

    #[error("cannot clone archetype environment {} into {}: {source}", .from.display(), .to.display())]
    EnvironmentClone {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot install dependencies from {}: {reason}", .manifest.display())]
    DependencyInstall { manifest: PathBuf, reason: String },

    #[error("cannot move environment {} to {}: {source}", .from.display(), .to.display())]
    Relocation {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot spawn process for service `{service}`: {source}")]
    ProcessSpawn {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("service `{service}` exited before it became ready (exit code {code:?})")]
    EarlyExit { service: String, code: Option<i32> },

    #[error("setup of `{service}` requires `{dependency}` to be installed first")]
    DependencyNotInstalled { service: String, dependency: String },

    #[error("device detection failed: {0}")]
    DeviceDetection(String),

    #[error("service `{0}` not found")]
    ServiceNotFound(String),

    #[error("service `{0}` is not installed")]
    NotInstalled(String),

    #[error("service `{0}` is already being set up")]
    SetupInProgress(String),

    #[error("service `{0}` has a live process, stop it before setting it up again")]
    ServiceBusy(String),

    #[error("start of service `{0}` already requested")]
    StartAlreadyRequested(String),

    #[error("no free port in range {start}..={end}")]
    PortPoolExhausted { start: u16, end: u16 },

    #[error("io error: {0}")]
    IOError(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

mod device;
#[cfg(test)]
mod mock;
mod python;

use conductor_types::{ServiceDescriptor, SetupProgress};
use tokio::sync::mpsc;

use crate::error::Result;

pub use device::{DeviceArch, DeviceInfo, LevelZeroDevice};
#[cfg(test)]
pub(crate) use mock::MockProvisioner;
pub use python::PythonEnvProvisioner;

/// Producer side of a setup progress stream.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    service: String,
    tx: mpsc::UnboundedSender<SetupProgress>,
}

impl ProgressSink {
    #[must_use]
    pub fn new(service: &str, tx: mpsc::UnboundedSender<SetupProgress>) -> Self {
        Self {
            service: service.to_owned(),
            tx,
        }
    }

    /// Report that `step` is executing.
    pub fn executing(&self, step: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(service = %self.service, step, "{message}");
        // A consumer that stopped listening does not abort the run.
        let _ = self
            .tx
            .send(SetupProgress::executing(&self.service, step, message));
    }
}

/// Builds and inspects the isolated runtime environment of a service.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// Run every setup step, reporting progress. Stops at the first failing step.
    async fn provision(&self, service: &ServiceDescriptor, progress: &ProgressSink) -> Result<()>;

    /// Whether the final environment of `service` is in place.
    fn is_installed(&self, service: &ServiceDescriptor) -> bool;

    /// Variables added to the parent environment when launching `service`.
    async fn launch_env(&self, service: &ServiceDescriptor) -> Vec<(String, String)>;
}

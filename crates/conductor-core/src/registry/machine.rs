use conductor_types::{DesiredStatus, ServiceDescriptor, ServiceInfo, ServiceStatus};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    process_manager::ProcId,
    readiness::Readiness,
};

/// The single process a service may own.
#[derive(Debug, Clone)]
pub(crate) struct LiveProcess {
    pub id: ProcId,
    pub pid: Option<u32>,
    pub generation: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartDecision {
    AlreadyRunning,
    Proceed(u64),
}

/// Status, intent and process ownership of one service.
///
/// Every start bumps `generation`, and so does every stop. Completions from
/// background tasks carry the generation they were started under and are
/// ignored once it is outdated.
#[derive(Debug)]
pub(crate) struct ServiceMachine {
    descriptor: ServiceDescriptor,
    status: ServiceStatus,
    desired: Option<DesiredStatus>,
    process: Option<LiveProcess>,
    generation: u64,
}

impl ServiceMachine {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            status: ServiceStatus::Uninitialized,
            desired: None,
            process: None,
            generation: 0,
        }
    }

    pub fn mark_installed(&mut self, installed: bool) {
        self.status = if installed {
            ServiceStatus::NotYetStarted
        } else {
            ServiceStatus::NotInstalled
        };
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    /// Owns a process or has a start still in flight.
    pub fn is_active(&self) -> bool {
        self.process.is_some() || self.status == ServiceStatus::Starting
    }

    pub fn begin_setup(&mut self) -> Result<()> {
        if self.status == ServiceStatus::Installing {
            return Err(Error::SetupInProgress(self.descriptor.name.clone()));
        }
        if self.process.is_some() {
            return Err(Error::ServiceBusy(self.descriptor.name.clone()));
        }
        self.status = ServiceStatus::Installing;
        Ok(())
    }

    pub fn finish_setup(&mut self, succeeded: bool) {
        self.status = if succeeded {
            ServiceStatus::NotYetStarted
        } else {
            ServiceStatus::InstallationFailed
        };
        self.desired = None;
    }

    pub fn begin_start(&mut self) -> Result<StartDecision> {
        match self.status {
            ServiceStatus::Running => Ok(StartDecision::AlreadyRunning),
            ServiceStatus::Starting => {
                Err(Error::StartAlreadyRequested(self.descriptor.name.clone()))
            }
            status if !status.is_installed() => {
                Err(Error::NotInstalled(self.descriptor.name.clone()))
            }
            _ => {
                self.desired = Some(DesiredStatus::Running);
                self.status = ServiceStatus::Starting;
                self.generation += 1;
                Ok(StartDecision::Proceed(self.generation))
            }
        }
    }

    /// The start of `generation` is still waiting for its process.
    pub fn awaits_launch(&self, generation: u64) -> bool {
        generation == self.generation
            && self.status == ServiceStatus::Starting
            && self.process.is_none()
    }

    pub fn attach(&mut self, process: LiveProcess) {
        self.process = Some(process);
    }

    pub fn spawn_failed(&mut self) {
        self.status = ServiceStatus::Failed;
    }

    /// Apply a readiness outcome. Returns the process to kill, if any.
    pub fn finish_start(
        &mut self,
        generation: u64,
        readiness: Readiness,
    ) -> (ServiceStatus, Option<LiveProcess>) {
        if generation != self.generation || self.status != ServiceStatus::Starting {
            return (self.status, None);
        }

        if readiness.is_ready() {
            self.status = ServiceStatus::Running;
            (self.status, None)
        } else {
            self.status = ServiceStatus::Failed;
            (self.status, self.process.take())
        }
    }

    /// Returns the process to terminate, if one is live.
    pub fn stop(&mut self) -> (ServiceStatus, Option<LiveProcess>) {
        self.desired = Some(DesiredStatus::Stopped);
        self.generation += 1;
        let process = self.process.take();
        if self.status.is_installed() {
            self.status = ServiceStatus::Stopped;
        }
        (self.status, process)
    }

    /// A process exited on its own. Returns it if it was the live one.
    pub fn process_exited(&mut self, generation: u64) -> Option<LiveProcess> {
        let is_live = self
            .process
            .as_ref()
            .is_some_and(|process| process.generation == generation);
        if !is_live {
            return None;
        }

        if matches!(self.status, ServiceStatus::Starting | ServiceStatus::Running) {
            self.status = ServiceStatus::Failed;
        }
        self.process.take()
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.descriptor.name.clone(),
            status: self.status,
            desired_status: self.desired,
            port: self.descriptor.port,
            base_url: self.descriptor.base_url(),
            health_url: self.descriptor.health_url(),
            required: self.descriptor.required,
            depends_on: self.descriptor.depends_on.clone(),
            installed: self.status.is_installed(),
        }
    }
}

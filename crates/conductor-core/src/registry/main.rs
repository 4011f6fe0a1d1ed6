use std::{collections::BTreeMap, sync::Arc};

use conductor_types::{AppConfig, ServiceDescriptor, ServiceInfo, ServiceStatus, SetupProgress};
use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    error::{Error, Result},
    ports::PortAllocator,
    process_manager::ProcessManager,
    provisioner::Provisioner,
    registry::{
        background::RegistryBackground,
        commands::{RegistryCommand, RegistryEvent},
        machine::ServiceMachine,
    },
};

const COMMANDS_CAPACITY: usize = 100;
const EVENTS_CAPACITY: usize = 1024;

/// Progress of one setup run. Ends after its terminal event.
pub type SetupProgressStream = UnboundedReceiverStream<SetupProgress>;

/// Outcome of starting one service during the boot pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootResult {
    pub service_name: String,
    pub status: ServiceStatus,
    pub error: Option<String>,
}

/// The only entry point the surrounding application talks to.
#[derive(Debug)]
pub struct ServiceRegistry {
    _task: tokio::task::JoinHandle<()>,
    commands_tx: mpsc::Sender<RegistryCommand>,
    events_tx: broadcast::Sender<RegistryEvent>,
    services: Vec<String>,
}

impl ServiceRegistry {
    /// Reserve ports, build every descriptor and start the registry task.
    ///
    /// # Errors
    /// Returns an error if the port pool cannot serve every service.
    pub fn bootstrap<P, V>(config: &AppConfig, process_manager: P, provisioner: V) -> Result<Self>
    where
        P: ProcessManager + 'static,
        V: Provisioner,
    {
        let mut ports = PortAllocator::new(&config.host, config.ports);
        let mut machines = BTreeMap::new();

        for (name, service) in &config.services {
            let port = ports.allocate()?;
            let descriptor = ServiceDescriptor::from_config(name, service, config, port);
            let mut machine = ServiceMachine::new(descriptor);
            machine.mark_installed(provisioner.is_installed(machine.descriptor()));

            tracing::info!(
                service = %name,
                "Registered on port {port} with status {}",
                machine.status()
            );
            machines.insert(name.clone(), machine);
        }

        let services = machines.keys().cloned().collect();
        let (commands_tx, commands_rx) = mpsc::channel(COMMANDS_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENTS_CAPACITY);

        let mut inner = RegistryBackground::new(
            process_manager,
            Arc::new(provisioner),
            config.readiness.clone(),
            machines,
            commands_tx.downgrade(),
            commands_rx,
            events_tx.clone(),
        );
        let task = tokio::spawn(async move {
            inner.run().await;
        });

        Ok(Self {
            _task: task,
            commands_tx,
            events_tx,
            services,
        })
    }

    /// Status changes and process output of every service.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events_tx.subscribe()
    }

    /// Names of every known service, in order.
    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }

    #[must_use]
    pub fn get_service(&self, name: &str) -> Option<ServiceHandle<'_>> {
        self.services.iter().any(|s| s == name).then(|| ServiceHandle {
            registry: self,
            name: name.to_owned(),
        })
    }

    /// Snapshot of every service.
    ///
    /// # Errors
    /// Returns an error if the registry task is gone.
    pub async fn get_service_information(&self) -> Result<Vec<ServiceInfo>> {
        self.request(|reply| RegistryCommand::Info { reply }).await
    }

    /// Install the environment of `name`.
    ///
    /// Failures of the run itself are reported as the terminal event of the stream.
    ///
    /// # Errors
    /// Returns an error if the service is unknown or the registry task is gone.
    pub async fn setup(&self, name: &str) -> Result<SetupProgressStream> {
        self.known(name)?;

        let (progress, rx) = mpsc::unbounded_channel();
        self.commands_tx
            .send(RegistryCommand::Setup {
                service: name.to_owned(),
                progress,
            })
            .await
            .map_err(|err| Error::Internal(err.to_string()))?;

        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Start `name` and wait for the readiness outcome.
    ///
    /// # Errors
    /// Returns an error if the service is not installed, is already starting or cannot be spawned.
    pub async fn start(&self, name: &str) -> Result<ServiceStatus> {
        self.known(name)?;
        self.request(|reply| RegistryCommand::Start {
            service: name.to_owned(),
            reply,
        })
        .await?
    }

    /// Stop `name`, terminating its process if one is live.
    ///
    /// # Errors
    /// Returns an error if the service is unknown or the registry task is gone.
    pub async fn stop(&self, name: &str) -> Result<ServiceStatus> {
        self.known(name)?;
        self.request(|reply| RegistryCommand::Stop {
            service: name.to_owned(),
            reply,
        })
        .await?
    }

    /// # Errors
    /// Returns an error if the service is unknown or the registry task is gone.
    pub async fn status(&self, name: &str) -> Result<ServiceStatus> {
        self.known(name)?;
        self.request(|reply| RegistryCommand::Status {
            service: name.to_owned(),
            reply,
        })
        .await?
    }

    /// Stop every service with a live process.
    ///
    /// # Errors
    /// Returns an error if the registry task is gone.
    pub async fn stop_all(&self) -> Result<()> {
        self.request(|reply| RegistryCommand::StopAll { reply }).await
    }

    /// Start every installed service; one failure never aborts the others.
    ///
    /// # Errors
    /// Returns an error only if the registry task is gone.
    pub async fn boot_up_all_set_up_services(&self) -> Result<Vec<BootResult>> {
        let installed: Vec<String> = self
            .get_service_information()
            .await?
            .into_iter()
            .filter(|info| info.installed)
            .map(|info| info.name)
            .collect();
        tracing::info!("Booting up {} installed service(s)", installed.len());

        Ok(self.start_all(&installed).await)
    }

    /// Start the named services concurrently, reporting one result per name in order.
    pub async fn start_all(&self, services: &[String]) -> Vec<BootResult> {
        let starts = services.iter().map(|name| async move {
            match self.start(name).await {
                Ok(status) => BootResult {
                    service_name: name.clone(),
                    status,
                    error: None,
                },
                Err(err) => {
                    tracing::error!(service = %name, "Boot failed: {err}");
                    BootResult {
                        service_name: name.clone(),
                        status: self.status(name).await.unwrap_or(ServiceStatus::Failed),
                        error: Some(err.to_string()),
                    }
                }
            }
        });

        join_all(starts).await
    }

    fn known(&self, name: &str) -> Result<()> {
        if self.services.iter().any(|s| s == name) {
            Ok(())
        } else {
            Err(Error::ServiceNotFound(name.to_owned()))
        }
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> RegistryCommand,
    ) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.commands_tx
            .send(command(reply))
            .await
            .map_err(|err| Error::Internal(err.to_string()))?;
        rx.await.map_err(|err| Error::Internal(err.to_string()))
    }
}

/// One service of a [`ServiceRegistry`].
#[derive(Debug, Clone)]
pub struct ServiceHandle<'a> {
    registry: &'a ServiceRegistry,
    name: String,
}

impl ServiceHandle<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    /// See [`ServiceRegistry::setup`].
    pub async fn setup(&self) -> Result<SetupProgressStream> {
        self.registry.setup(&self.name).await
    }

    /// # Errors
    /// See [`ServiceRegistry::start`].
    pub async fn start(&self) -> Result<ServiceStatus> {
        self.registry.start(&self.name).await
    }

    /// # Errors
    /// See [`ServiceRegistry::stop`].
    pub async fn stop(&self) -> Result<ServiceStatus> {
        self.registry.stop(&self.name).await
    }

    /// # Errors
    /// See [`ServiceRegistry::status`].
    pub async fn status(&self) -> Result<ServiceStatus> {
        self.registry.status(&self.name).await
    }
}

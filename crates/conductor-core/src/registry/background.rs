use std::{collections::BTreeMap, sync::Arc, time::Duration};

use conductor_types::{ReadinessPolicy, ServiceStatus, SetupProgress};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    output::follow_output,
    process_manager::{CommandSpec, ProcessManager},
    provisioner::{ProgressSink, Provisioner},
    readiness::{await_ready, Readiness},
    registry::{
        commands::{RegistryCommand, RegistryEvent, StatusReply},
        machine::{LiveProcess, ServiceMachine, StartDecision},
    },
};

const INTERCEPTED_STEP: &str = "intercepted";
const REJECTED_STEP: &str = "rejected";

/// Owns every service machine and the process manager.
///
/// Handlers never await between a status check and the matching write, so
/// guards hold without locks.
#[derive(Debug)]
pub struct RegistryBackground<P: ProcessManager, V: Provisioner> {
    process_manager: P,
    provisioner: Arc<V>,
    readiness: ReadinessPolicy,
    services: BTreeMap<String, ServiceMachine>,

    commands_tx: mpsc::WeakSender<RegistryCommand>,
    commands_rx: mpsc::Receiver<RegistryCommand>,

    events_tx: broadcast::Sender<RegistryEvent>,
}

impl<P: ProcessManager, V: Provisioner> RegistryBackground<P, V> {
    pub(crate) fn new(
        process_manager: P,
        provisioner: Arc<V>,
        readiness: ReadinessPolicy,
        services: BTreeMap<String, ServiceMachine>,
        commands_tx: mpsc::WeakSender<RegistryCommand>,
        commands_rx: mpsc::Receiver<RegistryCommand>,
        events_tx: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        tracing::info!("RegistryBackground initialized with {} services", services.len());

        Self {
            process_manager,
            provisioner,
            readiness,
            services,
            commands_tx,
            commands_rx,
            events_tx,
        }
    }

    pub async fn run(&mut self) {
        tracing::info!("RegistryBackground started");

        while let Some(command) = self.commands_rx.recv().await {
            tracing::debug!("Received command: {command:?}");

            if let Err(err) = self.handle_command(command).await {
                tracing::error!("Error handling command: {err}");
            }
        }

        self.stop_all().await;
        tracing::info!("RegistryBackground stopped");
    }

    async fn handle_command(&mut self, command: RegistryCommand) -> Result<()> {
        match command {
            RegistryCommand::Setup { service, progress } => self.setup(service, progress),
            RegistryCommand::SetupFinished {
                service,
                result,
                progress,
            } => self.setup_finished(&service, result, &progress),
            RegistryCommand::Start { service, reply } => {
                self.start(service, reply);
                Ok(())
            }
            RegistryCommand::Launch {
                service,
                generation,
                env,
                reply,
            } => {
                self.launch(service, generation, env, reply).await;
                Ok(())
            }
            RegistryCommand::StartFinished {
                service,
                generation,
                readiness,
                reply,
            } => {
                let result = self.start_finished(&service, generation, readiness).await;
                let _ = reply.send(result);
                Ok(())
            }
            RegistryCommand::Stop { service, reply } => {
                let result = self.stop(&service).await;
                let _ = reply.send(result);
                Ok(())
            }
            RegistryCommand::StopAll { reply } => {
                self.stop_all().await;
                let _ = reply.send(());
                Ok(())
            }
            RegistryCommand::ProcessExited {
                service,
                generation,
                exit,
            } => {
                let Some(process) = self.update(&service, |m| m.process_exited(generation))? else {
                    tracing::debug!("Ignoring exit of a released process of {service}");
                    return Ok(());
                };
                tracing::error!(
                    service = %service,
                    "Encountered unexpected exit (pid {:?}, code {:?})",
                    process.pid,
                    exit.code
                );
                self.forget(&process).await;
                Ok(())
            }
            RegistryCommand::Status { service, reply } => {
                let _ = reply.send(self.machine(&service).map(ServiceMachine::status));
                Ok(())
            }
            RegistryCommand::Info { reply } => {
                let _ = reply.send(self.services.values().map(ServiceMachine::info).collect());
                Ok(())
            }
        }
    }

    fn machine(&self, service: &str) -> Result<&ServiceMachine> {
        self.services
            .get(service)
            .ok_or_else(|| Error::ServiceNotFound(service.to_owned()))
    }

    /// Run `f` on a machine and broadcast the status if it changed.
    fn update<R>(&mut self, service: &str, f: impl FnOnce(&mut ServiceMachine) -> R) -> Result<R> {
        let machine = self
            .services
            .get_mut(service)
            .ok_or_else(|| Error::ServiceNotFound(service.to_owned()))?;

        let before = machine.status();
        let result = f(machine);
        let after = machine.status();

        if before != after {
            tracing::info!(service, "Status changed: {before} -> {after}");
            let _ = self.events_tx.send(RegistryEvent::StatusChanged {
                service: service.to_owned(),
                status: after,
            });
        }
        Ok(result)
    }

    fn setup(
        &mut self,
        service: String,
        progress: mpsc::UnboundedSender<SetupProgress>,
    ) -> Result<()> {
        let machine = self.machine(&service)?;

        if let Some(dependency) = &machine.descriptor().depends_on {
            let dependency_installed = self
                .machine(dependency)
                .is_ok_and(|dep| dep.status().is_installed());
            if !dependency_installed {
                let err = Error::DependencyNotInstalled {
                    service: service.clone(),
                    dependency: dependency.clone(),
                };
                tracing::warn!("Setup intercepted: {err}");
                let _ = progress.send(SetupProgress::failed(
                    &service,
                    INTERCEPTED_STEP,
                    err.to_string(),
                ));
                return Ok(());
            }
        }

        if let Err(err) = self.update(&service, ServiceMachine::begin_setup)? {
            tracing::warn!("Setup rejected: {err}");
            let _ = progress.send(SetupProgress::failed(&service, REJECTED_STEP, err.to_string()));
            return Ok(());
        }

        let Some(commands_tx) = self.commands_tx.upgrade() else {
            return Err(Error::Internal("registry is shutting down".into()));
        };
        let descriptor = self.machine(&service)?.descriptor().clone();
        let provisioner = self.provisioner.clone();

        tracing::info!(service = %service, "Setting up service");
        tokio::spawn(async move {
            let sink = ProgressSink::new(&service, progress.clone());
            let result = provisioner.provision(&descriptor, &sink).await;
            drop(sink);

            if let Err(err) = commands_tx
                .send(RegistryCommand::SetupFinished {
                    service,
                    result,
                    progress,
                })
                .await
            {
                tracing::error!("Failed to report setup result: {err}");
            }
        });

        Ok(())
    }

    /// Status is written before the terminal event, then the sender is dropped.
    fn setup_finished(
        &mut self,
        service: &str,
        result: Result<()>,
        progress: &mpsc::UnboundedSender<SetupProgress>,
    ) -> Result<()> {
        self.update(service, |m| m.finish_setup(result.is_ok()))?;

        let terminal = match result {
            Ok(()) => SetupProgress::success(service, "service set up completely"),
            Err(err) => {
                tracing::warn!(service, "Set up of service failed due to {err}");
                tracing::warn!(service, "Aborting set up of {service} service environment");
                SetupProgress::failed(
                    service,
                    "end",
                    format!("Failed to setup python environment due to {err}"),
                )
            }
        };
        let _ = progress.send(terminal);
        Ok(())
    }

    /// Launch environment detection runs off the actor, the spawn happens in [`Self::launch`].
    fn start(&mut self, service: String, reply: StatusReply) {
        let generation = match self.update(&service, ServiceMachine::begin_start) {
            Ok(Ok(StartDecision::Proceed(generation))) => generation,
            Ok(Ok(StartDecision::AlreadyRunning)) => {
                tracing::info!(service = %service, "Service is already running");
                let _ = reply.send(Ok(ServiceStatus::Running));
                return;
            }
            Ok(Err(err)) | Err(err) => {
                tracing::warn!("Start rejected: {err}");
                let _ = reply.send(Err(err));
                return;
            }
        };

        let Some(commands_tx) = self.commands_tx.upgrade() else {
            let _ = reply.send(Err(Error::Internal("registry is shutting down".into())));
            return;
        };

        let descriptor = match self.machine(&service) {
            Ok(machine) => machine.descriptor().clone(),
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        let provisioner = self.provisioner.clone();

        tokio::spawn(async move {
            let env = provisioner.launch_env(&descriptor).await;
            if let Err(err) = commands_tx
                .send(RegistryCommand::Launch {
                    service,
                    generation,
                    env,
                    reply,
                })
                .await
            {
                tracing::error!("Failed to report launch environment: {err}");
            }
        });
    }

    async fn launch(
        &mut self,
        service: String,
        generation: u64,
        mut env: Vec<(String, String)>,
        reply: StatusReply,
    ) {
        let descriptor = match self.machine(&service) {
            Ok(machine) if machine.awaits_launch(generation) => machine.descriptor().clone(),
            Ok(machine) => {
                tracing::debug!(service = %service, "Dropping launch of an abandoned start");
                let _ = reply.send(Ok(machine.status()));
                return;
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        let Some(commands_tx) = self.commands_tx.upgrade() else {
            let _ = reply.send(Err(Error::Internal("registry is shutting down".into())));
            return;
        };

        env.extend(descriptor.env.clone());

        let spawned = match self
            .process_manager
            .spawn(CommandSpec {
                name: service.clone(),
                cmd: descriptor.command_line(),
                cwd: Some(descriptor.work_dir.clone()),
                env,
            })
            .await
        {
            Ok(spawned) => spawned,
            Err(err) => {
                tracing::error!(service = %service, "Failed to spawn: {err}");
                let _ = self.update(&service, ServiceMachine::spawn_failed);
                let _ = reply.send(Err(err));
                return;
            }
        };
        tracing::info!(
            service = %service,
            "Spawned with pid {:?} on port {}",
            spawned.pid,
            descriptor.port
        );

        let cancel = CancellationToken::new();
        let _ = self.update(&service, |m| {
            m.attach(LiveProcess {
                id: spawned.id,
                pid: spawned.pid,
                generation,
                cancel: cancel.clone(),
            });
        });

        tokio::spawn(follow_output(
            spawned.stdout,
            service.clone(),
            self.events_tx.clone(),
        ));
        tokio::spawn(follow_output(
            spawned.stderr,
            service.clone(),
            self.events_tx.clone(),
        ));

        {
            let mut exited = spawned.exited.clone();
            let commands_tx = self.commands_tx.clone();
            let service = service.clone();
            tokio::spawn(async move {
                let exit = exited.exited().await;
                let Some(commands_tx) = commands_tx.upgrade() else {
                    return;
                };
                let _ = commands_tx
                    .send(RegistryCommand::ProcessExited {
                        service,
                        generation,
                        exit,
                    })
                    .await;
            });
        }

        {
            let policy = self.readiness.clone();
            let health_url = descriptor.health_url();
            tokio::spawn(async move {
                let readiness = await_ready(spawned.exited, policy, health_url, cancel).await;
                if let Err(err) = commands_tx
                    .send(RegistryCommand::StartFinished {
                        service,
                        generation,
                        readiness,
                        reply,
                    })
                    .await
                {
                    tracing::error!("Failed to report readiness: {err}");
                }
            });
        }
    }

    async fn start_finished(
        &mut self,
        service: &str,
        generation: u64,
        readiness: Readiness,
    ) -> Result<ServiceStatus> {
        let (status, to_kill) = self.update(service, |m| m.finish_start(generation, readiness))?;

        match readiness {
            Readiness::ExitedEarly(exit) => {
                let err = Error::EarlyExit {
                    service: service.to_owned(),
                    code: exit.code,
                };
                tracing::error!("{err}");
            }
            Readiness::NotHealthy => {
                tracing::error!(service, "Service did not become healthy");
            }
            Readiness::Ready | Readiness::Cancelled => {}
        }

        if let Some(process) = to_kill {
            self.terminate(service, &process).await;
        }
        Ok(status)
    }

    async fn stop(&mut self, service: &str) -> Result<ServiceStatus> {
        let (status, process) = self.update(service, ServiceMachine::stop)?;

        if let Some(process) = process {
            tracing::info!(service, "Stopping service");
            self.terminate(service, &process).await;
        }
        Ok(status)
    }

    async fn stop_all(&mut self) {
        let live: Vec<String> = self
            .services
            .iter()
            .filter(|(_, machine)| machine.is_active())
            .map(|(name, _)| name.clone())
            .collect();

        for service in live {
            if let Err(err) = self.stop(&service).await {
                tracing::error!(service = %service, "Failed to stop: {err}");
            }
        }
    }

    async fn terminate(&mut self, service: &str, process: &LiveProcess) {
        process.cancel.cancel();
        if let Err(err) = self.process_manager.kill(process.id).await {
            tracing::error!(service, "Failed to kill process: {err}");
        }
    }

    /// Drop the process manager's record of an already exited process.
    async fn forget(&mut self, process: &LiveProcess) {
        process.cancel.cancel();
        let _ = self.process_manager.wait(process.id, Duration::ZERO).await;
    }
}

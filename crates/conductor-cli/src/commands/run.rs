use std::sync::Arc;

use anyhow::{anyhow, Result};
use conductor_core::RegistryEvent;
use conductor_types::ServiceStatus;
use tokio::{
    signal,
    sync::{broadcast::error::RecvError, oneshot},
};

use crate::logger::Logger;

pub async fn run(file: Option<String>, services: Vec<String>) -> Result<()> {
    let registry = Arc::new(super::open_registry(file)?);

    for name in &services {
        if registry.get_service(name).is_none() {
            return Err(anyhow!("Service {name} not found"));
        }
    }

    let mut events = registry.subscribe();
    let mut logger = Logger::default();

    let boot = async {
        if services.is_empty() {
            registry.boot_up_all_set_up_services().await
        } else {
            Ok(registry.start_all(&services).await)
        }
    };
    tokio::pin!(boot);
    let mut booted = false;

    let (stopped_tx, mut stopped_rx) = oneshot::channel();
    let mut stopped_tx = Some(stopped_tx);
    let mut shutting_down = false;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                if shutting_down {
                    tracing::warn!("Second Ctrl+C: exiting immediately");
                    return Ok(());
                }

                shutting_down = true;
                tracing::info!("Ctrl+C: stopping services...");

                if let Some(stopped_tx) = stopped_tx.take() {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        if let Err(err) = registry.stop_all().await {
                            tracing::error!("Failed to stop services: {err}");
                        }
                        let _ = stopped_tx.send(());
                    });
                }
            }

            _ = &mut stopped_rx, if shutting_down => {
                logger.system("All services stopped");
                return Ok(());
            }

            results = &mut boot, if !booted => {
                booted = true;
                let results = results?;
                for result in &results {
                    match &result.error {
                        Some(err) => logger.system(&format!(
                            "{}: {} ({err})",
                            result.service_name, result.status
                        )),
                        None => {
                            logger.system(&format!("{}: {}", result.service_name, result.status));
                        }
                    }
                }

                if !results.iter().any(|r| r.status == ServiceStatus::Running) {
                    logger.system("No service is running");
                    return Ok(());
                }
            }

            event = events.recv() => {
                match event {
                    Ok(RegistryEvent::Log { service, level, message }) => {
                        logger.log(&service, level, &message);
                    }
                    Ok(RegistryEvent::StatusChanged { service, status }) => {
                        tracing::debug!("{service} is now {status}");
                        if booted && status == ServiceStatus::Failed {
                            logger.system(&format!("Service failed: {service}"));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Event stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}

use anyhow::{anyhow, Result};
use conductor_types::SetupStatus;
use futures::StreamExt;

use crate::logger::Logger;

pub async fn setup(file: Option<String>, service: String) -> Result<()> {
    let registry = super::open_registry(file)?;
    let Some(handle) = registry.get_service(&service) else {
        return Err(anyhow!("Service {service} not found"));
    };

    let mut logger = Logger::default();
    let mut progress = handle.setup().await?;
    let mut terminal = None;

    while let Some(event) = progress.next().await {
        logger.progress(&event);
        if event.is_terminal() {
            terminal = Some(event);
        }
    }

    match terminal {
        Some(event) if event.status == SetupStatus::Success => Ok(()),
        Some(event) => Err(anyhow!("Setup of {service} failed: {}", event.debug_message)),
        None => Err(anyhow!("Setup of {service} ended without a result")),
    }
}

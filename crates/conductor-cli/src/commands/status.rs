use anyhow::Result;

use crate::logger::Logger;

pub async fn status(file: Option<String>) -> Result<()> {
    let registry = super::open_registry(file)?;
    let mut logger = Logger::default();

    for info in registry.get_service_information().await? {
        logger.status(&info);
    }
    Ok(())
}

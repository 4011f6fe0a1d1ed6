use std::{collections::BTreeSet, net::TcpListener};

use conductor_types::PortRange;

use crate::error::{Error, Result};

/// Hands out distinct, currently bindable ports from a fixed range.
#[derive(Debug)]
pub struct PortAllocator {
    host: String,
    range: PortRange,
    reserved: BTreeSet<u16>,
}

impl PortAllocator {
    #[must_use]
    pub fn new(host: &str, range: PortRange) -> Self {
        Self {
            host: host.to_owned(),
            range,
            reserved: BTreeSet::new(),
        }
    }

    /// Reserve the lowest port of the range that is free on the host.
    ///
    /// # Errors
    /// Returns [`Error::PortPoolExhausted`] if every port is reserved or in use.
    pub fn allocate(&mut self) -> Result<u16> {
        for port in self.range.start..=self.range.end {
            if self.reserved.contains(&port) {
                continue;
            }
            // The probe is released right away; the service binds it later.
            if TcpListener::bind((self.host.as_str(), port)).is_ok() {
                self.reserved.insert(port);
                return Ok(port);
            }
            tracing::debug!("Port {port} is busy, skipping");
        }

        Err(Error::PortPoolExhausted {
            start: self.range.start,
            end: self.range.end,
        })
    }
}

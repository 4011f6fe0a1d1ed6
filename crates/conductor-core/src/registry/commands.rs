use conductor_types::{LogLevel, ServiceInfo, ServiceStatus, SetupProgress};
use tokio::sync::{mpsc, oneshot};

use crate::{error::Result, process_manager::ProcessExit, readiness::Readiness};

pub type StatusReply = oneshot::Sender<Result<ServiceStatus>>;

#[derive(Debug)]
pub enum RegistryCommand {
    Setup {
        service: String,
        progress: mpsc::UnboundedSender<SetupProgress>,
    },
    SetupFinished {
        service: String,
        result: Result<()>,
        progress: mpsc::UnboundedSender<SetupProgress>,
    },
    Start {
        service: String,
        reply: StatusReply,
    },
    Launch {
        service: String,
        generation: u64,
        env: Vec<(String, String)>,
        reply: StatusReply,
    },
    StartFinished {
        service: String,
        generation: u64,
        readiness: Readiness,
        reply: StatusReply,
    },
    Stop {
        service: String,
        reply: StatusReply,
    },
    StopAll {
        reply: oneshot::Sender<()>,
    },
    ProcessExited {
        service: String,
        generation: u64,
        exit: ProcessExit,
    },
    Status {
        service: String,
        reply: StatusReply,
    },
    Info {
        reply: oneshot::Sender<Vec<ServiceInfo>>,
    },
}

/// Broadcast to every registry subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    StatusChanged {
        service: String,
        status: ServiceStatus,
    },
    Log {
        service: String,
        level: LogLevel,
        message: String,
    },
}

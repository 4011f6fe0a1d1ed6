use std::{fmt::Debug, path::PathBuf, pin::Pin};

use futures::Stream;
use tokio::sync::watch;

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ProcId(pub u64);

/// How a process ended. `code` is `None` when it was terminated by a signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

/// Settles once, when the process it belongs to terminates.
#[derive(Clone, Debug)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ProcessExit>>,
}

#[derive(Debug)]
pub struct ExitNotifier {
    tx: watch::Sender<Option<ProcessExit>>,
}

impl ExitWatch {
    #[must_use]
    pub fn channel() -> (ExitNotifier, Self) {
        let (tx, rx) = watch::channel(None);
        (ExitNotifier { tx }, Self { rx })
    }

    /// Exit of the process if it already happened.
    #[must_use]
    pub fn try_exited(&self) -> Option<ProcessExit> {
        *self.rx.borrow()
    }

    /// Wait until the process exits.
    pub async fn exited(&mut self) -> ProcessExit {
        loop {
            let current = *self.rx.borrow_and_update();
            if let Some(exit) = current {
                return exit;
            }
            if self.rx.changed().await.is_err() {
                // The notifier is gone without reporting, the process is no longer tracked.
                return (*self.rx.borrow()).unwrap_or(ProcessExit { code: None });
            }
        }
    }
}

impl ExitNotifier {
    pub fn notify(self, exit: ProcessExit) {
        self.tx.send_replace(Some(exit));
    }
}

pub struct Spawned {
    pub id: ProcId,
    pub pid: Option<u32>,
    pub stdout: BoxStream<String>,
    pub stderr: BoxStream<String>,
    pub exited: ExitWatch,
}

impl Debug for Spawned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawned")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("stdout", &"<stream>")
            .field("stderr", &"<stream>")
            .field("exited", &self.exited.try_exited())
            .finish()
    }
}

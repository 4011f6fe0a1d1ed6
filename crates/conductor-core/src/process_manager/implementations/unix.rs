use std::{collections::HashMap, process::Stdio, time::Duration};

use futures::StreamExt;
use libc::{killpg, setsid, ESRCH, SIGKILL};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    time::timeout,
};
use tokio_stream::wrappers::LinesStream;

use crate::{
    error::{Error, Result},
    process_manager::{
        base::ProcessManager,
        types::{CommandSpec, ExitWatch, ProcId, ProcessExit, Spawned},
    },
};

const KILL_REAP_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct ChildRec {
    pgid: libc::pid_t,
    exited: ExitWatch,
}

/// Unix-specific process manager.
///
/// Every child leads its own session, so signals reach the whole process tree.
#[derive(Debug)]
pub struct UnixProcessManager {
    processes: HashMap<ProcId, ChildRec>,
    next_id: u64,
}

impl Default for UnixProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
            next_id: 0,
        }
    }

    fn record(&self, id: ProcId) -> Result<&ChildRec> {
        self.processes.get(&id).ok_or_else(|| {
            Error::IOError(std::io::Error::other(format!("unknown process id {id:?}")))
        })
    }

    fn signal(&self, id: ProcId, signal: libc::c_int) -> Result<()> {
        let proc = self.record(id)?;

        #[allow(unsafe_code)]
        unsafe {
            let rc = killpg(proc.pgid, signal);
            if rc == -1 {
                let err = std::io::Error::last_os_error();
                // The group is already gone.
                if err.raw_os_error() == Some(ESRCH) {
                    return Ok(());
                }
                return Err(Error::IOError(err));
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl ProcessManager for UnixProcessManager {
    async fn spawn(&mut self, spec: CommandSpec) -> Result<Spawned> {
        let Some((program, args)) = spec.cmd.split_first() else {
            return Err(Error::ProcessSpawn {
                service: spec.name,
                source: std::io::Error::other("empty command"),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| Error::ProcessSpawn {
            service: spec.name.clone(),
            source,
        })?;

        let pid = child.id();
        let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            let _ = child.start_kill();
            return Err(Error::ProcessSpawn {
                service: spec.name,
                source: std::io::Error::other("pid not available"),
            });
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::IOError(std::io::Error::other("stdout not piped")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::IOError(std::io::Error::other("stderr not piped")))?;

        let out_stream = LinesStream::new(BufReader::new(stdout).lines())
            .filter_map(|res| async move { res.ok() });
        let err_stream = LinesStream::new(BufReader::new(stderr).lines())
            .filter_map(|res| async move { res.ok() });

        // Reaper: owns the child from here on, so no exit can go unobserved.
        let (notifier, exited) = ExitWatch::channel();
        let name = spec.name.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ProcessExit {
                    code: status.code(),
                },
                Err(err) => {
                    tracing::error!(service = %name, "Failed to wait for process: {err}");
                    ProcessExit { code: None }
                }
            };
            tracing::debug!(service = %name, "Process exited with {exit:?}");
            notifier.notify(exit);
        });

        let id = ProcId(self.next_id);
        self.next_id += 1;
        self.processes.insert(
            id,
            ChildRec {
                pgid,
                exited: exited.clone(),
            },
        );

        Ok(Spawned {
            id,
            pid,
            stdout: Box::pin(out_stream),
            stderr: Box::pin(err_stream),
            exited,
        })
    }

    async fn wait(&mut self, id: ProcId, d: Duration) -> Result<Option<ProcessExit>> {
        let mut exited = self.record(id)?.exited.clone();

        match timeout(d, exited.exited()).await {
            Ok(exit) => {
                self.processes.remove(&id);
                Ok(Some(exit))
            }
            Err(_) => Ok(None),
        }
    }

    async fn kill(&mut self, id: ProcId) -> Result<()> {
        self.signal(id, SIGKILL)?;

        let _ = self.wait(id, KILL_REAP_TIMEOUT).await;
        Ok(())
    }
}

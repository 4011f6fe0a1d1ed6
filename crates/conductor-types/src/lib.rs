use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Observed state of a managed service. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceStatus {
    NotYetStarted,
    Starting,
    Running,
    Stopped,
    Failed,
    NotInstalled,
    Installing,
    InstallationFailed,
    Uninitialized,
}

impl ServiceStatus {
    /// Whether the service has a finished environment it can be started from.
    #[must_use]
    pub fn is_installed(self) -> bool {
        matches!(
            self,
            Self::NotYetStarted | Self::Starting | Self::Running | Self::Stopped | Self::Failed
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotYetStarted => "not-yet-started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::NotInstalled => "not-installed",
            Self::Installing => "installing",
            Self::InstallationFailed => "installation-failed",
            Self::Uninitialized => "uninitialized",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator intent, tracked independently from [`ServiceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DesiredStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetupStatus {
    Executing,
    Success,
    Failed,
}

impl SetupStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One step report of a setup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupProgress {
    pub service_name: String,
    pub step: String,
    pub status: SetupStatus,
    pub debug_message: String,
}

impl SetupProgress {
    pub fn executing(
        service_name: impl Into<String>,
        step: impl Into<String>,
        debug_message: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            step: step.into(),
            status: SetupStatus::Executing,
            debug_message: debug_message.into(),
        }
    }

    pub fn success(service_name: impl Into<String>, debug_message: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            step: "end".to_owned(),
            status: SetupStatus::Success,
            debug_message: debug_message.into(),
        }
    }

    pub fn failed(
        service_name: impl Into<String>,
        step: impl Into<String>,
        debug_message: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            step: step.into(),
            status: SetupStatus::Failed,
            debug_message: debug_message.into(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Severity of a line printed by a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `INFO...` is info, `WARN...` is warn, anything else is an error.
    #[must_use]
    pub fn from_line(line: &str) -> Self {
        if line.starts_with("INFO") {
            Self::Info
        } else if line.starts_with("WARN") {
            Self::Warn
        } else {
            Self::Error
        }
    }
}

/// Static identity of a manageable service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Interpreter inside the final environment.
    pub executable: PathBuf,
    /// Entry script followed by its fixed arguments.
    pub args: Vec<String>,
    /// Service sources; holds the dependency manifests.
    pub work_dir: PathBuf,
    pub env_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub required: bool,
    pub depends_on: Option<String>,
    pub host: String,
    pub port: u16,
    pub health_path: String,
    pub env: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn from_config(name: &str, service: &ServiceConfig, config: &AppConfig, port: u16) -> Self {
        let env_dir = config.base_dir.join(format!("{name}-env"));

        Self {
            name: name.to_owned(),
            executable: env_dir.join(&config.python.executable),
            args: service.entry.clone(),
            work_dir: service.service_dir.clone(),
            scratch_dir: config.base_dir.join(format!("{name}-env_tmp")),
            env_dir,
            required: service.required,
            depends_on: service.depends_on.clone(),
            host: config.host.clone(),
            port,
            health_path: service.health_path.clone(),
            env: service.env.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), self.health_path)
    }

    /// Full command line: interpreter, entry arguments, then `--port <port>`.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let mut cmd = Vec::with_capacity(self.args.len() + 3);
        cmd.push(self.executable.to_string_lossy().into_owned());
        cmd.extend(self.args.iter().cloned());
        cmd.push("--port".to_owned());
        cmd.push(self.port.to_string());
        cmd
    }
}

/// Snapshot of one service for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub status: ServiceStatus,
    pub desired_status: Option<DesiredStatus>,
    pub port: u16,
    pub base_url: String,
    pub health_url: String,
    pub required: bool,
    pub depends_on: Option<String>,
    pub installed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    #[must_use]
    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a freshly spawned process is judged ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessPolicy {
    /// Assume ready once the process survived this long.
    GracePeriod(Duration),
    /// Poll the service health endpoint with bounded retries.
    HealthCheck {
        interval: Duration,
        max_attempts: u32,
        request_timeout: Duration,
    },
}

/// Locations inside a python environment, relative to its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonLayout {
    pub executable: PathBuf,
    pub device_tool: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub service_dir: PathBuf,
    pub entry: Vec<String>,
    pub required: bool,
    pub depends_on: Option<String>,
    pub health_path: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub archetype_env: PathBuf,
    pub host: String,
    pub ports: PortRange,
    pub readiness: ReadinessPolicy,
    pub python: PythonLayout,
    pub services: BTreeMap<String, ServiceConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_statuses() {
        let installed = [
            ServiceStatus::NotYetStarted,
            ServiceStatus::Starting,
            ServiceStatus::Running,
            ServiceStatus::Stopped,
            ServiceStatus::Failed,
        ];
        let not_installed = [
            ServiceStatus::NotInstalled,
            ServiceStatus::Installing,
            ServiceStatus::InstallationFailed,
            ServiceStatus::Uninitialized,
        ];

        assert!(installed.iter().all(|s| s.is_installed()));
        assert!(not_installed.iter().all(|s| !s.is_installed()));
    }

    #[test]
    fn test_log_level_from_line() {
        assert_eq!(LogLevel::from_line("INFO: Uvicorn running"), LogLevel::Info);
        assert_eq!(LogLevel::from_line("WARNING: slow"), LogLevel::Warn);
        assert_eq!(LogLevel::from_line("Traceback (most recent call last)"), LogLevel::Error);
        assert_eq!(LogLevel::from_line(" INFO indented"), LogLevel::Error);
    }

    #[test]
    fn test_descriptor_from_config() {
        let service = ServiceConfig {
            service_dir: "/opt/app/service".into(),
            entry: vec!["web_api.py".to_owned()],
            required: true,
            depends_on: None,
            health_path: "/healthy".to_owned(),
            env: BTreeMap::new(),
        };
        let config = AppConfig {
            base_dir: "/opt/app".into(),
            archetype_env: "/opt/app/env".into(),
            host: "127.0.0.1".to_owned(),
            ports: PortRange {
                start: 59000,
                end: 59999,
            },
            readiness: ReadinessPolicy::GracePeriod(Duration::from_secs(4)),
            python: PythonLayout {
                executable: "bin/python".into(),
                device_tool: "bin/ls_level_zero".into(),
            },
            services: BTreeMap::from([("ai-backend".to_owned(), service.clone())]),
        };

        let descriptor = ServiceDescriptor::from_config("ai-backend", &service, &config, 59001);

        assert_eq!(descriptor.env_dir, PathBuf::from("/opt/app/ai-backend-env"));
        assert_eq!(descriptor.scratch_dir, PathBuf::from("/opt/app/ai-backend-env_tmp"));
        assert_eq!(descriptor.health_url(), "http://127.0.0.1:59001/healthy");
        assert_eq!(
            descriptor.command_line(),
            vec![
                "/opt/app/ai-backend-env/bin/python",
                "web_api.py",
                "--port",
                "59001"
            ]
        );
    }

    #[test]
    fn test_port_range_len() {
        assert_eq!(PortRange { start: 59000, end: 59999 }.len(), 1000);
        assert_eq!(PortRange { start: 10, end: 10 }.len(), 1);
        assert!(PortRange { start: 11, end: 10 }.is_empty());
    }
}

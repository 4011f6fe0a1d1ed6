use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use conductor_types::{AppConfig, PythonLayout, ServiceDescriptor};
use tokio::{process::Command, time::timeout};
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    provisioner::{
        device::{DeviceInfo, ANY_LEVEL_ZERO_DEVICE},
        ProgressSink, Provisioner,
    },
};

const PREPARE_STEP: &str = "preparing work directory";
const DETECT_STEP: &str = "Detecting intel device";
const INSTALL_STEP: &str = "install dependencies";
const RELOCATE_STEP: &str = "move python environment to target";

/// Lines of installer stderr kept in a [`Error::DependencyInstall`].
const STDERR_TAIL_LINES: usize = 20;

const DEVICE_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Provisions services from a prebuilt archetype python environment.
///
/// Work happens in the service's scratch directory; only a fully installed
/// environment is moved to its final place.
#[derive(Debug, Clone)]
pub struct PythonEnvProvisioner {
    archetype: PathBuf,
    layout: PythonLayout,
    device_timeout: Duration,
}

impl PythonEnvProvisioner {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            archetype: config.archetype_env.clone(),
            layout: config.python.clone(),
            device_timeout: DEVICE_TOOL_TIMEOUT,
        }
    }

    /// Bound on a single run of the device tool.
    #[must_use]
    pub fn with_device_timeout(mut self, device_timeout: Duration) -> Self {
        self.device_timeout = device_timeout;
        self
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn clone_archetype(&self, target: &Path) -> Result<()> {
        let from = self.archetype.clone();
        let to = target.to_path_buf();

        let result = tokio::task::spawn_blocking({
            let from = from.clone();
            let to = to.clone();
            move || {
                if to.exists() {
                    fs::remove_dir_all(&to)?;
                }
                copy_tree(&from, &to)
            }
        })
        .await
        .map_err(|err| Error::Internal(format!("clone task failed: {err}")))?;

        result.map_err(|source| Error::EnvironmentClone { from, to, source })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn detect_device(&self, env_dir: &Path) -> Result<DeviceInfo> {
        let mut command = Command::new(env_dir.join(&self.layout.device_tool));
        command.kill_on_drop(true);
        let output = timeout(self.device_timeout, command.output())
            .await
            .map_err(|_| {
                Error::DeviceDetection(format!(
                    "device tool timed out after {:?}",
                    self.device_timeout
                ))
            })?
            .map_err(|err| Error::DeviceDetection(format!("cannot run device tool: {err}")))?;

        if !output.status.success() {
            return Err(Error::DeviceDetection(format!(
                "device tool exited with {}",
                output.status
            )));
        }

        DeviceInfo::from_enumeration(&String::from_utf8_lossy(&output.stdout))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn install_requirements(&self, env_dir: &Path, manifest: &Path) -> Result<()> {
        let python = env_dir.join(&self.layout.executable);
        tracing::debug!("Installing {} with {}", manifest.display(), python.display());

        let output = Command::new(&python)
            .args(["-m", "uv", "pip", "install", "--python"])
            .arg(&python)
            .arg("-r")
            .arg(manifest)
            .output()
            .await
            .map_err(|err| Error::DependencyInstall {
                manifest: manifest.to_path_buf(),
                reason: err.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(Error::DependencyInstall {
            manifest: manifest.to_path_buf(),
            reason: format!("installer exited with {}: {tail}", output.status),
        })
    }

    #[tracing::instrument(level = "debug")]
    async fn relocate(from: &Path, to: &Path) -> Result<()> {
        let relocation = |source: io::Error| Error::Relocation {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(to).await.map_err(relocation)? {
            tokio::fs::remove_dir_all(to).await.map_err(relocation)?;
        }
        tokio::fs::rename(from, to).await.map_err(relocation)
    }
}

#[async_trait::async_trait]
impl Provisioner for PythonEnvProvisioner {
    async fn provision(&self, service: &ServiceDescriptor, progress: &ProgressSink) -> Result<()> {
        let scratch = &service.scratch_dir;

        progress.executing("start", "starting to set up python environment");

        progress.executing(PREPARE_STEP, "Cloning archetype python env");
        self.clone_archetype(scratch).await?;
        progress.executing(PREPARE_STEP, "Cloning complete");

        progress.executing(DETECT_STEP, "Trying to identify intel hardware");
        let device = self.detect_device(scratch).await?;
        progress.executing(DETECT_STEP, format!("detected intel hardware {}", device.arch));

        progress.executing(INSTALL_STEP, "installing dependencies");
        let device_manifest = existing_file(
            service
                .work_dir
                .join(format!("requirements-{}.txt", device.arch)),
        )?;
        let common_manifest = existing_file(service.work_dir.join("requirements.txt"))?;
        self.install_requirements(scratch, &device_manifest).await?;
        self.install_requirements(scratch, &common_manifest).await?;
        progress.executing(INSTALL_STEP, "dependencies installed");

        let target = &service.env_dir;
        progress.executing(
            RELOCATE_STEP,
            format!("Moving python environment to target place at {}", target.display()),
        );
        Self::relocate(scratch, target).await?;
        progress.executing(RELOCATE_STEP, format!("Moved to {}", target.display()));

        Ok(())
    }

    fn is_installed(&self, service: &ServiceDescriptor) -> bool {
        service.executable.exists() && service.env_dir.join(&self.layout.device_tool).exists()
    }

    async fn launch_env(&self, service: &ServiceDescriptor) -> Vec<(String, String)> {
        let selector = match self.detect_device(&service.env_dir).await {
            Ok(device) => device.selector(),
            Err(err) => {
                tracing::warn!(
                    service = %service.name,
                    "Falling back to any level zero device: {err}"
                );
                ANY_LEVEL_ZERO_DEVICE.to_owned()
            }
        };

        vec![
            ("SYCL_ENABLE_DEFAULT_CONTEXTS".to_owned(), "1".to_owned()),
            ("SYCL_CACHE_PERSISTENT".to_owned(), "1".to_owned()),
            ("PYTHONIOENCODING".to_owned(), "utf-8".to_owned()),
            ("ONEAPI_DEVICE_SELECTOR".to_owned(), selector),
        ]
    }
}

fn existing_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::MissingManifest(path))
    }
}

/// Recursive copy preserving permissions and, on unix, symlinks.
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_tree() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let dest = target.path().join("copy");

        fs::create_dir_all(source.path().join("bin")).unwrap();
        fs::write(source.path().join("bin/python"), "#!/bin/sh\n").unwrap();
        fs::write(source.path().join("pyvenv.cfg"), "home = /usr\n").unwrap();

        copy_tree(source.path(), &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("bin/python")).unwrap(),
            "#!/bin/sh\n"
        );
        assert!(dest.join("pyvenv.cfg").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_keeps_symlinks_and_modes() {
        use std::os::unix::fs::PermissionsExt;

        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let dest = target.path().join("copy");

        let exe = source.path().join("python3");
        fs::write(&exe, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("python3", source.path().join("python")).unwrap();

        copy_tree(source.path(), &dest).unwrap();

        let mode = fs::metadata(dest.join("python3")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            fs::read_link(dest.join("python")).unwrap(),
            PathBuf::from("python3")
        );
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("requirements-arc.txt");
        assert!(matches!(
            existing_file(missing.clone()),
            Err(Error::MissingManifest(path)) if path == missing
        ));
    }
}

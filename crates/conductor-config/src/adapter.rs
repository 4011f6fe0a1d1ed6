use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use conductor_types::{AppConfig, PortRange, PythonLayout, ReadinessPolicy, ServiceConfig};

use crate::{
    raw::{RawConfig, RawReadiness, RawReadinessMode},
    ConfigError,
};

const DEFAULT_HEALTH_PATH: &str = "/healthy";

impl RawConfig {
    pub fn to_config(&self, origin: &Path) -> Result<AppConfig, ConfigError> {
        let root = origin.parent().unwrap_or_else(|| Path::new(""));
        let base_dir = resolve(root, &self.base_dir);

        if self.services.is_empty() {
            return Err(ConfigError::Validation("no services configured".into()));
        }

        let ports = PortRange {
            start: self.ports.start,
            end: self.ports.end,
        };
        if ports.is_empty() {
            return Err(ConfigError::Validation(format!(
                "port range {}..={} is empty",
                ports.start, ports.end
            )));
        }
        if ports.len() < self.services.len() {
            return Err(ConfigError::Validation(format!(
                "port range {}..={} cannot hold {} services",
                ports.start,
                ports.end,
                self.services.len()
            )));
        }

        let services = self
            .services
            .iter()
            .map(|(name, raw_service)| {
                if raw_service.entry.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "service `{name}`: entry is empty"
                    )));
                }
                if raw_service.entry.iter().any(|c| c.trim().is_empty()) {
                    return Err(ConfigError::Validation(format!(
                        "service `{name}`: entry contains empty element"
                    )));
                }
                if let Some(dependency) = &raw_service.depends_on {
                    if dependency == name {
                        return Err(ConfigError::Validation(format!(
                            "service `{name}`: depends on itself"
                        )));
                    }
                    if !self.services.contains_key(dependency) {
                        return Err(ConfigError::Validation(format!(
                            "service `{name}`: unknown dependency `{dependency}`"
                        )));
                    }
                }

                let health_path = raw_service
                    .health_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_owned());
                if !health_path.starts_with('/') {
                    return Err(ConfigError::Validation(format!(
                        "service `{name}`: health_path must start with `/`"
                    )));
                }

                Ok((
                    name.clone(),
                    ServiceConfig {
                        service_dir: resolve(&base_dir, &raw_service.service_dir),
                        entry: raw_service.entry.clone(),
                        required: raw_service.required,
                        depends_on: raw_service.depends_on.clone(),
                        health_path,
                        env: raw_service.env.clone().unwrap_or_default(),
                    },
                ))
            })
            .collect::<Result<BTreeMap<String, ServiceConfig>, ConfigError>>()?;

        check_dependency_cycles(&services)?;

        Ok(AppConfig {
            archetype_env: resolve(&base_dir, &self.archetype_env),
            base_dir,
            host: self.host.clone(),
            ports,
            readiness: self.readiness.to_policy()?,
            python: PythonLayout {
                executable: PathBuf::from(&self.python.executable),
                device_tool: PathBuf::from(&self.python.device_tool),
            },
            services,
        })
    }
}

impl RawReadiness {
    fn to_policy(&self) -> Result<ReadinessPolicy, ConfigError> {
        match self.mode {
            RawReadinessMode::Grace => Ok(ReadinessPolicy::GracePeriod(self.grace_period)),
            RawReadinessMode::Health => {
                if self.max_attempts == 0 {
                    return Err(ConfigError::Validation(
                        "readiness: max_attempts must be at least 1".into(),
                    ));
                }
                Ok(ReadinessPolicy::HealthCheck {
                    interval: self.interval,
                    max_attempts: self.max_attempts,
                    request_timeout: self.request_timeout,
                })
            }
        }
    }
}

fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn check_dependency_cycles(services: &BTreeMap<String, ServiceConfig>) -> Result<(), ConfigError> {
    for name in services.keys() {
        let mut seen = HashSet::new();
        let mut current = name.as_str();
        while let Some(dependency) = services
            .get(current)
            .and_then(|service| service.depends_on.as_deref())
        {
            if !seen.insert(current) {
                return Err(ConfigError::Validation(format!(
                    "service `{name}`: circular dependency"
                )));
            }
            current = dependency;
        }
    }
    Ok(())
}

use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct RawConfig {
    pub base_dir: String,
    #[serde(default = "default_archetype_env")]
    pub archetype_env: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub ports: RawPorts,
    #[serde(default)]
    pub readiness: RawReadiness,
    #[serde(default)]
    pub python: RawPython,
    #[serde(default)]
    pub services: BTreeMap<String, RawService>,
}

fn default_archetype_env() -> String {
    "env".to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

#[derive(Deserialize)]
#[serde(default)]
pub(crate) struct RawPorts {
    pub start: u16,
    pub end: u16,
}

impl Default for RawPorts {
    fn default() -> Self {
        Self {
            start: 59000,
            end: 59999,
        }
    }
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RawReadinessMode {
    #[default]
    Health,
    Grace,
}

#[derive(Deserialize)]
#[serde(default)]
pub(crate) struct RawReadiness {
    pub mode: RawReadinessMode,
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for RawReadiness {
    fn default() -> Self {
        Self {
            mode: RawReadinessMode::Health,
            grace_period: Duration::from_secs(4),
            interval: Duration::from_millis(500),
            max_attempts: 120,
            request_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub(crate) struct RawPython {
    pub executable: String,
    pub device_tool: String,
}

impl Default for RawPython {
    fn default() -> Self {
        Self {
            executable: "bin/python".to_owned(),
            device_tool: "bin/ls_level_zero".to_owned(),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawService {
    pub service_dir: String,
    pub entry: Vec<String>,
    #[serde(default)]
    pub required: bool,
    pub depends_on: Option<String>,
    pub health_path: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
}

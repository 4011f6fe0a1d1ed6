use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

const BATTLEMAGE_IDS: [u32; 2] = [0xE20B, 0xE20C];
const LUNAR_LAKE_IDS: [u32; 2] = [0x64A0, 0x6420];

/// Fallback selector when no device could be enumerated.
pub(crate) const ANY_LEVEL_ZERO_DEVICE: &str = "level_zero:*";

/// One entry of the Level Zero device enumerator output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LevelZeroDevice {
    pub id: u32,
    pub name: String,
    pub device_id: u32,
}

/// Hardware family, picks the `requirements-{arch}.txt` manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceArch {
    Arc,
    Bmg,
    Lnl,
}

impl DeviceArch {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arc => "arc",
            Self::Bmg => "bmg",
            Self::Lnl => "lnl",
        }
    }

    fn of(device: &LevelZeroDevice) -> Option<Self> {
        if BATTLEMAGE_IDS.contains(&device.device_id) {
            Some(Self::Bmg)
        } else if LUNAR_LAKE_IDS.contains(&device.device_id) {
            Some(Self::Lnl)
        } else if device.name.to_lowercase().contains("arc") {
            Some(Self::Arc)
        } else {
            None
        }
    }
}

impl fmt::Display for DeviceArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Architecture of the first supported device.
    pub arch: DeviceArch,
    /// Level Zero ids of every supported device.
    pub ids: Vec<u32>,
}

impl DeviceInfo {
    /// Value for `ONEAPI_DEVICE_SELECTOR`.
    #[must_use]
    pub fn selector(&self) -> String {
        let ids: Vec<String> = self.ids.iter().map(ToString::to_string).collect();
        format!("level_zero:{}", ids.join(","))
    }

    /// Pick the supported devices out of the enumerator's JSON output.
    ///
    /// # Errors
    /// Returns an error if the output is not valid JSON or lists no supported device.
    pub fn from_enumeration(output: &str) -> Result<Self> {
        let devices: Vec<LevelZeroDevice> = serde_json::from_str(output.trim())
            .map_err(|err| Error::DeviceDetection(format!("unreadable device list: {err}")))?;

        let mut arch = None;
        let mut ids = Vec::new();
        for device in &devices {
            if let Some(device_arch) = DeviceArch::of(device) {
                arch.get_or_insert(device_arch);
                ids.push(device.id);
            }
        }

        match arch {
            Some(arch) => Ok(Self { arch, ids }),
            None => Err(Error::DeviceDetection(format!(
                "no supported intel device among {} device(s)",
                devices.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arc_device() {
        let output = r#"[{"id": 0, "name": "Intel(R) Arc(TM) A770 Graphics", "device_id": 22176}]"#;
        let info = DeviceInfo::from_enumeration(output).unwrap();
        assert_eq!(info.arch, DeviceArch::Arc);
        assert_eq!(info.selector(), "level_zero:0");
    }

    #[test]
    fn test_unsupported_devices_are_filtered() {
        let output = r#"[
            {"id": 0, "name": "Intel(R) UHD Graphics 770", "device_id": 18048},
            {"id": 1, "name": "Intel(R) Graphics", "device_id": 57867},
            {"id": 2, "name": "Intel(R) Arc(TM) A380 Graphics", "device_id": 22181}
        ]"#;
        let info = DeviceInfo::from_enumeration(output).unwrap();
        assert_eq!(info.arch, DeviceArch::Bmg);
        assert_eq!(info.ids, vec![1, 2]);
        assert_eq!(info.selector(), "level_zero:1,2");
    }

    #[test]
    fn test_lunar_lake() {
        let output = r#"[{"id": 0, "name": "Intel(R) Graphics", "device_id": 25760}]"#;
        assert_eq!(
            DeviceInfo::from_enumeration(output).unwrap().arch,
            DeviceArch::Lnl
        );
    }

    #[test]
    fn test_no_supported_device() {
        let output = r#"[{"id": 0, "name": "Intel(R) UHD Graphics", "device_id": 1}]"#;
        assert!(matches!(
            DeviceInfo::from_enumeration(output),
            Err(Error::DeviceDetection(_))
        ));
    }

    #[test]
    fn test_garbage_output() {
        assert!(DeviceInfo::from_enumeration("not json").is_err());
    }
}

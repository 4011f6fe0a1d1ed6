mod adapter;
mod raw;

pub use conductor_types::AppConfig;

/// Error type for configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "toml")]
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error(s): {0}")]
    Validation(String),
}

/// Load the application configuration from a file path.
///
/// Relative paths inside the file are resolved against the file's directory.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration file cannot be read or parsed.
pub fn load_from_path(path: &std::path::Path) -> Result<AppConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_auto(&text, path)
}

/// Parse a configuration from a string, picking the format from the path extension.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
pub fn parse_auto(text: &str, path: &std::path::Path) -> Result<AppConfig, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml")]
        "toml" => parse_toml(text, path),
        _ => Err(ConfigError::Validation("unknown config extension".into())),
    }
}

/// Parse a TOML configuration. `origin` is the file the text was read from.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
#[cfg(feature = "toml")]
pub fn parse_toml(config: &str, origin: &std::path::Path) -> Result<AppConfig, ConfigError> {
    let raw_config = toml::from_str::<raw::RawConfig>(config)?;
    raw_config.to_config(origin)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use conductor_types::ReadinessPolicy;

    use super::*;

    #[test]
    fn parse_toml_ok() {
        let txt = r#"
            base_dir = "/opt/playground"

            [readiness]
            mode = "grace"
            grace_period = "2s"

            [services.ai-backend]
            service_dir = "service"
            entry = ["web_api.py"]
            required = true

            [services.comfyui-backend]
            service_dir = "ComfyUI"
            entry = ["main.py", "--listen"]
            depends_on = "ai-backend"
        "#;
        let config = parse_toml(txt, &PathBuf::from("/etc/conductor.toml")).unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/opt/playground"));
        assert_eq!(config.archetype_env, PathBuf::from("/opt/playground/env"));
        assert_eq!(config.ports.start, 59000);
        assert_eq!(
            config.readiness,
            ReadinessPolicy::GracePeriod(Duration::from_secs(2))
        );
        assert!(config.services["ai-backend"].required);
        assert_eq!(
            config.services["comfyui-backend"].service_dir,
            PathBuf::from("/opt/playground/ComfyUI")
        );
        assert_eq!(
            config.services["comfyui-backend"].depends_on.as_deref(),
            Some("ai-backend")
        );
        assert_eq!(config.services["comfyui-backend"].health_path, "/healthy");
    }

    #[test]
    fn parse_auto_unknown_extension() {
        let result = parse_auto("base_dir = \"/\"", &PathBuf::from("conductor.yaml"));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn parse_toml_syntax_error() {
        let result = parse_toml("base_dir = ", &PathBuf::from("conductor.toml"));
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}

use serde::{Deserialize, Serialize};

/// User configuration from `QRLens Config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Extra encode attempts allowed after a failed round-trip verification
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pixels per QR module in the rendered image
    #[serde(default = "default_module_scale")]
    pub module_scale: u32,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_console_log")]
    pub console_log: bool,

    #[serde(default = "default_log_directory")]
    pub log_directory: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            module_scale: default_module_scale(),
            debug_mode: false,
            console_log: default_console_log(),
            log_directory: default_log_directory(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_module_scale() -> u32 {
    16
}

fn default_console_log() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.module_scale, 16);
        assert!(!settings.debug_mode);
        assert!(settings.console_log);
        assert_eq!(settings.log_directory, "logs");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: UserConfig = serde_yaml_ng::from_str("settings:\n  max_retries: 5\n").unwrap();
        assert_eq!(config.settings.max_retries, 5);
        assert_eq!(config.settings.module_scale, 16);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config: UserConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config, UserConfig::default());
    }
}

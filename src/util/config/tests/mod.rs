//! 配置测试

use std::collections::HashMap;

use crate::runtime::scheduler::SnapshotPolicy;
use crate::util::config::{ConfigError, HostConfig};
use crate::util::logger::LogLevel;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[cfg(test)]
mod host_config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.runtime.memory_size, 16 * 1024);
        assert_eq!(config.runtime.default_extension, "cvm");
        assert_eq!(config.runtime.snapshot_policy, SnapshotPolicy::PerSleep);
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: HostConfig = toml::from_str(
            r#"
            [runtime]
            memory_size = 65536
            snapshot_policy = "per-iteration"
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.memory_size, 65536);
        assert_eq!(config.runtime.default_extension, "cvm");
        assert_eq!(config.runtime.snapshot_policy, SnapshotPolicy::PerIteration);
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_parse_log_level() {
        let config: HostConfig = toml::from_str("[log]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HostConfig::default();
        config.runtime.memory_size = 4096;
        config.runtime.default_extension = "bin".to_string();
        config.save(&path).unwrap();

        let loaded = HostConfig::load(&path).unwrap();
        assert_eq!(loaded.runtime.memory_size, 4096);
        assert_eq!(loaded.runtime.default_extension, "bin");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.runtime.memory_size, 16 * 1024);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime\nmemory_size = ").unwrap();
        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}

#[cfg(test)]
mod override_tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let mut config = HostConfig::default();
        config
            .apply_overrides(env(&[
                ("COOPVM_MEMORY_SIZE", "8192"),
                ("COOPVM_DEFAULT_EXTENSION", ".img"),
                ("COOPVM_SNAPSHOT_POLICY", "per-iteration"),
                ("COOPVM_LOG", "INFO"),
            ]))
            .unwrap();
        assert_eq!(config.runtime.memory_size, 8192);
        assert_eq!(config.runtime.default_extension, "img");
        assert_eq!(config.runtime.snapshot_policy, SnapshotPolicy::PerIteration);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_no_overrides() {
        let mut config = HostConfig::default();
        config.apply_overrides(env(&[])).unwrap();
        assert_eq!(config.runtime.memory_size, 16 * 1024);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = HostConfig::default();
        let err = config
            .apply_overrides(env(&[("COOPVM_MEMORY_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COOPVM_MEMORY_SIZE",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Invalid value for COOPVM_MEMORY_SIZE: lots"
        );
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = HostConfig::default();
        assert!(config.apply_overrides(env(&[("COOPVM_LOG", "loud")])).is_err());
    }
}

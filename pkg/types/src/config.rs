use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 8443
/// data-dir: /var/lib/quotient/data
/// token: my-secret-token
/// resync-secs: 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "resync-secs")]
    pub resync_secs: Option<u64>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: ControllerConfigFile =
            load_config_file("/nonexistent/quotient-config.yaml").unwrap();
        assert!(cfg.port.is_none());
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn kebab_case_aliases_parse() {
        let cfg: ControllerConfigFile =
            serde_yaml::from_str("port: 8443\ndata-dir: /tmp/q\nresync-secs: 10\n").unwrap();
        assert_eq!(cfg.port, Some(8443));
        assert_eq!(cfg.data_dir.as_deref(), Some("/tmp/q"));
        assert_eq!(cfg.resync_secs, Some(10));
    }
}

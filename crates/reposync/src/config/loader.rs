use std::path::Path;

use crate::config::schema::SyncConfig;
use crate::error::ConfigError;

/// Reads, parses and validates a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = parse(&content).map_err(|e| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;

    log::debug!(
        "Loaded {} source(s) and {} secret(s) from {}",
        config.sources.len(),
        config.secrets.len(),
        path.display()
    );
    Ok(config)
}

/// Parses and validates configuration text.
pub fn load_config_from_str(content: &str) -> Result<SyncConfig, ConfigError> {
    let config = parse(content).map_err(|e| ConfigError::ParseYaml {
        path: Path::new("<inline>").to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

fn parse(content: &str) -> Result<SyncConfig, serde_yaml::Error> {
    // An empty document is an empty configuration, not an error
    if content.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    serde_yaml::from_str(content)
}

//! Loads a [`Config`] from an optional TOML or JSON file, normalising
//! either format to the payload shape [`Config::from_payload`] expects so
//! environment-variable overrides (§6.4) apply uniformly regardless of
//! which file format was used.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use fractal_memory_core::Config;
use serde_json::Value;

const DEFAULT_PATHS: &[&str] = &["fractal-memory.toml", "fractal-memory.json", ".fractal-memory.toml"];

pub fn load_config(explicit_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match explicit_path {
        Some(p) => Some(p.to_path_buf()),
        None => DEFAULT_PATHS.iter().map(Path::new).find(|p| p.exists()).map(Path::to_path_buf),
    };

    let payload = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse_payload(&path, &content)?
        }
        None => HashMap::new(),
    };

    Ok(Config::from_payload(&payload))
}

fn parse_payload(path: &Path, content: &str) -> anyhow::Result<HashMap<String, Value>> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let value: Value = match extension {
        "json" => serde_json::from_str(content).context("failed to parse JSON configuration")?,
        _ => {
            let toml_value: toml::Value = toml::from_str(content).context("failed to parse TOML configuration")?;
            serde_json::to_value(toml_value).context("failed to normalise TOML configuration")?
        }
    };
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Ok(HashMap::new()),
    }
}

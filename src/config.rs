use anyhow::Context;
use std::env;
use std::path::PathBuf;

use crate::history::ModelInfo;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// 设置后，每次导出都会在这里留一份副本
    pub export_dir: Option<PathBuf>,
    pub model: ModelInfo,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 便于测试：从任意 key -> value 查找函数构建
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT").unwrap_or_else(|| "8080".to_string());
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: port
                .parse()
                .with_context(|| format!("PORT must be a number, got {port:?}"))?,
            export_dir: lookup("EXPORT_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            model: ModelInfo {
                id: lookup("MODEL_ID").unwrap_or_else(|| "ela_rf".to_string()),
                name: lookup("MODEL_NAME").unwrap_or_else(|| "ELA + RandomForest".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.export_dir, None);
        assert_eq!(config.model.id, "ela_rf");
        assert_eq!(config.model.name, "ELA + RandomForest");
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("EXPORT_DIR", "data/exports"),
            ("MODEL_NAME", "Custom"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.export_dir, Some(PathBuf::from("data/exports")));
        assert_eq!(config.model.name, "Custom");
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("PORT", "abc")])).is_err());
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::extract::DEFAULT_MAX_PAGES;

pub const DEFAULT_DB_PATH: &str = "data/scenes.sqlite";
const ENV_PREFIX: &str = "SCENE";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub max_pages: usize,
}

impl Settings {
    /// Defaults overlaid with `SCENE_DB_PATH` / `SCENE_MAX_PAGES`.
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    fn load(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("max_pages", DEFAULT_MAX_PAGES as i64)?
            .add_source(env)
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults() {
        let s = Settings::load(env(&[])).unwrap();
        assert_eq!(s.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(s.max_pages, 400);
    }

    #[test]
    fn env_overrides() {
        let s = Settings::load(env(&[
            ("SCENE_DB_PATH", "/tmp/other.sqlite"),
            ("SCENE_MAX_PAGES", "120"),
        ]))
        .unwrap();
        assert_eq!(s.db_path, PathBuf::from("/tmp/other.sqlite"));
        assert_eq!(s.max_pages, 120);
    }

    #[test]
    fn bad_page_cap() {
        assert!(Settings::load(env(&[("SCENE_MAX_PAGES", "lots")])).is_err());
    }
}

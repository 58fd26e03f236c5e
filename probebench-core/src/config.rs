//! Layered configuration loading.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace
//! config -> explicit file -> environment -> CLI overrides. The concrete schema
//! lives in the crate that owns it; this module only knows how to stack sources.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable prefix (`PROBEBENCH_RECIPE__EPOCHS=10`).
pub const ENV_PREFIX: &str = "PROBEBENCH_";

/// Name of the workspace-local configuration directory.
pub const WORKSPACE_DIR: &str = ".probebench";

/// Where to look for configuration, plus dotted-key overrides applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub workspace: Option<PathBuf>,
    pub file: Option<PathBuf>,
    pub overrides: Vec<(String, serde_json::Value)>,
}

impl ConfigSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Add an override keyed by a dotted path, e.g. `evaluation.subset_size`.
    pub fn set(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => self.overrides.push((key.to_string(), v)),
            Err(e) => tracing::warn!(key, error = %e, "Ignoring unserializable override"),
        }
        self
    }
}

/// User-level configuration file (`~/.config/probebench/config.toml` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "probebench", "probebench")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Workspace-level configuration file (`<workspace>/.probebench/config.toml`).
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Overrides in `sources.overrides`
/// 2. Environment variables (prefixed with `PROBEBENCH_`, nested with `__`)
/// 3. Explicit config file (`sources.file`)
/// 4. Workspace-local config (`.probebench/config.toml`)
/// 5. User config
/// 6. Built-in defaults
///
/// An explicit file that does not exist is an error; implicit files are skipped.
pub fn load_config<T>(sources: &ConfigSources) -> Result<T, Box<figment::Error>>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = &sources.workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = &sources.file {
        if !file.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "config file not found: {}",
                file.display()
            ))));
        }
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    for (key, value) in &sources.overrides {
        figment = figment.merge(Serialized::default(key, value));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(default)]
        inner: Inner,
        #[serde(default = "default_name")]
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        epochs: usize,
        limit: Option<usize>,
    }

    impl Default for Inner {
        fn default() -> Self {
            Self {
                epochs: 200,
                limit: Some(5000),
            }
        }
    }

    fn default_name() -> String {
        "cifar100".to_string()
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                inner: Inner::default(),
                name: default_name(),
            }
        }
    }

    #[test]
    fn test_load_config_defaults() {
        let config: Sample = load_config(&ConfigSources::new()).unwrap();
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(WORKSPACE_DIR);
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[inner]
epochs = 3
"#,
        )
        .unwrap();

        let config: Sample = load_config(&ConfigSources::new().workspace(dir.path())).unwrap();
        assert_eq!(config.inner.epochs, 3);
        assert_eq!(config.inner.limit, Some(5000));
        assert_eq!(config.name, "cifar100");
    }

    #[test]
    fn test_explicit_file_beats_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(WORKSPACE_DIR);
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[inner]\nepochs = 3\n").unwrap();
        let explicit = dir.path().join("run.toml");
        std::fs::write(&explicit, "[inner]\nepochs = 7\n").unwrap();

        let config: Sample = load_config(
            &ConfigSources::new()
                .workspace(dir.path())
                .file(&explicit),
        )
        .unwrap();
        assert_eq!(config.inner.epochs, 7);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result: Result<Sample, _> =
            load_config(&ConfigSources::new().file("/nonexistent/probebench.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config: Sample = load_config(
            &ConfigSources::new()
                .set("inner.epochs", 12)
                .set("name", "override"),
        )
        .unwrap();
        assert_eq!(config.inner.epochs, 12);
        assert_eq!(config.name, "override");
    }
}

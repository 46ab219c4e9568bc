use anyhow::{Context, Result};
use directories::ProjectDirs;
use facefind_vision::corpus::DEFAULT_PAGE_SIZE;
use facefind_vision::matcher::DEFAULT_THRESHOLD;
use facefind_vision::pipeline::DEFAULT_MAX_CONCURRENCY;
use facefind_vision::PipelineOptions;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest page the listing API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Most photos compared at once, whatever the config asks for.
pub const MAX_CONCURRENCY: usize = 256;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "facefind"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEFIND_CONFIG_PATH") {
    Some(path) => PathBuf::from(path),
    None => PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facefind.toml")),
});

pub static DEFAULT_OUTPUT_DIR: Lazy<PathBuf> = Lazy::new(|| {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.data_dir().join("matches"))
        .unwrap_or_else(|| PathBuf::from("matches"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: f32,
    pub page_size: u32,
    pub max_concurrency: usize,
    pub drive_endpoint: String,
    pub vision_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            drive_endpoint: "https://www.googleapis.com".to_string(),
            vision_endpoint: "https://vision.googleapis.com".to_string(),
            access_token: None,
            output_dir: None,
        }
    }
}

impl Config {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            threshold: self.threshold,
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            max_concurrency: self.max_concurrency.clamp(1, MAX_CONCURRENCY),
            ..Default::default()
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.clone())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    if !cfg.threshold.is_finite() || cfg.threshold <= 0.0 {
        anyhow::bail!("threshold must be a positive number, got {}", cfg.threshold);
    }
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("facefind-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = scratch_dir("config-missing");
        let cfg = load_config(Some(&dir.join("nope.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.threshold, 0.78);
        assert_eq!(cfg.page_size, 500);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = scratch_dir("config-partial");
        let path = dir.join("config.toml");
        std::fs::write(&path, "threshold = 0.5\nmax_concurrency = 3\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.threshold, 0.5);
        assert_eq!(cfg.max_concurrency, 3);
        assert_eq!(cfg.page_size, DEFAULT_PAGE_SIZE);
        assert!(cfg.access_token.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("config-save");
        let path = dir.join("nested").join("config.toml");
        let cfg = Config {
            access_token: Some("ya29.token".into()),
            output_dir: Some(dir.join("out")),
            ..Default::default()
        };
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = scratch_dir("config-threshold");
        let path = dir.join("config.toml");
        std::fs::write(&path, "threshold = -1.0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_pipeline_options_are_clamped() {
        let cfg = Config {
            page_size: 5000,
            max_concurrency: 0,
            ..Default::default()
        };
        let options = cfg.pipeline_options();
        assert_eq!(options.page_size, MAX_PAGE_SIZE);
        assert_eq!(options.max_concurrency, 1);
        assert_eq!(options.mime_types.len(), 3);

        let cfg = Config {
            max_concurrency: usize::MAX,
            ..Default::default()
        };
        assert_eq!(cfg.pipeline_options().max_concurrency, MAX_CONCURRENCY);
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str =
  "https://generativelanguage.googleapis.com/v1/models/gemini-2.5-pro:generateContent";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
  pub api_url: String,
  pub bind_addr: String,
  pub stylesheet_path: PathBuf,
  pub log_path: PathBuf,
  pub max_concurrent_requests: usize,
  pub max_upload_bytes: usize,
  /// Only ever sourced from `GEMINI_API_KEY`.
  #[serde(skip)]
  pub api_key: Option<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      api_url: DEFAULT_API_URL.to_string(),
      bind_addr: "127.0.0.1:7860".to_string(),
      stylesheet_path: PathBuf::from("assets/styleapp.css"),
      log_path: PathBuf::from("curriculens.log"),
      max_concurrent_requests: 5,
      max_upload_bytes: 20 * 1024 * 1024,
      api_key: None,
    }
  }
}

impl AppConfig {
  /// Overlays `GEMINI_API_KEY`, `GEMINI_API_URL` and `CURRICULENS_BIND`.
  pub fn with_env(self) -> Self {
    self.with_overrides(|name| std::env::var(name).ok())
  }

  fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    self.api_key = non_blank("GEMINI_API_KEY");
    if let Some(url) = non_blank("GEMINI_API_URL") {
      self.api_url = url;
    }
    if let Some(bind) = non_blank("CURRICULENS_BIND") {
      self.bind_addr = bind;
    }
    self
  }
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  if path.exists() {
    let data = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&data)
      .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
  }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json).with_context(|| format!("failed to write config {}", path.display()))?;
  Ok(())
}

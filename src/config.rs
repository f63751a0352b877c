//! Configuration management for model settings, batching, and paths.

use std::{
   collections::BTreeMap,
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const MAX_BATCH_SIZE_CAP: usize = 4096;

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub colbert_model:   String,
   pub colbert_dim:     usize,
   /// Marker token inserted after `[CLS]` in queries; `None` disables it.
   pub query_marker:    Option<String>,
   /// Marker token inserted after `[CLS]` in passages; `None` disables it.
   pub doc_marker:      Option<String>,
   /// Pads queries to `query_max_length` with attended `[MASK]` tokens.
   pub augment_queries: bool,

   pub clip_model:      String,
   pub clip_max_length: usize,

   pub query_prefix:       String,
   pub doc_prefix:         String,
   pub query_max_length:   usize,
   pub doc_max_length:     usize,
   pub default_batch_size: usize,
   pub max_batch_size:     usize,
   pub score_batch_size:   usize,
   pub max_threads:        usize,
   pub device:             String,

   pub offline:       bool,
   pub disable_gpu:   bool,
   pub show_progress: bool,

   /// Constructor options per retriever name, e.g. `[retrievers.dummy_retriever]`.
   pub retrievers: BTreeMap<String, Map<String, Value>>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         colbert_model: "answerdotai/answerai-colbert-small-v1@\
                         be1703c55532145a844da800eea4c9a692d7e267"
            .to_string(),
         colbert_dim: 96,
         query_marker: Some("[unused0]".to_string()),
         doc_marker: Some("[unused1]".to_string()),
         augment_queries: true,
         clip_model: "openai/clip-vit-base-patch32@refs/pr/15".to_string(),
         clip_max_length: 77,
         query_prefix: String::new(),
         doc_prefix: String::new(),
         query_max_length: 32,
         doc_max_length: 256,
         default_batch_size: 4,
         max_batch_size: 256,
         score_batch_size: 128,
         max_threads: 32,
         device: "auto".to_string(),
         offline: false,
         disable_gpu: false,
         show_progress: false,
         retrievers: BTreeMap::new(),
      }
   }
}

impl Config {
   /// Loads the global config file without creating it.
   pub fn load() -> Self {
      Self::load_from(config_file_path())
   }

   /// Loads defaults, then `path`, then `VDR_*` environment overrides.
   pub fn load_from(path: &Path) -> Self {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("VDR_").lowercase(true))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   /// Writes the defaults to `path`, creating parent directories.
   pub fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   /// Returns the configured batch size, capped at maximum
   pub fn batch_size(&self) -> usize {
      self
         .default_batch_size
         .min(self.max_batch_size)
         .min(MAX_BATCH_SIZE_CAP)
         .max(1)
   }

   /// Calculates default thread count based on available CPUs
   pub fn default_threads(&self) -> usize {
      num_cpus::get().clamp(1, self.max_threads.max(1))
   }

   /// Options configured for `retriever`, empty when none are set.
   pub fn retriever_options(&self, retriever: &str) -> Map<String, Value> {
      self.retrievers.get(retriever).cloned().unwrap_or_default()
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for vdr-bench data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".vdr-bench"))
}

/// Creates `~/.vdr-bench/config.toml` with defaults when it is missing.
pub fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path.clone()
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   model_dir: "models",
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn batch_size_is_capped() {
      let cfg = Config { default_batch_size: 512, max_batch_size: 64, ..Config::default() };
      assert_eq!(cfg.batch_size(), 64);

      let cfg = Config { default_batch_size: 0, ..Config::default() };
      assert_eq!(cfg.batch_size(), 1);
   }

   #[test]
   fn file_values_override_defaults() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("config.toml");
      fs::write(
         &path,
         r#"
score_batch_size = 32
device = "cpu"

[retrievers.dummy_retriever]
emb_dim_query = 8
seed = 7
"#,
      )
      .unwrap();

      let cfg = Config::load_from(&path);
      assert_eq!(cfg.score_batch_size, 32);
      assert_eq!(cfg.device, "cpu");
      assert_eq!(cfg.colbert_dim, 96);

      let opts = cfg.retriever_options("dummy_retriever");
      assert_eq!(opts.get("emb_dim_query"), Some(&Value::from(8)));
      assert_eq!(opts.get("seed"), Some(&Value::from(7)));
      assert!(cfg.retriever_options("colbert").is_empty());
   }

   #[test]
   fn missing_file_falls_back_to_defaults() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("absent.toml");
      let cfg = Config::load_from(&path);
      assert_eq!(cfg.batch_size(), Config::default().batch_size());
      assert!(!path.exists(), "loading must not create the config file");
   }

   #[test]
   fn written_defaults_load_back() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("nested").join("config.toml");
      Config::create_default_config(&path);
      assert!(path.exists());

      let cfg = Config::load_from(&path);
      assert_eq!(cfg.query_marker.as_deref(), Some("[unused0]"));
      assert_eq!(cfg.doc_marker.as_deref(), Some("[unused1]"));
      assert!(cfg.augment_queries);
      assert_eq!(cfg.clip_max_length, 77);
   }
}

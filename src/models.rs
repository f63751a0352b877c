//! Model identifier helpers (Hugging Face model IDs + revisions) and artifact
//! resolution through the local model cache.

use std::path::PathBuf;

use hf_hub::{Cache, Repo, RepoType, api::sync::ApiBuilder};

use crate::{
   config,
   error::{ConfigError, Error, Result},
};

/// Splits a model id of the form "org/name@rev" into ("org/name", Some("rev")).
/// If no revision is present, returns (model_id, None).
pub fn split_model_id(model_id: &str) -> (&str, Option<&str>) {
   if let Some((name, rev)) = model_id.split_once('@') {
      if rev.trim().is_empty() {
         return (model_id, None);
      }
      return (name, Some(rev));
   }
   (model_id, None)
}

/// Builds the Hugging Face `Repo` for a model id, preserving any pinned
/// revision.
pub fn repo_for_model(model_id: &str) -> Repo {
   let (model_name, revision) = split_model_id(model_id);
   match revision {
      Some(rev) => Repo::with_revision(model_name.to_string(), RepoType::Model, rev.to_string()),
      None => Repo::new(model_name.to_string(), RepoType::Model),
   }
}

/// Resolves `files` of `model_id` to local paths, downloading them into the
/// model cache unless offline mode is on.
pub fn fetch_files(model_id: &str, files: &[&str]) -> Result<Vec<PathBuf>> {
   let cfg = config::get();
   let cache_dir = config::model_dir().clone();
   let repo = repo_for_model(model_id);

   if cfg.offline {
      let cached = Cache::new(cache_dir).repo(repo);
      return files
         .iter()
         .map(|file| {
            cached.get(file).ok_or_else(|| {
               Error::from(ConfigError::DownloadsDisabled {
                  artifact: format!("{model_id}/{file}"),
               })
            })
         })
         .collect();
   }

   let api = ApiBuilder::new()
      .with_cache_dir(cache_dir)
      .with_progress(cfg.show_progress)
      .build()?;
   let remote = api.repo(repo);

   let mut paths = Vec::with_capacity(files.len());
   for file in files {
      tracing::debug!(model = model_id, file, "resolving model file");
      paths.push(remote.get(file)?);
   }
   Ok(paths)
}

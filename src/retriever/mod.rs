//! The retriever contract every backend implements, plus the options passed to
//! constructors and encode calls.

pub mod clip;
pub mod colbert;
pub mod dummy;
pub mod registry;

use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use self::{
   clip::ClipRetriever, colbert::ColbertRetriever, dummy::DummyRetriever, registry::Registry,
};
use crate::{
   embedding::{EmbeddingBatch, ScoreMatrix},
   error::{ConfigError, Result},
   types::{CapabilityMode, Passage, Query},
};

/// Uniform interface the harness drives every retrieval backend through.
///
/// `encode_queries` and `encode_passages` split their input into contiguous
/// chunks of at most `batch_size` items and return one [`Embedding`] per
/// chunk, in input order. `score` flattens both batches and returns a matrix
/// shaped `(total queries, total passages)`.
///
/// [`Embedding`]: crate::embedding::Embedding
pub trait Retriever: Send + Sync {
   /// Name the retriever is registered under.
   fn name(&self) -> &str;

   /// Passage representation `encode_passages` accepts.
   fn capability_mode(&self) -> CapabilityMode;

   fn encode_queries(
      &self,
      queries: &[Query],
      batch_size: usize,
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch>;

   fn encode_passages(
      &self,
      passages: &[Passage],
      batch_size: usize,
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch>;

   fn score(
      &self,
      query_embeddings: &EmbeddingBatch,
      passage_embeddings: &EmbeddingBatch,
      batch_size: Option<usize>,
   ) -> Result<ScoreMatrix>;
}

/// Per-call options for the encode methods.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
   /// Draw a progress bar over the chunks being encoded.
   pub show_progress: bool,
   /// Overrides the retriever's token truncation length.
   pub max_length:    Option<usize>,
}

/// Constructor arguments for a retriever, keyed by option name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrieverOptions {
   values: Map<String, Value>,
}

impl RetrieverOptions {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
      self.values.insert(key.into(), value.into());
      self
   }

   pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
      self.values.insert(key.into(), value.into());
   }

   pub fn get(&self, key: &str) -> Option<&Value> {
      self.values.get(key)
   }

   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   /// Overlays `other` on top of these options.
   pub fn merge(mut self, other: Self) -> Self {
      self.values.extend(other.values);
      self
   }

   /// Parses `key=value` pairs. Values that parse as JSON keep their type;
   /// anything else is taken as a string.
   pub fn parse_pairs<I, S>(pairs: I) -> Result<Self>
   where
      I: IntoIterator<Item = S>,
      S: AsRef<str>,
   {
      let mut options = Self::new();
      for pair in pairs {
         let pair = pair.as_ref();
         let Some((key, raw)) = pair.split_once('=') else {
            return Err(crate::Error::invalid(format!("option '{pair}' is not of the form key=value")));
         };
         let key = key.trim();
         if key.is_empty() {
            return Err(crate::Error::invalid(format!("option '{pair}' has an empty key")));
         }
         let raw = raw.trim();
         let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
         options.insert(key, value);
      }
      Ok(options)
   }

   /// Decodes the options into a typed struct for retriever `retriever`.
   pub fn decode<T: DeserializeOwned>(&self, retriever: &str) -> Result<T> {
      serde_json::from_value(Value::Object(self.values.clone())).map_err(|e| {
         ConfigError::InvalidOptions { retriever: retriever.to_string(), reason: e.to_string() }
            .into()
      })
   }
}

impl From<Map<String, Value>> for RetrieverOptions {
   fn from(values: Map<String, Value>) -> Self {
      Self { values }
   }
}

/// Progress bar over `total` chunks, hidden unless `visible`.
pub(crate) fn progress_bar(total: usize, visible: bool, label: &'static str) -> ProgressBar {
   if !visible {
      return ProgressBar::hidden();
   }
   let pb = ProgressBar::new(total as u64);
   if let Ok(style) =
      ProgressStyle::default_bar().template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
   {
      pb.set_style(style.progress_chars("█▓░"));
   }
   pb.set_message(label);
   pb
}

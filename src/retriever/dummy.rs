//! Randomized stand-in retriever for exercising harness plumbing without a
//! model.

use ndarray::Array2;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, distributions::Standard};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Deserialize;

use super::{EncodeOptions, Retriever, RetrieverOptions};
use crate::{
   batching,
   embedding::{Embedding, EmbeddingBatch, ScoreMatrix},
   error::Result,
   types::{CapabilityMode, Passage, Query},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyOptions {
   pub emb_dim_query: usize,
   pub emb_dim_doc:   usize,
   /// Seeds the generator; entropy is used when unset.
   pub seed:          Option<u64>,
   /// Shapes every chunk as `(batch_size, dim)` and scores as
   /// `(query chunks, passage chunks)`.
   pub legacy_shapes: bool,
}

impl Default for DummyOptions {
   fn default() -> Self {
      Self { emb_dim_query: 16, emb_dim_doc: 16, seed: None, legacy_shapes: false }
   }
}

/// Visual-mode retriever returning random embeddings and scores.
///
/// Embeddings are standard-normal, scores uniform in `[0, 1)`.
#[derive(Debug)]
pub struct DummyRetriever {
   options: DummyOptions,
   rng:     Mutex<ChaCha8Rng>,
}

impl DummyRetriever {
   pub const NAME: &'static str = "dummy_retriever";

   pub fn new(options: DummyOptions) -> Self {
      let rng = match options.seed {
         Some(seed) => ChaCha8Rng::seed_from_u64(seed),
         None => ChaCha8Rng::from_entropy(),
      };
      Self { options, rng: Mutex::new(rng) }
   }

   /// Registry constructor.
   pub fn construct(options: &RetrieverOptions) -> Result<Box<dyn Retriever>> {
      let options: DummyOptions = options.decode(Self::NAME)?;
      tracing::debug!(?options, "constructing dummy retriever");
      Ok(Box::new(Self::new(options)))
   }

   fn random_chunks(&self, len: usize, batch_size: usize, dim: usize) -> Result<EmbeddingBatch> {
      let batch_size = batching::check_batch_size(batch_size)?;
      let mut rng = self.rng.lock();
      Ok((0..batching::batch_count(len, batch_size))
         .map(|i| {
            let remaining = len - i * batch_size;
            let rows = if self.options.legacy_shapes {
               batch_size
            } else {
               remaining.min(batch_size)
            };
            let values = Array2::from_shape_simple_fn((rows, dim), || rng.sample(StandardNormal));
            Embedding::Dense(values)
         })
         .collect())
   }
}

impl Default for DummyRetriever {
   fn default() -> Self {
      Self::new(DummyOptions::default())
   }
}

impl Retriever for DummyRetriever {
   fn name(&self) -> &str {
      Self::NAME
   }

   fn capability_mode(&self) -> CapabilityMode {
      CapabilityMode::Visual
   }

   fn encode_queries(
      &self,
      queries: &[Query],
      batch_size: usize,
      _options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      self.random_chunks(queries.len(), batch_size, self.options.emb_dim_query)
   }

   fn encode_passages(
      &self,
      passages: &[Passage],
      batch_size: usize,
      _options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      batching::check_passage_modes(passages, self.capability_mode())?;
      self.random_chunks(passages.len(), batch_size, self.options.emb_dim_doc)
   }

   fn score(
      &self,
      query_embeddings: &EmbeddingBatch,
      passage_embeddings: &EmbeddingBatch,
      _batch_size: Option<usize>,
   ) -> Result<ScoreMatrix> {
      let shape = if self.options.legacy_shapes {
         (query_embeddings.len(), passage_embeddings.len())
      } else {
         (query_embeddings.total_items(), passage_embeddings.total_items())
      };
      let mut rng = self.rng.lock();
      Ok(Array2::from_shape_simple_fn(shape, || rng.sample(Standard)))
   }
}

#![allow(dead_code)]

use ndarray::Array2;
use vdr_bench::{
   CapabilityMode, Embedding, EmbeddingBatch, EncodeOptions, Passage, Query, Retriever,
   RetrieverOptions, ScoreMatrix, batching, scoring,
};

/// Deterministic textual retriever: every item embeds as `[text length, 1]`.
pub struct TestRetriever;

impl TestRetriever {
   pub const NAME: &'static str = "test_retriever";

   pub fn construct(_: &RetrieverOptions) -> vdr_bench::Result<Box<dyn Retriever>> {
      Ok(Box::new(Self))
   }

   fn embed(texts: &[&str], batch_size: usize) -> vdr_bench::Result<EmbeddingBatch> {
      Ok(batching::batched(texts, batch_size)?
         .map(|chunk| {
            Embedding::Dense(Array2::from_shape_fn((chunk.len(), 2), |(i, j)| {
               if j == 0 { chunk[i].len() as f32 } else { 1.0 }
            }))
         })
         .collect())
   }
}

impl Retriever for TestRetriever {
   fn name(&self) -> &str {
      Self::NAME
   }

   fn capability_mode(&self) -> CapabilityMode {
      CapabilityMode::Textual
   }

   fn encode_queries(
      &self,
      queries: &[Query],
      batch_size: usize,
      _options: &EncodeOptions,
   ) -> vdr_bench::Result<EmbeddingBatch> {
      let texts: Vec<&str> = queries.iter().map(Query::as_str).collect();
      Self::embed(&texts, batch_size)
   }

   fn encode_passages(
      &self,
      passages: &[Passage],
      batch_size: usize,
      _options: &EncodeOptions,
   ) -> vdr_bench::Result<EmbeddingBatch> {
      batching::check_passage_modes(passages, self.capability_mode())?;
      let texts: Vec<&str> = passages.iter().filter_map(Passage::as_text).collect();
      Self::embed(&texts, batch_size)
   }

   fn score(
      &self,
      query_embeddings: &EmbeddingBatch,
      passage_embeddings: &EmbeddingBatch,
      batch_size: Option<usize>,
   ) -> vdr_bench::Result<ScoreMatrix> {
      scoring::score_batches(query_embeddings, passage_embeddings, batch_size.unwrap_or(16))
   }
}

pub fn queries(texts: &[&str]) -> Vec<Query> {
   texts.iter().copied().map(Query::from).collect()
}

pub fn text_passages(texts: &[&str]) -> Vec<Passage> {
   texts.iter().map(|t| Passage::Text((*t).to_string())).collect()
}

pub fn image_passages(n: usize) -> Vec<Passage> {
   (0..n)
      .map(|i| Passage::Image(image::DynamicImage::new_rgb8(8 + i as u32, 8)))
      .collect()
}

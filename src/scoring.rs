//! Similarity kernels turning query and passage embeddings into score
//! matrices.
//!
//! Both kernels flatten the batch structure first, so the result is always
//! shaped `(total queries, total passages)` however the inputs were chunked.

use ndarray::{Array2, ArrayView2, Axis, concatenate};
use rayon::prelude::*;

use crate::{
   embedding::{Embedding, EmbeddingBatch, ScoreMatrix},
   error::{Error, Result},
};

/// Stacks every single-vector item of `batch`, in order, into one matrix.
pub fn flatten_dense(batch: &EmbeddingBatch, what: &str) -> Result<Array2<f32>> {
   let mut views = Vec::with_capacity(batch.len());
   for chunk in batch {
      match chunk {
         Embedding::Dense(rows) => views.push(rows.view()),
         Embedding::MultiVector(_) => {
            return Err(Error::invalid(format!(
               "expected single-vector {what} embeddings, found multi-vector"
            )));
         },
      }
   }

   if views.iter().all(|v| v.nrows() == 0) {
      return Err(Error::invalid(format!("no {what} embeddings provided")));
   }
   check_uniform_dim(views.iter().map(|v| v.ncols()), what)?;

   Ok(concatenate(Axis(0), &views)?)
}

/// Collects every token matrix of `batch`, in order.
pub fn flatten_multi<'a>(batch: &'a EmbeddingBatch, what: &str) -> Result<Vec<ArrayView2<'a, f32>>> {
   let mut items = Vec::with_capacity(batch.total_items());
   for chunk in batch {
      match chunk.token_matrices() {
         Some(matrices) => items.extend(matrices),
         None => {
            return Err(Error::invalid(format!(
               "expected multi-vector {what} embeddings, found single-vector"
            )));
         },
      }
   }

   if items.is_empty() {
      return Err(Error::invalid(format!("no {what} embeddings provided")));
   }
   check_uniform_dim(items.iter().map(|m| m.ncols()), what)?;

   Ok(items)
}

fn check_uniform_dim(mut dims: impl Iterator<Item = usize>, what: &str) -> Result<usize> {
   let first = dims.next().unwrap_or(0);
   if let Some(other) = dims.find(|&d| d != first) {
      return Err(Error::invalid(format!(
         "{what} embeddings have mixed dimensions ({first} and {other})"
      )));
   }
   Ok(first)
}

fn check_same_dim(query_dim: usize, passage_dim: usize) -> Result<()> {
   if query_dim != passage_dim {
      return Err(Error::invalid(format!(
         "query dimension {query_dim} does not match passage dimension {passage_dim}"
      )));
   }
   Ok(())
}

/// Dot-product scores between pooled query and passage vectors: `Q · Pᵀ`.
pub fn score_single_vector(queries: &Array2<f32>, passages: &Array2<f32>) -> Result<ScoreMatrix> {
   check_same_dim(queries.ncols(), passages.ncols())?;
   Ok(queries.dot(&passages.t()))
}

/// Late-interaction score of one query against one passage: the sum over
/// query tokens of the best dot product with any passage token.
pub fn max_sim(query: &ArrayView2<'_, f32>, passage: &ArrayView2<'_, f32>) -> f32 {
   if passage.nrows() == 0 {
      return 0.0;
   }
   let sim = query.dot(&passage.t());
   sim.outer_iter()
      .map(|row| row.fold(f32::NEG_INFINITY, |best, &s| best.max(s)))
      .sum()
}

/// `MaxSim` scores for every query/passage pair.
///
/// Queries are processed in blocks of `batch_size`; rows inside a block are
/// computed in parallel and written back in input order.
pub fn score_multi_vector(
   queries: &[ArrayView2<'_, f32>],
   passages: &[ArrayView2<'_, f32>],
   batch_size: usize,
) -> Result<ScoreMatrix> {
   if queries.is_empty() {
      return Err(Error::invalid("no query embeddings provided"));
   }
   if passages.is_empty() {
      return Err(Error::invalid("no passage embeddings provided"));
   }
   if batch_size == 0 {
      return Err(Error::invalid("batch_size must be a positive integer"));
   }
   check_same_dim(queries[0].ncols(), passages[0].ncols())?;

   let mut flat = Vec::with_capacity(queries.len() * passages.len());
   for block in queries.chunks(batch_size) {
      let rows: Vec<Vec<f32>> = block
         .par_iter()
         .map(|q| passages.iter().map(|p| max_sim(q, p)).collect())
         .collect();
      tracing::trace!(rows = rows.len(), "scored query block");
      flat.extend(rows.into_iter().flatten());
   }

   Ok(Array2::from_shape_vec((queries.len(), passages.len()), flat)?)
}

/// Scores two embedding batches with the kernel matching their kind.
pub fn score_batches(
   queries: &EmbeddingBatch,
   passages: &EmbeddingBatch,
   batch_size: usize,
) -> Result<ScoreMatrix> {
   let dense = queries.iter().all(Embedding::is_dense);
   if dense {
      let q = flatten_dense(queries, "query")?;
      let p = flatten_dense(passages, "passage")?;
      score_single_vector(&q, &p)
   } else {
      let q = flatten_multi(queries, "query")?;
      let p = flatten_multi(passages, "passage")?;
      score_multi_vector(&q, &p, batch_size)
   }
}

/// Rejects score matrices holding NaN or infinite values.
pub fn ensure_finite(scores: &ScoreMatrix) -> Result<()> {
   if let Some(((row, col), value)) = scores.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(Error::invalid(format!("non-finite score {value} at ({row}, {col})")));
   }
   Ok(())
}

//! Embedding containers produced by retrievers and consumed by scoring.

use ndarray::{Array2, ArrayView2};

/// Relevance scores with rows indexed by queries and columns by passages.
pub type ScoreMatrix = Array2<f32>;

/// Embeddings for one contiguous chunk of inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
   /// One pooled vector per item, shaped `(items, dim)`.
   Dense(Array2<f32>),
   /// One token matrix per item, each shaped `(tokens, dim)`.
   MultiVector(Vec<Array2<f32>>),
}

impl Embedding {
   /// Number of items (queries or passages) this chunk holds.
   pub fn len(&self) -> usize {
      match self {
         Self::Dense(rows) => rows.nrows(),
         Self::MultiVector(items) => items.len(),
      }
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// Width of each vector; `None` for a multi-vector chunk with no items.
   pub fn dim(&self) -> Option<usize> {
      match self {
         Self::Dense(rows) => Some(rows.ncols()),
         Self::MultiVector(items) => items.first().map(|m| m.ncols()),
      }
   }

   pub const fn is_dense(&self) -> bool {
      matches!(self, Self::Dense(_))
   }

   /// Iterates the token matrices of a multi-vector chunk.
   pub fn token_matrices(&self) -> Option<impl Iterator<Item = ArrayView2<'_, f32>>> {
      match self {
         Self::MultiVector(items) => Some(items.iter().map(|m| m.view())),
         Self::Dense(_) => None,
      }
   }
}

/// Ordered embeddings for a collection of inputs, one entry per input chunk.
///
/// The concatenation of all chunks, in order, is the embedding set of the
/// whole collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
   chunks: Vec<Embedding>,
}

impl EmbeddingBatch {
   pub const fn new() -> Self {
      Self { chunks: Vec::new() }
   }

   pub fn with_capacity(capacity: usize) -> Self {
      Self { chunks: Vec::with_capacity(capacity) }
   }

   pub fn push(&mut self, chunk: Embedding) {
      self.chunks.push(chunk);
   }

   /// Number of chunks (batches).
   pub fn len(&self) -> usize {
      self.chunks.len()
   }

   pub fn is_empty(&self) -> bool {
      self.chunks.is_empty()
   }

   /// Number of items across every chunk.
   pub fn total_items(&self) -> usize {
      self.chunks.iter().map(Embedding::len).sum()
   }

   pub fn iter(&self) -> std::slice::Iter<'_, Embedding> {
      self.chunks.iter()
   }

   pub fn chunk_sizes(&self) -> Vec<usize> {
      self.chunks.iter().map(Embedding::len).collect()
   }
}

impl From<Vec<Embedding>> for EmbeddingBatch {
   fn from(chunks: Vec<Embedding>) -> Self {
      Self { chunks }
   }
}

impl FromIterator<Embedding> for EmbeddingBatch {
   fn from_iter<I: IntoIterator<Item = Embedding>>(iter: I) -> Self {
      Self { chunks: iter.into_iter().collect() }
   }
}

impl<'a> IntoIterator for &'a EmbeddingBatch {
   type IntoIter = std::slice::Iter<'a, Embedding>;
   type Item = &'a Embedding;

   fn into_iter(self) -> Self::IntoIter {
      self.chunks.iter()
   }
}

//! Batch partitioning shared by every retriever.

use crate::{
   error::{Error, Result},
   types::{CapabilityMode, Passage},
};

/// Rejects a zero batch size.
pub fn check_batch_size(batch_size: usize) -> Result<usize> {
   if batch_size == 0 {
      return Err(Error::invalid("batch_size must be a positive integer"));
   }
   Ok(batch_size)
}

/// Number of chunks `len` inputs split into: `ceil(len / batch_size)`.
pub const fn batch_count(len: usize, batch_size: usize) -> usize {
   if batch_size == 0 {
      return 0;
   }
   len.div_ceil(batch_size)
}

/// Splits `items` into contiguous chunks of at most `batch_size`, in order.
pub fn batched<T>(items: &[T], batch_size: usize) -> Result<std::slice::Chunks<'_, T>> {
   Ok(items.chunks(check_batch_size(batch_size)?))
}

/// Ensures every passage matches the representation `mode` expects.
pub fn check_passage_modes(passages: &[Passage], mode: CapabilityMode) -> Result<()> {
   match passages.iter().position(|p| p.mode() != mode) {
      Some(index) => Err(Error::TypeMismatch { index, expected: mode, found: passages[index].mode() }),
      None => Ok(()),
   }
}

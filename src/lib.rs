//! Retriever contract, registry and reference retrievers for visual document
//! retrieval benchmarks.
//!
//! A harness picks a retriever by name from the [`Registry`], encodes queries
//! and passages in batches, and scores every query against every passage.

pub mod batching;
pub mod cmd;
pub mod config;
pub mod device;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod models;
pub mod retriever;
pub mod scoring;
pub mod types;

pub use crate::{
   embedding::{Embedding, EmbeddingBatch, ScoreMatrix},
   error::{Error, Result},
   retriever::{EncodeOptions, Registry, Retriever, RetrieverOptions},
   types::{CapabilityMode, Passage, Query},
};

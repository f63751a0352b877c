//! ColBERT-style late-interaction retriever over OCR text.
//!
//! A BERT backbone produces one hidden state per token; a linear projection
//! maps each to `dim` and the result is L2-normalized. Queries and passages get
//! their marker token right after `[CLS]`, and queries are padded with attended
//! `[MASK]` tokens up to `query_max_length`. Padding tokens are dropped, so
//! every item keeps a token matrix of its own length. Scoring is `MaxSim`.

use std::{fs, path::Path};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, linear_no_bias};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use ndarray::Array2;
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use super::{EncodeOptions, Retriever, RetrieverOptions, progress_bar};
use crate::{
   batching,
   config::{self, Config},
   device::select_device,
   embedding::{Embedding, EmbeddingBatch, ScoreMatrix},
   error::{EmbeddingError, Error, Result},
   models, scoring,
   types::{CapabilityMode, Passage, Query},
};

const MODEL_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];
const MASK_TOKEN: &str = "[MASK]";
const PAD_TOKEN: &str = "[PAD]";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColbertOptions {
   /// Hugging Face model id, optionally pinned with `@revision`.
   pub model:            String,
   pub device:           String,
   pub dim:              usize,
   pub query_max_length: usize,
   pub doc_max_length:   usize,
   pub query_prefix:     String,
   pub doc_prefix:       String,
   pub query_marker:     Option<String>,
   pub doc_marker:       Option<String>,
   pub augment_queries:  bool,
   pub score_batch_size: usize,
}

impl ColbertOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         model:            cfg.colbert_model.clone(),
         device:           cfg.device.clone(),
         dim:              cfg.colbert_dim,
         query_max_length: cfg.query_max_length,
         doc_max_length:   cfg.doc_max_length,
         query_prefix:     cfg.query_prefix.clone(),
         doc_prefix:       cfg.doc_prefix.clone(),
         query_marker:     cfg.query_marker.clone(),
         doc_marker:       cfg.doc_marker.clone(),
         augment_queries:  cfg.augment_queries,
         score_batch_size: cfg.score_batch_size,
      }
   }
}

impl Default for ColbertOptions {
   fn default() -> Self {
      Self::from_config(config::get())
   }
}

#[derive(Debug, Clone, Copy)]
enum Side {
   Query,
   Passage,
}

/// Width of the backbone's hidden states, read from its `config.json`.
#[derive(Deserialize)]
struct HiddenSize {
   hidden_size: usize,
}

/// Vocabulary ids of the tokens spliced into encoded sequences.
#[derive(Debug, Clone, Copy)]
struct SpecialIds {
   query_marker: Option<u32>,
   doc_marker:   Option<u32>,
   mask:         Option<u32>,
   pad:          u32,
}

pub struct ColbertRetriever {
   options:    ColbertOptions,
   model:      BertModel,
   projection: Linear,
   tokenizer:  Tokenizer,
   special:    SpecialIds,
   device:     Device,
}

impl ColbertRetriever {
   pub const NAME: &'static str = "colbert";

   /// Registry constructor.
   pub fn construct(options: &RetrieverOptions) -> Result<Box<dyn Retriever>> {
      let options: ColbertOptions = options.decode(Self::NAME)?;
      Ok(Box::new(Self::load(options)?))
   }

   /// Resolves the model files (downloading unless offline) and loads them.
   pub fn load(options: ColbertOptions) -> Result<Self> {
      let paths = models::fetch_files(&options.model, &MODEL_FILES)?;
      Self::load_from_files(options, &paths[0], &paths[1], &paths[2])
   }

   pub fn load_from_files(
      options: ColbertOptions,
      config_path: &Path,
      tokenizer_path: &Path,
      weights_path: &Path,
   ) -> Result<Self> {
      if options.dim == 0 {
         return Err(Error::invalid("colbert projection dim must be positive"));
      }
      if options.query_max_length == 0 || options.doc_max_length == 0 {
         return Err(Error::invalid("colbert max lengths must be positive"));
      }
      let device = select_device(&options.device)?;

      let raw = fs::read_to_string(config_path)?;
      let model_config_error = |e: serde_json::Error| EmbeddingError::ModelConfig {
         path:   config_path.display().to_string(),
         reason: e.to_string(),
      };
      let bert_config: BertConfig = serde_json::from_str(&raw).map_err(model_config_error)?;
      let HiddenSize { hidden_size } = serde_json::from_str(&raw).map_err(model_config_error)?;

      // SAFETY: the weights file lives in the model cache and is only read while
      // mapped.
      let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? };
      let backbone = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
         vb.pp("bert")
      } else {
         vb.clone()
      };
      let model = BertModel::load(backbone, &bert_config)?;
      let projection = linear_no_bias(hidden_size, options.dim, vb.pp("linear"))?;

      let tokenizer = Tokenizer::from_file(tokenizer_path)
         .map_err(|e| EmbeddingError::LoadTokenizer(e.to_string()))?;
      let special = resolve_special_ids(&tokenizer, &options)?;

      tracing::info!(
         model = %options.model,
         device = ?device,
         dim = options.dim,
         ?special,
         "loaded colbert retriever"
      );

      Ok(Self { options, model, projection, tokenizer, special, device })
   }

   fn tokenizer_for(&self, max_length: usize) -> Result<Tokenizer> {
      let mut tokenizer = self.tokenizer.clone();
      tokenizer
         .with_truncation(Some(TruncationParams { max_length, ..Default::default() }))
         .map_err(|e| EmbeddingError::LoadTokenizer(e.to_string()))?;
      Ok(tokenizer)
   }

   fn encode_texts(
      &self,
      texts: &[&str],
      side: Side,
      batch_size: usize,
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      let chunks = batching::batched(texts, batch_size)?;
      let (prefix, default_max_length, marker, label) = match side {
         Side::Query => (
            &self.options.query_prefix,
            self.options.query_max_length,
            self.special.query_marker,
            "Encoding queries",
         ),
         Side::Passage => (
            &self.options.doc_prefix,
            self.options.doc_max_length,
            self.special.doc_marker,
            "Encoding passages",
         ),
      };
      let max_length = options.max_length.unwrap_or(default_max_length);
      let fill = match side {
         Side::Query => self.special.mask.map(|id| (id, max_length)),
         Side::Passage => None,
      };
      // Leave room for the marker spliced in after tokenization.
      let room = max_length.saturating_sub(usize::from(marker.is_some())).max(1);
      let tokenizer = self.tokenizer_for(room)?;

      let total = batching::batch_count(texts.len(), batch_size);
      let pb = progress_bar(total, options.show_progress || config::get().show_progress, label);
      let mut out = EmbeddingBatch::with_capacity(total);
      for chunk in chunks {
         let inputs: Vec<String> = chunk.iter().map(|t| format!("{prefix}{t}")).collect();
         out.push(self.embed_chunk(&tokenizer, inputs, marker, fill)?);
         pb.inc(1);
      }
      pb.finish_and_clear();

      tracing::debug!(?side, chunks = out.len(), items = out.total_items(), "encoded texts");
      Ok(out)
   }

   fn embed_chunk(
      &self,
      tokenizer: &Tokenizer,
      inputs: Vec<String>,
      marker: Option<u32>,
      fill: Option<(u32, usize)>,
   ) -> Result<Embedding> {
      let encodings = tokenizer
         .encode_batch(inputs, true)
         .map_err(|e| EmbeddingError::Tokenize(e.to_string()))?;
      let sequences: Vec<Vec<u32>> = encodings
         .iter()
         .map(|e| build_sequence(e.get_ids(), marker, fill))
         .collect();
      let rows = sequences.len();
      let (ids, mask, seq_len) = pad_batch(&sequences, self.special.pad);
      let dim = self.options.dim;
      if seq_len == 0 {
         return Ok(Embedding::MultiVector(vec![Array2::zeros((0, dim)); rows]));
      }

      let input_ids = Tensor::from_vec(ids, (rows, seq_len), &self.device)?;
      let attention_mask = Tensor::from_vec(mask.clone(), (rows, seq_len), &self.device)?;
      let token_type_ids = input_ids.zeros_like()?;

      let hidden = self
         .model
         .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
      let projected = self.projection.forward(&hidden)?;
      let norms = (projected.sqr()?.sum_keepdim(D::Minus1)?.sqrt()? + 1e-12)?;
      let normalized = projected
         .broadcast_div(&norms)?
         .to_dtype(DType::F32)?
         .to_device(&Device::Cpu)?;
      let values: Vec<Vec<Vec<f32>>> = normalized.to_vec3()?;

      let items = values
         .into_iter()
         .zip(mask.chunks(seq_len))
         .map(|(tokens, row_mask)| {
            let kept: Vec<f32> = tokens
               .into_iter()
               .zip(row_mask)
               .filter(|(_, m)| **m == 1)
               .flat_map(|(token, _)| token)
               .collect();
            Array2::from_shape_vec((kept.len() / dim, dim), kept)
         })
         .collect::<Result<Vec<_>, _>>()?;

      Ok(Embedding::MultiVector(items))
   }
}

fn resolve_special_ids(tokenizer: &Tokenizer, options: &ColbertOptions) -> Result<SpecialIds> {
   let token_id = |token: &str| {
      tokenizer.token_to_id(token).ok_or_else(|| {
         EmbeddingError::LoadTokenizer(format!("token '{token}' is not in the vocabulary"))
      })
   };
   let query_marker = options.query_marker.as_deref().map(token_id).transpose()?;
   let doc_marker = options.doc_marker.as_deref().map(token_id).transpose()?;
   let mask = if options.augment_queries { Some(token_id(MASK_TOKEN)?) } else { None };
   let pad = tokenizer
      .get_padding()
      .map(|p| p.pad_id)
      .or_else(|| tokenizer.token_to_id(PAD_TOKEN))
      .unwrap_or(0);
   Ok(SpecialIds { query_marker, doc_marker, mask, pad })
}

/// Splices `marker` in after the leading `[CLS]` and, with `fill = (id, len)`,
/// pads the sequence to `len` with `id`.
fn build_sequence(ids: &[u32], marker: Option<u32>, fill: Option<(u32, usize)>) -> Vec<u32> {
   let mut seq = Vec::with_capacity(ids.len() + 1);
   seq.extend_from_slice(ids);
   if let Some(marker) = marker {
      seq.insert(seq.len().min(1), marker);
   }
   if let Some((id, len)) = fill
      && seq.len() < len
   {
      seq.resize(len, id);
   }
   seq
}

/// Right-pads every sequence to the longest with `pad_id`. Returns the flat ids,
/// the attention mask and the padded length.
fn pad_batch(sequences: &[Vec<u32>], pad_id: u32) -> (Vec<u32>, Vec<u32>, usize) {
   let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
   let mut ids = Vec::with_capacity(sequences.len() * seq_len);
   let mut mask = Vec::with_capacity(sequences.len() * seq_len);
   for seq in sequences {
      let padding = seq_len - seq.len();
      ids.extend_from_slice(seq);
      ids.extend(std::iter::repeat_n(pad_id, padding));
      mask.extend(std::iter::repeat_n(1, seq.len()));
      mask.extend(std::iter::repeat_n(0, padding));
   }
   (ids, mask, seq_len)
}

impl Retriever for ColbertRetriever {
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
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      let texts: Vec<&str> = queries.iter().map(Query::as_str).collect();
      self.encode_texts(&texts, Side::Query, batch_size, options)
   }

   fn encode_passages(
      &self,
      passages: &[Passage],
      batch_size: usize,
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      batching::check_passage_modes(passages, self.capability_mode())?;
      let texts: Vec<&str> = passages.iter().filter_map(Passage::as_text).collect();
      self.encode_texts(&texts, Side::Passage, batch_size, options)
   }

   fn score(
      &self,
      query_embeddings: &EmbeddingBatch,
      passage_embeddings: &EmbeddingBatch,
      batch_size: Option<usize>,
   ) -> Result<ScoreMatrix> {
      let queries = scoring::flatten_multi(query_embeddings, "query")?;
      let passages = scoring::flatten_multi(passage_embeddings, "passage")?;
      scoring::score_multi_vector(
         &queries,
         &passages,
         batch_size.unwrap_or(self.options.score_batch_size),
      )
   }
}

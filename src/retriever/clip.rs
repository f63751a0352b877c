//! CLIP bi-encoder over page images.
//!
//! Queries go through the text tower and pages through the vision tower; both
//! are projected into the shared space and L2-normalized, giving one pooled
//! vector per item. Scores are plain dot products.

use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use image::{DynamicImage, imageops::FilterType};
use ndarray::Array2;
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

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

const MODEL_FILES: [&str; 2] = ["tokenizer.json", "model.safetensors"];
const PAD_TOKEN: &str = "<|endoftext|>";
/// Text positions of the ViT-B/32 text tower.
const MAX_POSITIONS: usize = 77;

pub const IMAGE_SIZE: u32 = 224;
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClipOptions {
   /// Hugging Face id of a ViT-B/32 CLIP checkpoint, optionally `@revision`.
   pub model:      String,
   pub device:     String,
   pub max_length: usize,
}

impl ClipOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         model:      cfg.clip_model.clone(),
         device:     cfg.device.clone(),
         max_length: cfg.clip_max_length,
      }
   }

   fn validate(&self) -> Result<()> {
      if self.max_length == 0 || self.max_length > MAX_POSITIONS {
         return Err(Error::invalid(format!(
            "clip max_length must be between 1 and {MAX_POSITIONS}, got {}",
            self.max_length
         )));
      }
      Ok(())
   }
}

impl Default for ClipOptions {
   fn default() -> Self {
      Self::from_config(config::get())
   }
}

pub struct ClipRetriever {
   options:   ClipOptions,
   model:     ClipModel,
   tokenizer: Tokenizer,
   device:    Device,
}

impl ClipRetriever {
   pub const NAME: &'static str = "clip";

   /// Registry constructor.
   pub fn construct(options: &RetrieverOptions) -> Result<Box<dyn Retriever>> {
      let options: ClipOptions = options.decode(Self::NAME)?;
      Ok(Box::new(Self::load(options)?))
   }

   pub fn load(options: ClipOptions) -> Result<Self> {
      options.validate()?;
      let paths = models::fetch_files(&options.model, &MODEL_FILES)?;
      Self::load_from_files(options, &paths[0], &paths[1])
   }

   pub fn load_from_files(options: ClipOptions, tokenizer_path: &Path, weights_path: &Path) -> Result<Self> {
      options.validate()?;
      let device = select_device(&options.device)?;

      // SAFETY: the weights file lives in the model cache and is only read while
      // mapped.
      let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
      let model = ClipModel::new(vb, &ClipConfig::vit_base_patch32())?;

      let mut tokenizer = Tokenizer::from_file(tokenizer_path)
         .map_err(|e| EmbeddingError::LoadTokenizer(e.to_string()))?;
      let pad_id = tokenizer.token_to_id(PAD_TOKEN).ok_or_else(|| {
         EmbeddingError::LoadTokenizer(format!("token '{PAD_TOKEN}' is not in the vocabulary"))
      })?;
      tokenizer.with_padding(Some(PaddingParams {
         strategy: PaddingStrategy::BatchLongest,
         pad_id,
         pad_token: PAD_TOKEN.to_string(),
         ..Default::default()
      }));
      tokenizer
         .with_truncation(Some(TruncationParams {
            max_length: options.max_length,
            ..Default::default()
         }))
         .map_err(|e| EmbeddingError::LoadTokenizer(e.to_string()))?;

      tracing::info!(model = %options.model, device = ?device, "loaded clip retriever");
      Ok(Self { options, model, tokenizer, device })
   }

   fn embed_texts(&self, texts: Vec<String>) -> Result<Embedding> {
      let encodings = self
         .tokenizer
         .encode_batch(texts, true)
         .map_err(|e| EmbeddingError::Tokenize(e.to_string()))?;
      let rows = encodings.len();
      let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());
      let ids: Vec<u32> = encodings
         .iter()
         .flat_map(|e| e.get_ids().iter().copied())
         .collect();

      let input_ids = Tensor::from_vec(ids, (rows, seq_len), &self.device)?;
      let features = self.model.get_text_features(&input_ids)?;
      Ok(Embedding::Dense(normalized_rows(&features)?))
   }

   fn embed_images(&self, images: &[&DynamicImage]) -> Result<Embedding> {
      let pixels = images
         .iter()
         .map(|image| preprocess(image))
         .collect::<Result<Vec<_>>>()?;
      let pixel_values = Tensor::stack(&pixels, 0)?.to_device(&self.device)?;
      let features = self.model.get_image_features(&pixel_values)?;
      Ok(Embedding::Dense(normalized_rows(&features)?))
   }
}

/// Resizes to 224x224 and normalizes with the CLIP channel statistics,
/// returning a `(3, 224, 224)` tensor on the CPU.
pub fn preprocess(image: &DynamicImage) -> Result<Tensor> {
   let rgb = image
      .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
      .to_rgb8();
   let size = IMAGE_SIZE as usize;
   let plane = size * size;
   let mut data = vec![0.0f32; 3 * plane];
   for (x, y, pixel) in rgb.enumerate_pixels() {
      let offset = y as usize * size + x as usize;
      for channel in 0..3 {
         data[channel * plane + offset] =
            (f32::from(pixel[channel]) / 255.0 - CLIP_MEAN[channel]) / CLIP_STD[channel];
      }
   }
   Ok(Tensor::from_vec(data, (3, size, size), &Device::Cpu)?)
}

fn normalized_rows(features: &Tensor) -> Result<Array2<f32>> {
   let norms = (features.sqr()?.sum_keepdim(D::Minus1)?.sqrt()? + 1e-12)?;
   let rows = features
      .broadcast_div(&norms)?
      .to_dtype(DType::F32)?
      .to_device(&Device::Cpu)?;
   let (n, dim) = rows.dims2()?;
   Ok(Array2::from_shape_vec((n, dim), rows.flatten_all()?.to_vec1::<f32>()?)?)
}

impl Retriever for ClipRetriever {
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
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      let total = batching::batch_count(queries.len(), batch_size);
      let pb = progress_bar(
         total,
         options.show_progress || config::get().show_progress,
         "Encoding queries",
      );
      let mut out = EmbeddingBatch::with_capacity(total);
      for chunk in batching::batched(queries, batch_size)? {
         out.push(self.embed_texts(chunk.iter().map(|q| q.as_str().to_string()).collect())?);
         pb.inc(1);
      }
      pb.finish_and_clear();
      Ok(out)
   }

   fn encode_passages(
      &self,
      passages: &[Passage],
      batch_size: usize,
      options: &EncodeOptions,
   ) -> Result<EmbeddingBatch> {
      batching::check_passage_modes(passages, self.capability_mode())?;
      let images: Vec<&DynamicImage> = passages.iter().filter_map(Passage::as_image).collect();

      let total = batching::batch_count(images.len(), batch_size);
      let pb = progress_bar(
         total,
         options.show_progress || config::get().show_progress,
         "Encoding passages",
      );
      let mut out = EmbeddingBatch::with_capacity(total);
      for chunk in batching::batched(&images, batch_size)? {
         out.push(self.embed_images(chunk)?);
         pb.inc(1);
      }
      pb.finish_and_clear();

      tracing::debug!(chunks = out.len(), items = out.total_items(), "encoded page images");
      Ok(out)
   }

   fn score(
      &self,
      query_embeddings: &EmbeddingBatch,
      passage_embeddings: &EmbeddingBatch,
      _batch_size: Option<usize>,
   ) -> Result<ScoreMatrix> {
      let queries = scoring::flatten_dense(query_embeddings, "query")?;
      let passages = scoring::flatten_dense(passage_embeddings, "passage")?;
      tracing::trace!(model = %self.options.model, "scoring dense embeddings");
      scoring::score_single_vector(&queries, &passages)
   }
}

#[cfg(test)]
mod tests {
   use image::{Rgb, RgbImage};

   use super::*;

   #[test]
   fn preprocess_resizes_and_normalizes() {
      let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(31, 17, Rgb([255, 255, 255])));
      let pixels = preprocess(&white).unwrap();
      assert_eq!(pixels.dims(), &[3, 224, 224]);

      let values: Vec<Vec<Vec<f32>>> = pixels.to_vec3().unwrap();
      for channel in 0..3 {
         let expected = (1.0 - CLIP_MEAN[channel]) / CLIP_STD[channel];
         assert!((values[channel][100][7] - expected).abs() < 1e-5);
      }
   }

   #[test]
   fn rows_are_unit_length() {
      let features = Tensor::new(&[[3.0f32, 4.0], [0.0, 2.0]], &Device::Cpu).unwrap();
      let rows = normalized_rows(&features).unwrap();
      assert_eq!(rows, ndarray::array![[0.6, 0.8], [0.0, 1.0]]);
   }

   #[test]
   fn options_follow_config() {
      let cfg = Config { clip_max_length: 40, ..Config::default() };
      let options = ClipOptions::from_config(&cfg);
      assert_eq!(options.max_length, 40);
      assert!(options.model.starts_with("openai/clip-vit-base-patch32"));
   }
}

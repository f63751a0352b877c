use std::io;

use thiserror::Error;

use crate::types::CapabilityMode;

/// Main error type for vdr-bench.
///
/// Contract violations (bad batch sizes, passages of the wrong kind), registry
/// lookups and construction failures, plus the wrapped errors of the model and
/// I/O layers underneath the retrievers.
#[derive(Debug, Error)]
pub enum Error {
   /// Malformed argument, such as a zero batch size or an empty required
   /// input.
   #[error("invalid argument: {0}")]
   InvalidArgument(String),

   /// A passage representation does not match the retriever's capability
   /// mode.
   #[error("passage {index} is {found}, but the retriever expects {expected} passages")]
   TypeMismatch {
      index:    usize,
      expected: CapabilityMode,
      found:    CapabilityMode,
   },

   /// A retriever name was registered twice.
   #[error("retriever '{0}' is already registered")]
   DuplicateName(String),

   /// A retriever name was never registered.
   #[error("unknown retriever '{0}'")]
   UnknownName(String),

   /// The constructor of a registered retriever failed.
   #[error("failed to construct retriever '{name}': {source}")]
   Construction {
      name:   String,
      #[source]
      source: Box<Self>,
   },

   /// I/O error occurred while reading inputs or model files.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Error occurred while loading or running an embedding model.
   #[error("embedding error: {0}")]
   Embedding(#[from] EmbeddingError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// Image decoding error occurred.
   #[error("image error: {0}")]
   Image(#[from] image::ImageError),

   /// Tensor shape did not match its data.
   #[error("shape error: {0}")]
   Shape(#[from] ndarray::ShapeError),

   /// Hugging Face Hub API error occurred.
   #[error("hf_hub error: {0}")]
   HfHub(#[from] hf_hub::api::sync::ApiError),
}

impl Error {
   pub fn invalid(msg: impl Into<String>) -> Self {
      Self::InvalidArgument(msg.into())
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::InvalidArgument(_) | Self::TypeMismatch { .. } => 2,
         Self::UnknownName(_) | Self::DuplicateName(_) => 3,
         Self::Construction { .. } => 4,
         Self::Embedding(_) | Self::HfHub(_) => 5,
         Self::Config(ConfigError::DownloadsDisabled { .. }) => 6,
         _ => 1,
      }
   }
}

/// Errors raised by the model backend (candle + tokenizers).
#[derive(Debug, Error)]
pub enum EmbeddingError {
   /// Tensor computation failed.
   #[error("candle error: {0}")]
   Candle(#[from] candle_core::Error),

   /// Failed to load or configure the tokenizer.
   #[error("failed to load tokenizer: {0}")]
   LoadTokenizer(String),

   /// Tokenization of a batch failed.
   #[error("failed to tokenize batch: {0}")]
   Tokenize(String),

   /// The model configuration file could not be parsed.
   #[error("invalid model config {path}: {reason}")]
   ModelConfig { path: String, reason: String },

   /// The requested compute device is not available.
   #[error("device '{0}' is not available")]
   DeviceUnavailable(String),
}

/// Errors that can occur while resolving configuration and model artifacts.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Options supplied for a retriever could not be decoded.
   #[error("invalid options for {retriever}: {reason}")]
   InvalidOptions { retriever: String, reason: String },

   /// Downloads are disabled (offline mode).
   #[error("downloads disabled for {artifact}; pre-seed the model cache or unset VDR_OFFLINE")]
   DownloadsDisabled { artifact: String },
}

impl From<candle_core::Error> for Error {
   fn from(e: candle_core::Error) -> Self {
      Self::Embedding(EmbeddingError::Candle(e))
   }
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::{fmt, path::Path};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which passage representation a retriever consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityMode {
   /// Rasterized pages, screenshots and other images.
   Visual,
   /// OCR-derived text.
   Textual,
}

impl CapabilityMode {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Visual => "visual",
         Self::Textual => "textual",
      }
   }
}

impl fmt::Display for CapabilityMode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Text describing an information need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
   pub fn new(text: impl Into<String>) -> Self {
      Self(text.into())
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }
}

impl From<&str> for Query {
   fn from(text: &str) -> Self {
      Self::new(text)
   }
}

impl From<String> for Query {
   fn from(text: String) -> Self {
      Self(text)
   }
}

/// A unit of document content, either a rendered page or its OCR text.
#[derive(Debug, Clone)]
pub enum Passage {
   Image(DynamicImage),
   Text(String),
}

impl Passage {
   pub const fn mode(&self) -> CapabilityMode {
      match self {
         Self::Image(_) => CapabilityMode::Visual,
         Self::Text(_) => CapabilityMode::Textual,
      }
   }

   pub fn as_text(&self) -> Option<&str> {
      match self {
         Self::Text(text) => Some(text),
         Self::Image(_) => None,
      }
   }

   pub const fn as_image(&self) -> Option<&DynamicImage> {
      match self {
         Self::Image(image) => Some(image),
         Self::Text(_) => None,
      }
   }

   /// Loads a passage from disk in the representation `mode` asks for.
   pub fn load(path: &Path, mode: CapabilityMode) -> Result<Self> {
      match mode {
         CapabilityMode::Visual => Ok(Self::Image(image::open(path)?)),
         CapabilityMode::Textual => Ok(Self::Text(std::fs::read_to_string(path)?)),
      }
   }
}

impl From<DynamicImage> for Passage {
   fn from(image: DynamicImage) -> Self {
      Self::Image(image)
   }
}

impl From<String> for Passage {
   fn from(text: String) -> Self {
      Self::Text(text)
   }
}

impl From<&str> for Passage {
   fn from(text: &str) -> Self {
      Self::Text(text.to_string())
   }
}

//! Name → constructor table for selecting retrievers at runtime.

use std::{collections::BTreeMap, fmt, sync::OnceLock};

use super::{ClipRetriever, ColbertRetriever, DummyRetriever, Retriever, RetrieverOptions};
use crate::error::{Error, Result};

/// Builds a retriever from its options.
pub type Constructor = fn(&RetrieverOptions) -> Result<Box<dyn Retriever>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

#[derive(Default, Clone)]
pub struct Registry {
   entries: BTreeMap<String, Constructor>,
}

impl Registry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Registry holding every built-in retriever.
   pub fn with_builtin() -> Result<Self> {
      let mut registry = Self::new();
      register_builtin(&mut registry)?;
      Ok(registry)
   }

   /// Adds `constructor` under `name`. Nothing is constructed here.
   pub fn register(&mut self, name: &str, constructor: Constructor) -> Result<()> {
      if self.entries.contains_key(name) {
         return Err(Error::DuplicateName(name.to_string()));
      }
      self.entries.insert(name.to_string(), constructor);
      Ok(())
   }

   pub fn resolve(&self, name: &str) -> Result<Constructor> {
      self
         .entries
         .get(name)
         .copied()
         .ok_or_else(|| Error::UnknownName(name.to_string()))
   }

   /// Resolves `name` and builds the retriever, wrapping constructor failures.
   pub fn construct(&self, name: &str, options: &RetrieverOptions) -> Result<Box<dyn Retriever>> {
      let constructor = self.resolve(name)?;
      let retriever = constructor(options)
         .map_err(|e| Error::Construction { name: name.to_string(), source: Box::new(e) })?;
      tracing::info!(retriever = name, mode = %retriever.capability_mode(), "constructed retriever");
      Ok(retriever)
   }

   pub fn contains(&self, name: &str) -> bool {
      self.entries.contains_key(name)
   }

   /// Registered names in sorted order.
   pub fn names(&self) -> impl Iterator<Item = &str> {
      self.entries.keys().map(String::as_str)
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}

impl fmt::Debug for Registry {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_set().entries(self.names()).finish()
   }
}

/// Registers the retrievers shipped with this crate.
pub fn register_builtin(registry: &mut Registry) -> Result<()> {
   registry.register(DummyRetriever::NAME, DummyRetriever::construct)?;
   registry.register(ColbertRetriever::NAME, ColbertRetriever::construct)?;
   registry.register(ClipRetriever::NAME, ClipRetriever::construct)?;
   Ok(())
}

/// Process-wide registry of the built-in retrievers, built on first use.
pub fn global() -> Result<&'static Registry> {
   if let Some(registry) = REGISTRY.get() {
      return Ok(registry);
   }
   let registry = Registry::with_builtin()?;
   Ok(REGISTRY.get_or_init(|| registry))
}

#[cfg(test)]
mod tests {
   use super::*;

   fn failing(_: &RetrieverOptions) -> Result<Box<dyn Retriever>> {
      Err(Error::invalid("no backend"))
   }

   #[test]
   fn duplicate_names_are_rejected() {
      let mut registry = Registry::new();
      registry.register("a", DummyRetriever::construct).unwrap();
      assert!(matches!(
         registry.register("a", DummyRetriever::construct),
         Err(Error::DuplicateName(name)) if name == "a"
      ));
      assert_eq!(registry.len(), 1);
   }

   #[test]
   fn unknown_names_are_reported() {
      let registry = Registry::new();
      assert!(matches!(registry.resolve("missing"), Err(Error::UnknownName(_))));
      assert!(matches!(
         registry.construct("missing", &RetrieverOptions::new()),
         Err(Error::UnknownName(_))
      ));
   }

   #[test]
   fn constructor_failures_are_wrapped() {
      let mut registry = Registry::new();
      registry.register("broken", failing).unwrap();
      match registry.construct("broken", &RetrieverOptions::new()) {
         Err(Error::Construction { name, source }) => {
            assert_eq!(name, "broken");
            assert!(matches!(*source, Error::InvalidArgument(_)));
         },
         Err(other) => panic!("unexpected error {other}"),
         Ok(_) => panic!("construction should fail"),
      }
   }

   #[test]
   fn builtin_names_are_sorted() {
      let registry = Registry::with_builtin().unwrap();
      assert_eq!(registry.names().collect::<Vec<_>>(), vec!["clip", "colbert", "dummy_retriever"]);
   }

   #[test]
   fn global_registry_is_shared() {
      let a = global().unwrap();
      let b = global().unwrap();
      assert!(std::ptr::eq(a, b));
      assert!(a.contains(DummyRetriever::NAME));
   }
}

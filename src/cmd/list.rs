//! Retriever listing command.

use console::style;
use serde::Serialize;

use crate::{Result, retriever::registry};

#[derive(Debug, Serialize)]
struct Listing<'a> {
   retrievers: Vec<&'a str>,
}

/// Prints the names of every registered retriever.
pub fn execute(json: bool) -> Result<()> {
   let registry = registry::global()?;
   let listing = Listing { retrievers: registry.names().collect() };

   if json {
      println!("{}", serde_json::to_string_pretty(&listing)?);
      return Ok(());
   }

   println!("{}", style("Registered retrievers:").bold());
   for name in listing.retrievers {
      println!("  {} {name}", style("●").green());
   }
   Ok(())
}

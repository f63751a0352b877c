//! End-to-end retriever run.
//!
//! Constructs a retriever by name, encodes the given queries and passages,
//! scores them and reports the matrix shape plus the best passages per query.

use std::{
   fs,
   path::{Path, PathBuf},
   time::Instant,
};

use console::style;
use serde::Serialize;

use crate::{
   Result,
   batching, config,
   error::Error,
   retriever::{EncodeOptions, Registry, RetrieverOptions, registry},
   scoring,
   types::{CapabilityMode, Passage, Query},
};

/// Inputs of a single run.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
   pub retriever:        String,
   /// Constructor options as `key=value` pairs, applied over the configured
   /// ones.
   pub options:          Vec<String>,
   pub queries:          Vec<String>,
   /// File with one query per line.
   pub queries_file:     Option<PathBuf>,
   pub passages:         Vec<PathBuf>,
   pub batch_size:       Option<usize>,
   pub score_batch_size: Option<usize>,
   pub top_k:            usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
   pub retriever:       String,
   pub mode:            CapabilityMode,
   pub batch_size:      usize,
   pub query_batches:   Vec<usize>,
   pub passage_batches: Vec<usize>,
   pub shape:           [usize; 2],
   pub elapsed_ms:      u128,
   pub results:         Vec<QueryResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
   pub query: String,
   pub hits:  Vec<Hit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hit {
   pub passage: String,
   pub score:   f32,
}

/// Runs against the global registry and prints the report.
pub fn execute(args: RunArgs, json: bool) -> Result<()> {
   let report = evaluate(registry::global()?, &args)?;
   if json {
      println!("{}", serde_json::to_string_pretty(&report)?);
   } else {
      print_report(&report);
   }
   Ok(())
}

/// Builds the retriever from `registry` and produces the report.
pub fn evaluate(registry: &Registry, args: &RunArgs) -> Result<RunReport> {
   let cfg = config::get();
   let queries = load_queries(&args.queries, args.queries_file.as_deref())?;
   if queries.is_empty() {
      return Err(Error::invalid("no queries given (use --query or --queries)"));
   }
   if args.passages.is_empty() {
      return Err(Error::invalid("no passages given (use --passage)"));
   }
   let batch_size = batching::check_batch_size(args.batch_size.unwrap_or_else(|| cfg.batch_size()))?;

   let options = RetrieverOptions::from(cfg.retriever_options(&args.retriever))
      .merge(RetrieverOptions::parse_pairs(&args.options)?);
   let retriever = registry.construct(&args.retriever, &options)?;
   let mode = retriever.capability_mode();
   let passages = load_passages(&args.passages, mode)?;

   let start = Instant::now();
   let encode = EncodeOptions { show_progress: cfg.show_progress, max_length: None };
   let query_embeddings = retriever.encode_queries(&queries, batch_size, &encode)?;
   let passage_embeddings = retriever.encode_passages(&passages, batch_size, &encode)?;
   let scores = retriever.score(&query_embeddings, &passage_embeddings, args.score_batch_size)?;
   scoring::ensure_finite(&scores)?;
   let elapsed_ms = start.elapsed().as_millis();

   tracing::info!(
      retriever = retriever.name(),
      queries = queries.len(),
      passages = passages.len(),
      shape = ?scores.dim(),
      elapsed_ms,
      "scored run"
   );

   let results = scores
      .rows()
      .into_iter()
      .zip(&queries)
      .map(|(row, query)| QueryResult {
         query: query.as_str().to_string(),
         hits:  top_k(row.iter().copied(), args.top_k)
            .into_iter()
            .map(|(idx, score)| Hit { passage: passage_label(&args.passages, idx), score })
            .collect(),
      })
      .collect();

   Ok(RunReport {
      retriever: retriever.name().to_string(),
      mode,
      batch_size,
      query_batches: query_embeddings.chunk_sizes(),
      passage_batches: passage_embeddings.chunk_sizes(),
      shape: [scores.nrows(), scores.ncols()],
      elapsed_ms,
      results,
   })
}

/// Inline queries first, then the non-blank lines of `file`.
pub fn load_queries(inline: &[String], file: Option<&Path>) -> Result<Vec<Query>> {
   let mut queries: Vec<Query> = inline.iter().map(|q| Query::new(q.as_str())).collect();
   if let Some(path) = file {
      let content = fs::read_to_string(path)?;
      queries.extend(
         content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Query::from),
      );
   }
   Ok(queries)
}

/// Reads each path as an image or as UTF-8 text depending on `mode`.
pub fn load_passages(paths: &[PathBuf], mode: CapabilityMode) -> Result<Vec<Passage>> {
   paths.iter().map(|path| Passage::load(path, mode)).collect()
}

/// Indices and scores of the `k` highest scores, best first. Ties keep input
/// order.
pub fn top_k(scores: impl Iterator<Item = f32>, k: usize) -> Vec<(usize, f32)> {
   let mut ranked: Vec<(usize, f32)> = scores.enumerate().collect();
   ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
   ranked.truncate(k);
   ranked
}

fn passage_label(paths: &[PathBuf], idx: usize) -> String {
   paths
      .get(idx)
      .map_or_else(|| format!("#{idx}"), |p| p.display().to_string())
}

fn print_report(report: &RunReport) {
   println!(
      "{} {} ({} mode, batch size {})",
      style("Retriever").bold(),
      style(&report.retriever).cyan(),
      report.mode,
      report.batch_size
   );
   println!(
      "Query batches: {:?}  Passage batches: {:?}",
      report.query_batches, report.passage_batches
   );
   println!(
      "Scores: {} x {} {}",
      report.shape[0],
      report.shape[1],
      style(format!("({} ms)", report.elapsed_ms)).dim()
   );

   for result in &report.results {
      println!();
      println!("{}", style(&result.query).bold());
      for (rank, hit) in result.hits.iter().enumerate() {
         println!(
            "  {:>2}. {} {}",
            rank + 1,
            style(format!("{:.4}", hit.score)).green(),
            hit.passage
         );
      }
   }
}

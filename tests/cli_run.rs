mod support;

use std::{fs, path::PathBuf};

use support::TestRetriever;
use tempfile::TempDir;
use vdr_bench::{
   CapabilityMode, Error, Registry,
   cmd::run::{self, RunArgs},
};

fn write_images(dir: &TempDir, n: usize) -> Vec<PathBuf> {
   (0..n)
      .map(|i| {
         let path = dir.path().join(format!("page-{i}.png"));
         image::RgbImage::new(4, 4).save(&path).unwrap();
         path
      })
      .collect()
}

fn write_texts(dir: &TempDir, texts: &[&str]) -> Vec<PathBuf> {
   texts
      .iter()
      .enumerate()
      .map(|(i, text)| {
         let path = dir.path().join(format!("page-{i}.txt"));
         fs::write(&path, text).unwrap();
         path
      })
      .collect()
}

fn args(retriever: &str, queries: &[&str], passages: Vec<PathBuf>) -> RunArgs {
   RunArgs {
      retriever: retriever.to_string(),
      queries: queries.iter().map(|q| (*q).to_string()).collect(),
      passages,
      batch_size: Some(2),
      top_k: 2,
      ..Default::default()
   }
}

#[test]
fn dummy_run_reports_shape_and_batches() {
   let dir = tempfile::tempdir().unwrap();
   let mut run_args = args("dummy_retriever", &["a", "b", "c"], write_images(&dir, 3));
   run_args.options = vec!["seed=7".to_string(), "emb_dim_doc=16".to_string()];

   let report = run::evaluate(&Registry::with_builtin().unwrap(), &run_args).unwrap();
   assert_eq!(report.mode, CapabilityMode::Visual);
   assert_eq!(report.query_batches, vec![2, 1]);
   assert_eq!(report.passage_batches, vec![2, 1]);
   assert_eq!(report.shape, [3, 3]);
   assert_eq!(report.results.len(), 3);
   assert!(report.results.iter().all(|r| r.hits.len() == 2));

   let json = serde_json::to_value(&report).unwrap();
   assert_eq!(json["mode"], "visual");
   assert_eq!(json["shape"], serde_json::json!([3, 3]));
}

#[test]
fn textual_run_ranks_passages() {
   let dir = tempfile::tempdir().unwrap();
   let passages = write_texts(&dir, &["short", "a much longer passage", "mid size"]);
   let mut registry = Registry::new();
   registry
      .register(TestRetriever::NAME, TestRetriever::construct)
      .unwrap();

   let report = run::evaluate(&registry, &args(TestRetriever::NAME, &["query"], passages.clone())).unwrap();
   assert_eq!(report.shape, [1, 3]);
   let best = &report.results[0].hits[0];
   assert_eq!(best.passage, passages[1].display().to_string());
}

#[test]
fn queries_file_is_appended() {
   let dir = tempfile::tempdir().unwrap();
   let file = dir.path().join("queries.txt");
   fs::write(&file, "second\nthird\n").unwrap();

   let mut run_args = args("dummy_retriever", &["first"], write_images(&dir, 1));
   run_args.queries_file = Some(file);

   let report = run::evaluate(&Registry::with_builtin().unwrap(), &run_args).unwrap();
   let queries: Vec<&str> = report.results.iter().map(|r| r.query.as_str()).collect();
   assert_eq!(queries, vec!["first", "second", "third"]);
}

#[test]
fn unknown_retriever_fails_before_loading_passages() {
   let run_args = args("colpali", &["q"], vec![PathBuf::from("/nonexistent/page.png")]);
   let err = run::evaluate(&Registry::with_builtin().unwrap(), &run_args).unwrap_err();
   assert!(matches!(err, Error::UnknownName(_)));
}

#[test]
fn missing_inputs_are_invalid() {
   let registry = Registry::with_builtin().unwrap();
   let no_queries = args("dummy_retriever", &[], vec![PathBuf::from("x.png")]);
   assert!(matches!(run::evaluate(&registry, &no_queries), Err(Error::InvalidArgument(_))));

   let no_passages = args("dummy_retriever", &["q"], Vec::new());
   assert!(matches!(run::evaluate(&registry, &no_passages), Err(Error::InvalidArgument(_))));

   let mut zero_batch = args("dummy_retriever", &["q"], vec![PathBuf::from("x.png")]);
   zero_batch.batch_size = Some(0);
   assert!(matches!(run::evaluate(&registry, &zero_batch), Err(Error::InvalidArgument(_))));
}

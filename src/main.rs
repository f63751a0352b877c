use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vdr_bench::{
   Result,
   cmd::{self, run::RunArgs},
   config, logging,
};

/// Command-line arguments for the vdr-bench application
#[derive(Parser)]
#[command(name = "vdr-bench")]
#[command(about = "Exercise document retrievers through their common contract")]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for vdr-bench
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "List registered retrievers")]
   List {
      #[arg(long, help = "Output JSON")]
      json: bool,
   },

   #[command(about = "Encode queries and passages with a retriever and score them")]
   Run {
      #[arg(short = 'r', long, help = "Registered retriever name")]
      retriever: String,

      #[arg(
         short = 'o',
         long = "option",
         value_name = "KEY=VALUE",
         help = "Retriever constructor option (repeatable)"
      )]
      options: Vec<String>,

      #[arg(short = 'q', long = "query", help = "Query text (repeatable)")]
      queries: Vec<String>,

      #[arg(long = "queries", value_name = "FILE", help = "File with one query per line")]
      queries_file: Option<PathBuf>,

      #[arg(
         short = 'p',
         long = "passage",
         value_name = "PATH",
         help = "Passage file: an image for visual retrievers, UTF-8 text for textual ones"
      )]
      passages: Vec<PathBuf>,

      #[arg(short = 'b', long, help = "Encode batch size (default: from config)")]
      batch_size: Option<usize>,

      #[arg(long, help = "Scoring batch size")]
      score_batch_size: Option<usize>,

      #[arg(short = 'k', long, default_value = "5", help = "Passages to show per query")]
      top_k: usize,

      #[arg(long, help = "Output JSON")]
      json: bool,
   },
}

fn main() {
   logging::init();

   let cli = Cli::parse();
   config::ensure_global_config();

   let threads = config::get().default_threads();
   if let Err(e) = rayon::ThreadPoolBuilder::new()
      .num_threads(threads)
      .build_global()
   {
      tracing::debug!("rayon pool already initialized: {e}");
   }

   if let Err(err) = run(cli) {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Cmd::List { json } => cmd::list::execute(json),
      Cmd::Run {
         retriever,
         options,
         queries,
         queries_file,
         passages,
         batch_size,
         score_batch_size,
         top_k,
         json,
      } => cmd::run::execute(
         RunArgs {
            retriever,
            options,
            queries,
            queries_file,
            passages,
            batch_size,
            score_batch_size,
            top_k,
         },
         json,
      ),
   }
}

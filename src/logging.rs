//! Tracing subscriber setup for the CLI.

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Builds the filter for `directives` (the `RUST_LOG` syntax), falling back to
/// `warn` when they enable nothing.
pub fn env_filter(directives: &str) -> EnvFilter {
   EnvFilter::builder()
      .with_default_directive(LevelFilter::WARN.into())
      .parse_lossy(directives)
}

/// Installs the global fmt subscriber, filtered by `RUST_LOG`.
pub fn init() {
   let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
   tracing_subscriber::fmt()
      .with_env_filter(env_filter(&directives))
      .init();
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn unset_defaults_to_warn() {
      assert_eq!(env_filter("").max_level_hint(), Some(LevelFilter::WARN));
   }

   #[test]
   fn global_level_raises_verbosity() {
      assert_eq!(env_filter("info").max_level_hint(), Some(LevelFilter::INFO));
      assert_eq!(env_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
   }

   #[test]
   fn target_directives_are_honored() {
      assert_eq!(env_filter("vdr_bench=trace").max_level_hint(), Some(LevelFilter::TRACE));
   }
}

//! CLI command implementations for vdr-bench.
//!
//! Each module corresponds to a subcommand of the `vdr-bench` binary.

pub mod list;
pub mod run;

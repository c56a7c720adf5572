//! CLI Module
//!
//! Exit codes and results for the `logdump` binary

pub mod exit_codes;

pub use exit_codes::{exit_code_description, CliResult, ExitCodes};

//! # Logdump Core Library
//!
//! Retrieves the JSON-lines log stored on a sensor node's SD card over a
//! serial link. The host sends a single trigger byte and the firmware answers
//! with the file framed between `===BEGIN_LOGS===` and `===END_LOGS===`
//! lines.
//!
//! ## Example
//!
//! ```rust,no_run
//! use logdump_core::{ExtractOptions, SerialConfig, StreamExtractor};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 115200);
//!     let extractor = StreamExtractor::new(ExtractOptions::default());
//!
//!     let report = extractor.extract(&config, Path::new("logs.jsonl"))?;
//!     if !report.is_complete() {
//!         eprintln!("warning: end marker missing");
//!     }
//!
//!     let records = logdump_core::validate(Path::new("logs.jsonl"))?;
//!     println!("{} records", records.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::extractor::{
    extract, ExtractOptions, ExtractReport, ExtractionError, ExtractionState, ExtractionWarning,
    StreamExtractor,
};
pub use crate::core::simulator::{DeviceHandle, Reply, SimulatedDevice};
pub use crate::core::transport::{SerialConfig, SerialTransport, Transport, TransportError};
pub use crate::core::validator::{validate, Record, Summary, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

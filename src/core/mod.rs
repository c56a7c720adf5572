//! Core module containing the main functionality of Logdump
//!
//! This module provides:
//! - Dump framing and marker scanning
//! - Transport layer (serial port and simulated device)
//! - Stream extractor state machine
//! - Atomic payload persistence
//! - JSON-lines record validation and summary

pub mod clock;
pub mod extractor;
pub mod framing;
pub mod payload;
pub mod simulator;
pub mod transport;
pub mod validator;

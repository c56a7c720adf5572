//! CLI Exit Codes
//!
//! Exit codes for scripted use of `logdump`.

use crate::core::extractor::ExtractionError;
use crate::core::validator::ValidationError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Extraction failed, or invalid arguments
    pub const EXTRACT_FAILED: u8 = 2;

    /// Smoke test: download step failed
    pub const DOWNLOAD_FAILED: u8 = 3;

    /// Smoke test: output file missing after download
    pub const OUTPUT_MISSING: u8 = 4;

    /// Output file is not valid JSON lines
    pub const VALIDATION_FAILED: u8 = 5;

    /// Output file holds no records
    pub const NO_RECORDS: u8 = 6;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for stderr
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with exit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<ExtractionError> for CliResult {
    fn from(err: ExtractionError) -> Self {
        Self::Error(ExitCodes::EXTRACT_FAILED, err.to_string())
    }
}

impl From<ValidationError> for CliResult {
    fn from(err: ValidationError) -> Self {
        Self::Error(ExitCodes::VALIDATION_FAILED, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Extraction failed or invalid arguments",
        3 => "Download failed",
        4 => "Output file missing",
        5 => "Validation failed",
        6 => "No records",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(ExitCodes::NO_RECORDS, "No records found");
        assert!(!error.is_success());
        assert_eq!(error.code(), 6);
        assert_eq!(error.message(), Some("No records found"));
    }

    #[test]
    fn test_from_extraction_error() {
        let result = CliResult::from(ExtractionError::DeviceTimeout(Duration::from_secs(10)));
        assert_eq!(result.code(), ExitCodes::EXTRACT_FAILED);
        assert!(result.message().unwrap().contains("10.0s"));
    }

    #[test]
    fn test_from_validation_error() {
        let result = CliResult::from(ValidationError::NotAnObject { line: 4 });
        assert_eq!(result.code(), ExitCodes::VALIDATION_FAILED);
        assert_eq!(exit_code_description(result.code()), "Validation failed");
    }
}

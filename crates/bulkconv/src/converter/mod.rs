pub mod soffice;

use std::path::{Path, PathBuf};

use crate::error::ConversionError;
use crate::model::FailureKind;

pub use soffice::SofficeConverter;

/// Turns one input document into one rendered output.
///
/// Implementations make a single attempt per call and leave no shared state
/// behind; retries are the caller's business.
pub trait DocumentConverter: Send + Sync {
    /// Converts `input` and returns the path of the artifact written into
    /// `output_dir`.
    fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError>;

    /// Extension of the produced artifacts, without a leading dot.
    fn target_extension(&self) -> &str;
}

/// Where a converter is expected to leave the output for `input`.
pub fn expected_output(input: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{}.{}", stem, extension))
}

impl ConversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConversionError::EngineFailure { .. } => FailureKind::EngineFailure,
            ConversionError::Timeout(_) => FailureKind::Timeout,
            ConversionError::MissingOutput { .. } => FailureKind::MissingOutput,
            ConversionError::InputUnreadable { .. } | ConversionError::Io { .. } => {
                FailureKind::Unexpected
            }
        }
    }
}

//! Error taxonomy for conversion operations.

use thiserror::Error;

/// Error type for conversion operations.
///
/// All failures bubble out of [`crate::Converter::convert`] as one of these;
/// the core never returns a partial result.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Source bytes could not be interpreted as the claimed format
    /// (corrupt file, unsupported codec, encrypted PDF).
    #[error("could not decode input as {format}: {reason}")]
    Decode { format: String, reason: String },

    /// No implemented strategy for this tool/extension pair.
    #[error("no conversion available from {input} to {output}")]
    Unsupported { input: String, output: String },

    /// An opaque external routine (background removal, HEIC bridge) failed
    /// or is not configured. Wrapped with context, never retried.
    #[error("{routine} failed: {reason}")]
    External { routine: String, reason: String },

    /// PDF document could not be built or written.
    #[error("failed to build PDF: {0}")]
    Pdf(String),

    /// A settings value is out of its documented range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl ConvertError {
    pub(crate) fn decode(format: impl Into<String>, reason: impl ToString) -> Self {
        ConvertError::Decode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn external(routine: impl Into<String>, reason: impl ToString) -> Self {
        ConvertError::External {
            routine: routine.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(input: impl Into<String>, output: impl Into<String>) -> Self {
        ConvertError::Unsupported {
            input: input.into(),
            output: output.into(),
        }
    }
}

//! Conversion request and artifact types.

use bytes::Bytes;
use cf_core::{output_file_name, FileFormat, QualityTier};
use serde::{Deserialize, Serialize};

/// An accepted request. Immutable once handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub source: Bytes,
    pub file_name: String,
    pub output_format: FileFormat,
    pub quality: QualityTier,
}

impl ConversionRequest {
    pub fn new(
        source: impl Into<Bytes>,
        file_name: impl Into<String>,
        output_format: FileFormat,
        quality: QualityTier,
    ) -> Self {
        Self {
            source: source.into(),
            file_name: file_name.into(),
            output_format,
            quality,
        }
    }

    /// Size of the source in bytes.
    pub fn source_len(&self) -> u64 {
        self.source.len() as u64
    }

    /// Suggested name for the produced file.
    pub fn output_file_name(&self) -> String {
        output_file_name(&self.file_name, self.output_format)
    }
}

/// The finished artifact, tagged with the MIME type actually negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    pub data: Bytes,
    pub mime_type: String,
    pub size: u64,
}

impl ConversionOutput {
    pub fn new(data: Bytes, mime_type: impl Into<String>) -> Self {
        let size = data.len() as u64;
        Self {
            data,
            mime_type: mime_type.into(),
            size,
        }
    }
}

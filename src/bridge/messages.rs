//! Wire messages exchanged between UI surfaces and the bridge.

use bytes::Bytes;
use cf_core::{FileFormat, JobId, QualityTier, Result};
use cf_pipeline::{ConversionOutput, ConversionRequest};
use serde::{Deserialize, Serialize};

use crate::state::{FailureResponse, FinishedJob, JobStatus};

/// A request sent by a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BridgeRequest {
    StartConversion { data: StartConversion },
    IsConversionInProgress,
    GetStatus,
    TakeResult,
}

/// Payload of `startConversion`, as sent by a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversion {
    pub file_data: Bytes,
    pub file_name: String,
    pub output_format: String,
    #[serde(default)]
    pub quality: String,
}

impl StartConversion {
    pub fn new(
        file_data: impl Into<Bytes>,
        file_name: impl Into<String>,
        output_format: impl Into<String>,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            file_data: file_data.into(),
            file_name: file_name.into(),
            output_format: output_format.into(),
            quality: quality.into(),
        }
    }

    /// Validate the output format and build the request. Unknown quality
    /// labels fall back to medium.
    pub fn into_request(self) -> Result<ConversionRequest> {
        let output_format: FileFormat = self.output_format.parse()?;
        Ok(ConversionRequest::new(
            self.file_data,
            self.file_name,
            output_format,
            QualityTier::parse_lenient(&self.quality),
        ))
    }
}

/// A reply to exactly one [`BridgeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeResponse {
    Started {
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
    Status(JobStatus),
    Result(ResultResponse),
    Error(FailureResponse),
}

/// The outcome of the last finished job, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConversionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureResponse>,
}

impl ResultResponse {
    /// Nothing has finished since the last `takeResult`.
    pub fn empty() -> Self {
        Self {
            success: false,
            job_id: None,
            file_name: None,
            data: None,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.job_id.is_none()
    }
}

impl From<FinishedJob> for ResultResponse {
    fn from(finished: FinishedJob) -> Self {
        let (success, data, error) = match finished.result {
            Ok(output) => (true, Some(output), None),
            Err(failure) => (false, None, Some(failure)),
        };
        Self {
            success,
            job_id: Some(finished.job_id),
            file_name: Some(finished.output_file_name),
            data,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn request_uses_action_tag() {
        let req: BridgeRequest = serde_json::from_value(json!({
            "action": "startConversion",
            "data": {
                "fileData": [1, 2, 3],
                "fileName": "clip.mp4",
                "outputFormat": "mp3",
                "quality": "high"
            }
        }))
        .unwrap();
        match req {
            BridgeRequest::StartConversion { data } => {
                assert_eq!(&data.file_data[..], &[1, 2, 3]);
                let request = data.into_request().unwrap();
                assert_eq!(request.output_format, FileFormat::Mp3);
                assert_eq!(request.quality, QualityTier::High);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let req: BridgeRequest =
            serde_json::from_value(json!({ "action": "isConversionInProgress" })).unwrap();
        assert_eq!(req, BridgeRequest::IsConversionInProgress);
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let err = StartConversion::new(vec![0u8], "clip.mp4", "xyz", "high")
            .into_request()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn unknown_quality_becomes_medium() {
        let request = StartConversion::new(vec![0u8], "clip.mp4", "mp3", "ultra")
            .into_request()
            .unwrap();
        assert_eq!(request.quality, QualityTier::Medium);
    }

    #[test]
    fn error_response_shape() {
        let response = BridgeResponse::Error(FailureResponse::new(
            ErrorKind::AlreadyRunningError,
            "busy",
        ));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["errorKind"], "AlreadyRunningError");
        assert_eq!(json["message"], "busy");
    }

    #[test]
    fn empty_result_omits_payloads() {
        let json = serde_json::to_value(BridgeResponse::Result(ResultResponse::empty())).unwrap();
        assert_eq!(json, json!({ "type": "result", "success": false }));
    }
}

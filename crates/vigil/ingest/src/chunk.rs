use serde::{Deserialize, Serialize};
use vigil_types::{ContentHash, Modality, RawContent, SessionId};

/// One captured audio chunk or visual frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureChunk {
    pub session_id: SessionId,
    pub modality: Modality,
    pub timestamp_ms: u64,
    pub payload: RawContent,
}

impl CaptureChunk {
    pub fn new(
        session_id: SessionId,
        modality: Modality,
        timestamp_ms: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            session_id,
            modality,
            timestamp_ms,
            payload: RawContent::new(payload),
        }
    }

    /// Content address the analysis capability receives instead of the bytes.
    pub fn payload_ref(&self) -> ContentHash {
        self.payload.content_hash()
    }

    pub fn request(&self) -> AnalysisRequest {
        AnalysisRequest {
            session_id: self.session_id,
            modality: self.modality.clone(),
            timestamp_ms: self.timestamp_ms,
            payload_ref: self.payload_ref(),
            payload_len: self.payload.len(),
        }
    }
}

/// Request sent to an analysis capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub session_id: SessionId,
    pub modality: Modality,
    pub timestamp_ms: u64,
    pub payload_ref: ContentHash,
    pub payload_len: usize,
}

/// Result returned by an analysis capability, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Modality label as the capability reports it
    pub modality: String,
    /// Score contribution, expected 0–100
    pub score: f64,
    /// Expected 0–1
    pub confidence: f64,
    /// Indicator tags such as `authority-claim`
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AnalysisResponse {
    pub fn new(modality: impl Into<String>, score: f64, confidence: f64) -> Self {
        Self {
            modality: modality.into(),
            score,
            confidence,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

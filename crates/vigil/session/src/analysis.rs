use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use vigil_ingest::{AnalysisRequest, AnalysisResponse};
use vigil_types::{ContentHash, Modality};

use crate::error::AnalysisError;

/// External analysis capability (transcription, vision, reasoning).
///
/// Receives a payload reference, never the raw bytes.
#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Analysis capability answering from a script keyed by payload reference.
///
/// Unscripted payloads get a neutral low score. Used by tests and the
/// `vigil simulate` scenario runner.
#[derive(Default)]
pub struct ScriptedAnalysis {
    responses: DashMap<ContentHash, AnalysisResponse>,
    latency: DashMap<Modality, Duration>,
    unavailable: DashMap<Modality, String>,
}

impl ScriptedAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, payload_ref: ContentHash, response: AnalysisResponse) {
        self.responses.insert(payload_ref, response);
    }

    pub fn set_latency(&self, modality: Modality, latency: Duration) {
        self.latency.insert(modality, latency);
    }

    pub fn set_unavailable(&self, modality: Modality, reason: impl Into<String>) {
        self.unavailable.insert(modality, reason.into());
    }

    pub fn restore(&self, modality: &Modality) {
        self.unavailable.remove(modality);
        self.latency.remove(modality);
    }
}

#[async_trait]
impl AnalysisCapability for ScriptedAnalysis {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let latency = self.latency.get(&request.modality).map(|d| *d);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = self.unavailable.get(&request.modality).map(|r| r.clone()) {
            return Err(AnalysisError::Unavailable(reason));
        }
        Ok(self
            .responses
            .get(&request.payload_ref)
            .map(|r| r.clone())
            .unwrap_or_else(|| AnalysisResponse::new(request.modality.as_str(), 5.0, 0.9)))
    }
}

/// Last good analysis response per modality, replayed at reduced
/// confidence while the capability is failing.
#[derive(Debug, Default)]
pub struct DegradedCache {
    last: BTreeMap<Modality, AnalysisResponse>,
}

impl DegradedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, modality: Modality, response: &AnalysisResponse) {
        self.last.insert(modality, response.clone());
    }

    /// The cached response for `modality` with its confidence scaled by `factor`.
    pub fn replay(&self, modality: &Modality, factor: f64) -> Option<AnalysisResponse> {
        self.last.get(modality).map(|cached| {
            let mut response = cached.clone();
            response.confidence = (cached.confidence * factor).clamp(0.0, 1.0);
            response
        })
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigil_types::{IndicatorKind, Modality, RawContent, SessionId, Signal};

use crate::chunk::{AnalysisRequest, AnalysisResponse, CaptureChunk};
use crate::dedupe::DedupeWindow;
use crate::error::IngestError;

/// Counters for one session's ingest boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub chunks_admitted: u64,
    pub duplicates: u64,
    pub signals_accepted: u64,
    pub signals_rejected: u64,
    pub unknown_tags: u64,
}

/// Normalizes one session's capture and analysis traffic into [`Signal`]s.
pub struct SignalNormalizer {
    session_id: SessionId,
    dedupe: DedupeWindow,
    stats: IngestStats,
}

impl SignalNormalizer {
    pub fn new(session_id: SessionId, dedupe_capacity: usize) -> Self {
        Self {
            session_id,
            dedupe: DedupeWindow::new(dedupe_capacity),
            stats: IngestStats::default(),
        }
    }

    /// Admit a capture chunk, rejecting redeliveries.
    pub fn admit(&mut self, chunk: &CaptureChunk) -> Result<(), IngestError> {
        if chunk.session_id != self.session_id {
            return Err(IngestError::ForeignSession);
        }
        if !self.dedupe.insert(chunk.timestamp_ms, &chunk.modality) {
            self.stats.duplicates += 1;
            debug!(
                session_id = %self.session_id,
                modality = %chunk.modality,
                timestamp_ms = chunk.timestamp_ms,
                "Duplicate capture chunk dropped"
            );
            return Err(IngestError::Duplicate {
                modality: chunk.modality.clone(),
                timestamp_ms: chunk.timestamp_ms,
            });
        }
        self.stats.chunks_admitted += 1;
        Ok(())
    }

    /// Validate an analysis response and build the signal for it.
    ///
    /// `content` is the raw chunk the request referenced; it travels with the
    /// signal until the session decides whether it may be kept.
    pub fn normalize(
        &mut self,
        request: &AnalysisRequest,
        response: AnalysisResponse,
        content: Option<RawContent>,
    ) -> Result<Signal, IngestError> {
        match self.validate(request, response) {
            Ok(mut signal) => {
                signal.content = content;
                self.stats.signals_accepted += 1;
                Ok(signal)
            }
            Err(e) => {
                self.stats.signals_rejected += 1;
                warn!(session_id = %self.session_id, error = %e, "Analysis result rejected");
                Err(e)
            }
        }
    }

    fn validate(
        &mut self,
        request: &AnalysisRequest,
        response: AnalysisResponse,
    ) -> Result<Signal, IngestError> {
        if request.session_id != self.session_id {
            return Err(IngestError::ForeignSession);
        }
        if !(0.0..=100.0).contains(&response.score) {
            return Err(IngestError::ScoreOutOfRange(response.score));
        }
        if !(0.0..=1.0).contains(&response.confidence) {
            return Err(IngestError::ConfidenceOutOfRange(response.confidence));
        }
        let reported = Modality::parse(&response.modality);
        if reported != request.modality {
            return Err(IngestError::ModalityMismatch {
                requested: request.modality.clone(),
                reported,
            });
        }

        let mut signal = Signal::new(
            self.session_id,
            reported,
            request.timestamp_ms,
            response.score,
            response.confidence,
        );
        for tag in &response.tags {
            let indicator = IndicatorKind::parse(tag);
            if !indicator.is_known() {
                self.stats.unknown_tags += 1;
                debug!(session_id = %self.session_id, tag = %tag, "Unknown indicator tag");
            }
            signal.indicators.insert(indicator);
        }
        Ok(signal)
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

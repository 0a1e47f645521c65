use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::ContentHash;
use crate::ids::SessionId;

/// Channel an analysis result was derived from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Audio,
    Visual,
    Behavioral,
    /// Anything the scoring engine has no weight for.
    Other(String),
}

impl Modality {
    /// Parse a capability-reported modality label.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "audio" | "voice" | "speech" => Modality::Audio,
            "visual" | "video" | "frame" | "screen" => Modality::Visual,
            "behavioral" | "behavioural" | "interaction" => Modality::Behavioral,
            _ => Modality::Other(label.to_string()),
        }
    }

    pub fn known() -> [Modality; 3] {
        [Modality::Audio, Modality::Visual, Modality::Behavioral]
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Modality::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Modality::Audio => "audio",
            Modality::Visual => "visual",
            Modality::Behavioral => "behavioral",
            Modality::Other(s) => s,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manipulation pattern reported by an analysis capability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorKind {
    /// Caller claims to be police, customs, a regulator or a court.
    AuthorityClaim,
    /// Deadlines, countdowns, "act now or be arrested".
    UrgencyEscalation,
    /// Warrants, ID cards or letters shown on camera.
    ForgedDocument,
    /// Victim told to stay on camera and talk to no one.
    IsolationDemand,
    /// Transfer to a "safe" or "verification" account.
    PaymentDemand,
    /// Explicit threat of arrest or detention.
    ArrestThreat,
    /// Uniforms, insignia or staged police-station backdrops.
    UniformImpersonation,
    /// Unknown tag, carried but never counted for escalation.
    Other(String),
}

impl IndicatorKind {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "authority-claim" => IndicatorKind::AuthorityClaim,
            "urgency-escalation" | "urgency" => IndicatorKind::UrgencyEscalation,
            "forged-document" => IndicatorKind::ForgedDocument,
            "isolation-demand" | "isolation" => IndicatorKind::IsolationDemand,
            "payment-demand" => IndicatorKind::PaymentDemand,
            "arrest-threat" => IndicatorKind::ArrestThreat,
            "uniform-impersonation" => IndicatorKind::UniformImpersonation,
            _ => IndicatorKind::Other(tag.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, IndicatorKind::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            IndicatorKind::AuthorityClaim => "authority-claim",
            IndicatorKind::UrgencyEscalation => "urgency-escalation",
            IndicatorKind::ForgedDocument => "forged-document",
            IndicatorKind::IsolationDemand => "isolation-demand",
            IndicatorKind::PaymentDemand => "payment-demand",
            IndicatorKind::ArrestThreat => "arrest-threat",
            IndicatorKind::UniformImpersonation => "uniform-impersonation",
            IndicatorKind::Other(s) => s,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw captured bytes a signal was derived from (audio chunk, frame,
/// transcript excerpt). Wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct RawContent(#[serde(with = "hex::serde")] Vec<u8>);

impl RawContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::tagged(b"vigil-artifact-v1", &self.0)
    }
}

impl fmt::Debug for RawContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawContent({} bytes)", self.0.len())
    }
}

/// One normalized analysis result.
///
/// Immutable once built. Outside evidence mode the `content` is dropped
/// (and zeroized) as soon as the scoring pass has consumed the signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub session_id: SessionId,
    pub modality: Modality,
    /// Capture time of the underlying chunk or frame.
    pub timestamp_ms: u64,
    /// Score contribution, 0–100.
    pub score: f64,
    /// Capability confidence, 0–1.
    pub confidence: f64,
    pub indicators: BTreeSet<IndicatorKind>,
    /// Replayed from the degraded-analysis cache rather than freshly analyzed.
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<RawContent>,
}

impl Signal {
    pub fn new(
        session_id: SessionId,
        modality: Modality,
        timestamp_ms: u64,
        score: f64,
        confidence: f64,
    ) -> Self {
        Self {
            session_id,
            modality,
            timestamp_ms,
            score,
            confidence,
            indicators: BTreeSet::new(),
            degraded: false,
            content: None,
        }
    }

    pub fn with_indicator(mut self, indicator: IndicatorKind) -> Self {
        self.indicators.insert(indicator);
        self
    }

    pub fn with_content(mut self, bytes: Vec<u8>) -> Self {
        self.content = Some(RawContent::new(bytes));
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Bytes of raw content still attached.
    pub fn raw_len(&self) -> usize {
        self.content.as_ref().map_or(0, RawContent::len)
    }

    /// Detach the raw content, leaving a derived-only signal behind.
    pub fn take_content(&mut self) -> Option<RawContent> {
        self.content.take()
    }
}

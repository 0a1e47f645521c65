use serde::{Deserialize, Serialize};

/// What a session is allowed to retain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivacyMode {
    /// Nothing outlives its scoring pass.
    #[default]
    MemoryOnly,
    /// Derived artifacts (hashes, indicators) are kept, raw content is not.
    EphemeralAnalysis,
    /// Raw artifacts are captured into the evidence chain. Sticky.
    EvidenceCollection,
}

impl PrivacyMode {
    pub fn retains_raw_content(self) -> bool {
        matches!(self, PrivacyMode::EvidenceCollection)
    }

    pub fn retains_derived_artifacts(self) -> bool {
        !matches!(self, PrivacyMode::MemoryOnly)
    }

    /// Rank used to tell upgrades from downgrades.
    pub fn level(self) -> u8 {
        match self {
            PrivacyMode::MemoryOnly => 0,
            PrivacyMode::EphemeralAnalysis => 1,
            PrivacyMode::EvidenceCollection => 2,
        }
    }
}

impl std::fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrivacyMode::MemoryOnly => "memory-only",
            PrivacyMode::EphemeralAnalysis => "ephemeral-analysis",
            PrivacyMode::EvidenceCollection => "evidence-collection",
        };
        f.pad(s)
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Lower-cases and collapses every run of whitespace into a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Names from `required` that do not appear, normalized, inside the extracted text.
pub fn missing_medicines<'a>(
    extracted_text: &str,
    required: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let haystack = normalize_text(extracted_text);
    required
        .into_iter()
        .filter(|name| !haystack.contains(&normalize_text(name)))
        .map(str::to_string)
        .collect()
}

/// Result of automatic verification after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Every required name was found. Holds trivially when nothing is required.
    Verified,
    Unmatched { missing: Vec<String> },
    OcrFailed { reason: String },
}

impl VerificationOutcome {
    pub fn from_extracted_text<'a>(
        extracted_text: &str,
        required: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let missing = missing_medicines(extracted_text, required);
        if missing.is_empty() {
            VerificationOutcome::Verified
        } else {
            VerificationOutcome::Unmatched { missing }
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified)
    }
}

/// The fields of a prescription the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct GateCandidate {
    pub id: i32,
    pub uploaded_at: DateTime<Utc>,
    pub verified: bool,
    pub used: bool,
}

impl GateCandidate {
    pub fn is_usable(&self) -> bool {
        self.verified && !self.used
    }
}

/// Gate decision for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No prescription-only lines; nothing is bound.
    NotRequired,
    Bound(i32),
    Rejected,
}

/// Picks the most recently uploaded verified, unused prescription when any line needs one.
pub fn evaluate_gate(
    needs_prescription: bool,
    candidates: impl IntoIterator<Item = GateCandidate>,
) -> GateDecision {
    if !needs_prescription {
        return GateDecision::NotRequired;
    }

    candidates
        .into_iter()
        .filter(GateCandidate::is_usable)
        .max_by_key(|candidate| (candidate.uploaded_at, candidate.id))
        .map_or(GateDecision::Rejected, |candidate| {
            GateDecision::Bound(candidate.id)
        })
}

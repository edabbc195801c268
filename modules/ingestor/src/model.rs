use serde::{Deserialize, Serialize};
use vulndash_entity::vulnerability::Severity;

/// The validated, normalized output of one extraction run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Present only when it passed the format gate.
    pub cve_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub confidence_score: f64,
    pub needs_review: bool,
    pub metadata: ExtractionMetadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Index of the attempt which produced the output; 0 is the primary.
    pub fallback_attempt: usize,
    pub warnings: Vec<String>,
    /// All configured providers failed; the result came from the regex
    /// fallback extractor.
    pub all_providers_failed: bool,
}

//! Generation Requests and Document Candidates
//!
//! Core data model for one pipeline run: the immutable request sent to the
//! backend, the per-attempt candidate tracked through merge/repair, and the
//! outcome returned to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{network, sampling};

// =============================================================================
// Generation Request
// =============================================================================

/// Immutable request for one generation call.
///
/// Never mutated after construction; retries and continuations build fresh
/// requests with the same sampling parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prompt text sent to the backend
    pub prompt: String,
    /// Target model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling parameter
    pub top_p: f32,
    /// Output token ceiling
    pub max_output_tokens: usize,
    /// Per-call timeout
    pub timeout: Duration,
}

impl GenerationRequest {
    /// Create a request with default sampling parameters
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: sampling::DEFAULT_TEMPERATURE,
            top_p: sampling::DEFAULT_TOP_P,
            max_output_tokens: sampling::DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: Duration::from_secs(network::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Derive a follow-up request reusing this request's sampling parameters
    pub fn follow_up(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }
}

// =============================================================================
// Document Candidate
// =============================================================================

/// Which merge strategy produced a candidate's accepted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Recovered a string literal cut at the end of the first half
    TruncatedLiteral,
    /// Continuation alone was a complete document and replaced the first half
    WholeReplacement,
    /// Spliced at the last cleanly-closed structural boundary
    StructuralSplice,
    /// Spliced at the last complete `"key":` occurrence
    PropertySplice,
    /// No strategy parsed; the longer half was kept as-is
    LongerWins,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedLiteral => write!(f, "truncated-literal"),
            Self::WholeReplacement => write!(f, "whole-replacement"),
            Self::StructuralSplice => write!(f, "structural-splice"),
            Self::PropertySplice => write!(f, "property-splice"),
            Self::LongerWins => write!(f, "longer-wins"),
        }
    }
}

/// One independent attempt at generating the target document.
///
/// Created when the candidate's first response arrives, mutated through the
/// merge/repair stages, and dropped when the run completes.
#[derive(Debug, Clone)]
pub struct DocumentCandidate {
    /// Index of the generation attempt that produced this candidate
    pub attempt_index: usize,
    /// Raw text of the first response
    pub raw_text: String,
    /// Reconstructed text after continuation merge, if one was needed
    pub merged_text: Option<String>,
    /// Structural completeness per the required schema
    pub is_complete: bool,
    /// Whether the effective text parses and passes all checks
    pub is_valid: bool,
    /// Score assigned in the scoring stage (0 until scored)
    pub score: i64,
    /// Merge strategy that produced the accepted text, if any
    pub merge_strategy: Option<MergeStrategy>,
}

impl DocumentCandidate {
    pub fn new(attempt_index: usize, raw_text: impl Into<String>) -> Self {
        Self {
            attempt_index,
            raw_text: raw_text.into(),
            merged_text: None,
            is_complete: false,
            is_valid: false,
            score: 0,
            merge_strategy: None,
        }
    }

    /// The text this candidate currently stands on: merged if present, raw otherwise
    pub fn effective_text(&self) -> &str {
        self.merged_text.as_deref().unwrap_or(&self.raw_text)
    }

    /// Replace the candidate's text after a merge or repair pass
    pub fn accept_text(&mut self, text: impl Into<String>, strategy: Option<MergeStrategy>) {
        self.merged_text = Some(text.into());
        if strategy.is_some() {
            self.merge_strategy = strategy;
        }
    }

    /// Candidates enter scoring only once both flags hold
    pub fn is_scorable(&self) -> bool {
        self.is_complete && self.is_valid
    }
}

// =============================================================================
// Pipeline Outcome
// =============================================================================

/// Final result of one pipeline run, exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Whether a valid document was produced
    pub success: bool,
    /// The winning document's JSON text
    pub document: Option<String>,
    /// Score of the winning candidate (0 when scoring was skipped)
    pub score: i64,
    /// Attempt index of the winning candidate
    pub attempt_index: usize,
    /// Last concrete error or validation reason on failure
    pub error: Option<String>,
}

impl PipelineOutcome {
    pub fn success(document: impl Into<String>, score: i64, attempt_index: usize) -> Self {
        Self {
            success: true,
            document: Some(document.into()),
            score,
            attempt_index,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            document: None,
            score: 0,
            attempt_index: 0,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_follow_up_keeps_sampling() {
        let req = GenerationRequest::new("write the doc", "gen-large")
            .with_temperature(0.2)
            .with_max_output_tokens(2048);

        let cont = req.follow_up("continue exactly where you stopped");
        assert_eq!(cont.prompt, "continue exactly where you stopped");
        assert_eq!(cont.model, "gen-large");
        assert_eq!(cont.temperature, 0.2);
        assert_eq!(cont.max_output_tokens, 2048);
    }

    #[test]
    fn test_candidate_effective_text() {
        let mut candidate = DocumentCandidate::new(0, "{\"a\":");
        assert_eq!(candidate.effective_text(), "{\"a\":");

        candidate.accept_text("{\"a\":1}", Some(MergeStrategy::StructuralSplice));
        assert_eq!(candidate.effective_text(), "{\"a\":1}");
        assert_eq!(candidate.merge_strategy, Some(MergeStrategy::StructuralSplice));
    }

    #[test]
    fn test_candidate_scorable_requires_both_flags() {
        let mut candidate = DocumentCandidate::new(1, "{}");
        assert!(!candidate.is_scorable());

        candidate.is_complete = true;
        assert!(!candidate.is_scorable());

        candidate.is_valid = true;
        assert!(candidate.is_scorable());
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = PipelineOutcome::success("{}", 87, 2);
        assert!(ok.success);
        assert_eq!(ok.score, 87);
        assert_eq!(ok.attempt_index, 2);
        assert!(ok.error.is_none());

        let failed = PipelineOutcome::failure("no valid candidates");
        assert!(!failed.success);
        assert!(failed.document.is_none());
        assert_eq!(failed.error.as_deref(), Some("no valid candidates"));
    }
}

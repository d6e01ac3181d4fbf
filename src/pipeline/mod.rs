//! Candidate Pipeline
//!
//! Orchestrates one best-of-N document run: launch k independent generation
//! candidates concurrently, carry each through continuation, validation, and
//! repair, then score the survivors against each other and return the winner.
//!
//! Stage progression per run:
//! Generating → Completing → Validating → Repairing → Scoring → Done | Failed
//!
//! Candidates that remain invalid after one continuation round and one repair
//! escalation are dropped; their last failure reason is kept for the outcome.

use std::time::Instant;

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::client::GenerationClient;
use crate::config::PipelineConfig;
use crate::constants::pipeline as pl_constants;
use crate::timeout::with_timeout_map;
use crate::types::{
    DocumentCandidate, ErrorKind, GenerationRequest, LoomError, MergeStrategy, PipelineOutcome,
    Result,
};
use crate::validation::{
    CompletenessChecker, ContinuationMerger, DocumentRepairer, RequiredSchema,
};

// =============================================================================
// Stages and Stats
// =============================================================================

/// Pipeline stage, for logs and failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Generating,
    Completing,
    Validating,
    Repairing,
    Scoring,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Completing => write!(f, "completing"),
            Self::Validating => write!(f, "validating"),
            Self::Repairing => write!(f, "repairing"),
            Self::Scoring => write!(f, "scoring"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-candidate record of what one attempt went through
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub attempt_index: usize,
    pub duration_ms: u64,
    pub continuation_rounds: u32,
    pub repair_escalations: u32,
    pub merge_strategy: Option<MergeStrategy>,
    pub used_fallback_model: bool,
    /// Why the candidate was dropped, `None` if it survived to scoring
    pub dropped_reason: Option<String>,
}

impl CandidateReport {
    fn new(attempt_index: usize) -> Self {
        Self {
            attempt_index,
            duration_ms: 0,
            continuation_rounds: 0,
            repair_escalations: 0,
            merge_strategy: None,
            used_fallback_model: false,
            dropped_reason: None,
        }
    }
}

/// Aggregate statistics for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub candidates: Vec<CandidateReport>,
    pub scoring_performed: bool,
    pub duration_ms: u64,
}

impl PipelineStats {
    /// One-line summary for operator logs
    pub fn summary(&self) -> String {
        let survived = self
            .candidates
            .iter()
            .filter(|c| c.dropped_reason.is_none())
            .count();
        format!(
            "{}/{} candidates survived, scoring={}, {}ms",
            survived,
            self.candidates.len(),
            self.scoring_performed,
            self.duration_ms
        )
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Best-of-N generation pipeline over one resilient client
pub struct CandidatePipeline {
    client: GenerationClient,
    checker: CompletenessChecker,
    merger: ContinuationMerger,
    repairer: DocumentRepairer,
    config: PipelineConfig,
    score_pattern: Regex,
}

impl CandidatePipeline {
    pub fn new(
        client: GenerationClient,
        schema: RequiredSchema,
        config: PipelineConfig,
    ) -> Result<Self> {
        let checker = CompletenessChecker::new(schema)?;
        let merger = ContinuationMerger::new(checker.clone());

        Ok(Self {
            client,
            checker,
            merger,
            repairer: DocumentRepairer::new(),
            config,
            // Lenient: matches "Candidate 2: [85]", "candidate #2 - 85", "CANDIDATE 2 85"
            score_pattern: Regex::new(r"(?i)candidate\s*#?\s*(\d+)\s*[:\-]?\s*\[?(\d+)\]?")
                .map_err(|e| LoomError::Config(format!("score pattern: {e}")))?,
        })
    }

    /// Run the pipeline and return the winning document
    pub async fn run(&self, request: &GenerationRequest) -> Result<PipelineOutcome> {
        self.run_with_stats(request).await.map(|(outcome, _)| outcome)
    }

    /// Run the pipeline, also returning per-candidate statistics.
    ///
    /// The run is bounded by the configured deadline; on expiry any
    /// partially-reconstructed candidates are discarded and a failure
    /// outcome is returned.
    pub async fn run_with_stats(
        &self,
        request: &GenerationRequest,
    ) -> Result<(PipelineOutcome, PipelineStats)> {
        let started = Instant::now();
        let budget = self.config.run_deadline();
        let deadline = started + budget;

        info!(
            candidates = self.config.candidates,
            model = %request.model,
            deadline_secs = budget.as_secs(),
            "pipeline run started"
        );

        match with_timeout_map(budget, self.execute(request, deadline), "pipeline run").await {
            Ok((outcome, mut stats)) => {
                stats.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    success = outcome.success,
                    winner = outcome.attempt_index,
                    score = outcome.score,
                    stats = %stats.summary(),
                    "pipeline run finished"
                );
                Ok((outcome, stats))
            }
            Err(LoomError::Timeout { .. }) => {
                warn!(
                    deadline_secs = budget.as_secs(),
                    "pipeline run hit its deadline"
                );
                let stats = PipelineStats {
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..PipelineStats::default()
                };
                Ok((
                    PipelineOutcome::failure(format!(
                        "run deadline of {}s elapsed",
                        budget.as_secs()
                    )),
                    stats,
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        deadline: Instant,
    ) -> (PipelineOutcome, PipelineStats) {
        let results = join_all(
            (0..self.config.candidates).map(|i| self.process_candidate(i, request, deadline)),
        )
        .await;

        let mut stats = PipelineStats::default();
        let mut survivors: Vec<DocumentCandidate> = Vec::new();
        let mut last_drop: Option<String> = None;

        for (candidate, report) in results {
            if let Some(reason) = &report.dropped_reason {
                last_drop = Some(reason.clone());
            }
            stats.candidates.push(report);
            if let Some(candidate) = candidate {
                survivors.push(candidate);
            }
        }

        if survivors.is_empty() {
            let reason =
                last_drop.unwrap_or_else(|| "all candidates dropped without a reason".to_string());
            return (PipelineOutcome::failure(reason), stats);
        }

        // A lone survivor wins unscored
        if survivors.len() == 1 {
            let winner = &survivors[0];
            debug!(
                attempt = winner.attempt_index,
                "single surviving candidate, scoring skipped"
            );
            return (
                PipelineOutcome::success(winner.effective_text(), 0, winner.attempt_index),
                stats,
            );
        }

        stats.scoring_performed = true;
        let outcome = self.score_candidates(request, &mut survivors, deadline).await;
        (outcome, stats)
    }

    // =========================================================================
    // Per-Candidate Processing
    // =========================================================================

    /// Carry one candidate from first response through continuation and
    /// repair. Returns the surviving candidate (or `None`) plus its report.
    async fn process_candidate(
        &self,
        attempt_index: usize,
        request: &GenerationRequest,
        deadline: Instant,
    ) -> (Option<DocumentCandidate>, CandidateReport) {
        let started = Instant::now();
        let mut report = CandidateReport::new(attempt_index);

        debug!(attempt = attempt_index, stage = %PipelineStage::Generating, "candidate started");

        let raw = match self.generate_with_fallback(request, deadline, &mut report).await {
            Ok(text) => text,
            Err(reason) => {
                report.dropped_reason = Some(reason);
                report.duration_ms = started.elapsed().as_millis() as u64;
                return (None, report);
            }
        };

        let mut candidate = DocumentCandidate::new(attempt_index, raw);

        let verdict = self.checker.check(candidate.effective_text());
        if verdict.complete {
            candidate.is_complete = true;
            candidate.is_valid = true;
            report.duration_ms = started.elapsed().as_millis() as u64;
            return (Some(candidate), report);
        }
        let mut reason = verdict
            .reason
            .unwrap_or_else(|| "incomplete document".to_string());

        // Completing: bounded continuation rounds
        for round in 0..pl_constants::MAX_CONTINUATION_ROUNDS {
            debug!(
                attempt = attempt_index,
                round,
                stage = %PipelineStage::Completing,
                reason = %reason,
                "requesting continuation"
            );

            let continuation = request.follow_up(continuation_prompt(candidate.effective_text()));
            match self
                .client
                .call_with_deadline(&continuation, Some(deadline))
                .await
            {
                Ok(second) => {
                    report.continuation_rounds += 1;
                    let merged = self.merger.merge(candidate.effective_text(), &second);
                    debug!(
                        attempt = attempt_index,
                        strategy = %merged.strategy,
                        "continuation merged"
                    );
                    let strategy = merged.strategy;
                    candidate.accept_text(merged.text, Some(strategy));
                    report.merge_strategy = candidate.merge_strategy;
                }
                Err(err) => {
                    reason = err.to_string();
                    break;
                }
            }

            let verdict = self.checker.check(candidate.effective_text());
            if verdict.complete {
                candidate.is_complete = true;
                candidate.is_valid = true;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return (Some(candidate), report);
            }
            reason = verdict
                .reason
                .unwrap_or_else(|| "incomplete after continuation".to_string());
        }

        // Repairing: local fixes, then one bounded service escalation
        debug!(
            attempt = attempt_index,
            stage = %PipelineStage::Repairing,
            reason = %reason,
            "entering repair"
        );

        match self.repairer.repair_local(candidate.effective_text()) {
            Ok(fixed) => {
                let verdict = self.checker.check(&fixed);
                if verdict.complete {
                    candidate.accept_text(fixed, None);
                    candidate.is_complete = true;
                    candidate.is_valid = true;
                    report.duration_ms = started.elapsed().as_millis() as u64;
                    return (Some(candidate), report);
                }
                reason = verdict
                    .reason
                    .unwrap_or_else(|| "incomplete after local repair".to_string());
            }
            Err(err) => {
                reason = err.to_string();
            }
        }

        for _ in 0..pl_constants::MAX_REPAIR_ESCALATIONS {
            match self
                .repairer
                .repair_via_service(
                    &self.client,
                    request,
                    candidate.effective_text(),
                    &reason,
                    Some(deadline),
                )
                .await
            {
                Ok(repaired) => {
                    report.repair_escalations += 1;
                    let verdict = self.checker.check(&repaired);
                    if verdict.complete {
                        candidate.accept_text(repaired, None);
                        candidate.is_complete = true;
                        candidate.is_valid = true;
                        report.duration_ms = started.elapsed().as_millis() as u64;
                        return (Some(candidate), report);
                    }
                    reason = verdict
                        .reason
                        .unwrap_or_else(|| "incomplete after service repair".to_string());
                }
                Err(err) => {
                    reason = err.to_string();
                    break;
                }
            }
        }

        warn!(
            attempt = attempt_index,
            stage = %PipelineStage::Failed,
            reason = %reason,
            "candidate dropped"
        );
        report.dropped_reason = Some(reason);
        report.duration_ms = started.elapsed().as_millis() as u64;
        (None, report)
    }

    /// First generation call for a candidate. A non-retryable failure gets
    /// one substitution with the configured fallback model, when one is set.
    async fn generate_with_fallback(
        &self,
        request: &GenerationRequest,
        deadline: Instant,
        report: &mut CandidateReport,
    ) -> std::result::Result<String, String> {
        match self.client.call_with_deadline(request, Some(deadline)).await {
            Ok(text) => Ok(text),
            Err(err) => {
                let fallback = match &self.config.fallback_model {
                    Some(model) if !err.is_retryable() && err.kind != ErrorKind::CircuitOpen => {
                        model.clone()
                    }
                    _ => return Err(err.to_string()),
                };

                warn!(
                    kind = %err.kind,
                    fallback = %fallback,
                    "primary model rejected the request, substituting fallback model"
                );

                let substituted = GenerationRequest {
                    model: fallback,
                    ..request.clone()
                };
                match self
                    .client
                    .call_with_deadline(&substituted, Some(deadline))
                    .await
                {
                    Ok(text) => {
                        report.used_fallback_model = true;
                        Ok(text)
                    }
                    Err(second_err) => Err(second_err.to_string()),
                }
            }
        }
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Ask the service to score the surviving candidates against each other.
    ///
    /// An unreachable or unparseable scorer never fails the run: the first
    /// survivor wins with score 0.
    async fn score_candidates(
        &self,
        request: &GenerationRequest,
        survivors: &mut [DocumentCandidate],
        deadline: Instant,
    ) -> PipelineOutcome {
        debug!(
            survivors = survivors.len(),
            stage = %PipelineStage::Scoring,
            "scoring candidates"
        );

        let prompt = self.scoring_prompt(survivors);
        let scoring = request.follow_up(prompt);

        let response = match self.client.call_with_deadline(&scoring, Some(deadline)).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "scoring call failed, defaulting to first survivor");
                let winner = &survivors[0];
                return PipelineOutcome::success(winner.effective_text(), 0, winner.attempt_index);
            }
        };

        let scores = self.parse_scores(&response, survivors.len());
        if scores.iter().all(Option::is_none) {
            warn!("no scores parsed from scoring response, defaulting to first survivor");
            let winner = &survivors[0];
            return PipelineOutcome::success(winner.effective_text(), 0, winner.attempt_index);
        }

        for (candidate, score) in survivors.iter_mut().zip(&scores) {
            candidate.score = score.unwrap_or(0);
        }

        // Highest score wins; ties break toward the earlier attempt
        let winner = survivors
            .iter()
            .max_by(|a, b| a.score.cmp(&b.score).then(b.attempt_index.cmp(&a.attempt_index)))
            .unwrap_or(&survivors[0]);

        PipelineOutcome::success(winner.effective_text(), winner.score, winner.attempt_index)
    }

    fn scoring_prompt(&self, survivors: &[DocumentCandidate]) -> String {
        let criteria = self.config.scoring_criteria.join(", ");
        let mut prompt = format!(
            "You are comparing {} candidate JSON documents produced for the same \
             task. Score each candidate from 0 to 100 on: {}.\n\nRespond with one \
             line per candidate, exactly in the form:\nCandidate N: [score]\n",
            survivors.len(),
            criteria
        );
        for (position, candidate) in survivors.iter().enumerate() {
            prompt.push_str(&format!(
                "\nCandidate {}:\n{}\n",
                position + 1,
                candidate.effective_text()
            ));
        }
        prompt
    }

    /// Extract per-candidate scores from free-form scorer output.
    ///
    /// Positions are 1-based in the response; out-of-range candidate numbers
    /// are ignored. Returns one slot per survivor, `None` where no line
    /// matched.
    fn parse_scores(&self, response: &str, count: usize) -> Vec<Option<i64>> {
        let mut scores = vec![None; count];
        for caps in self.score_pattern.captures_iter(response) {
            let position: usize = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let score: i64 = match caps[2].parse() {
                Ok(s) => s,
                Err(_) => continue,
            };
            if position >= 1 && position <= count {
                scores[position - 1] = Some(score);
            }
        }
        scores
    }
}

fn continuation_prompt(partial: &str) -> String {
    // Only the tail is echoed back: enough context to resume, cheap to send
    const TAIL_CHARS: usize = 500;
    let tail_start = partial
        .char_indices()
        .rev()
        .nth(TAIL_CHARS.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    format!(
        "Your previous response was cut off mid-document. It ended with:\n\
         ...{}\n\nContinue EXACTLY from the character where it stopped. Do not \
         repeat any earlier content, do not add commentary, and do not restart \
         the document.",
        &partial[tail_start..]
    )
}

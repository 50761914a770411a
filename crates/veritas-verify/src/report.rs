//! Verification verdicts

use crate::error::Error;
use crate::linker::ProvenanceGraph;
use crate::signature::VerifiedIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final decision of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    Accepted,
    Rejected,
}

/// Progress of a policy step through verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepState {
    Pending,
    Matching,
    TrustChecked,
    TypesChecked,
    Linked,
    Accepted,
    Rejected,
}

/// A failure attributed to a step, or to the whole run when `step` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub error: Error,
}

impl Reason {
    /// A reason for a named step
    pub fn for_step(step: impl Into<String>, error: Error) -> Self {
        Self {
            step: Some(step.into()),
            error,
        }
    }

    /// A reason for the whole run
    pub fn for_run(error: Error) -> Self {
        Self { step: None, error }
    }
}

/// Result of evaluating one candidate collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum CandidateOutcome {
    /// Trusted signer, allowed functionary and every required type present
    #[serde(rename_all = "camelCase")]
    Accepted {
        identity: VerifiedIdentity,
        #[serde(skip_serializing_if = "Option::is_none")]
        signed_time: Option<DateTime<Utc>>,
    },
    /// Rejected after reaching `stage`
    Rejected { stage: StepState, errors: Vec<Error> },
}

impl CandidateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CandidateOutcome::Accepted { .. })
    }

    /// Errors of a rejected outcome
    pub fn errors(&self) -> &[Error] {
        match self {
            CandidateOutcome::Accepted { .. } => &[],
            CandidateOutcome::Rejected { errors, .. } => errors,
        }
    }
}

/// One candidate collection, identified by the sha256 of its envelope bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
    pub digest: String,
    pub outcome: CandidateOutcome,
}

/// Outcome of one policy step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub state: StepState,
    /// Candidates in envelope digest order
    pub candidates: Vec<CandidateReport>,
}

impl StepReport {
    /// The first accepted candidate, if any
    pub fn accepted_candidate(&self) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.outcome.is_accepted())
    }
}

/// An input envelope that was not evaluated against any step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEnvelope {
    pub digest: String,
    pub reason: String,
}

/// Result of a verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub decision: Decision,
    /// Step reasons in policy order, followed by run-level reasons
    pub reasons: Vec<Reason>,
    /// Step reports in policy order
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<ProvenanceGraph>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEnvelope>,
}

impl Verdict {
    /// Verdict of a cancelled run
    pub fn incomplete() -> Self {
        Self::aborted(Error::Incomplete)
    }

    /// Verdict of a run aborted before any step result could be trusted
    pub fn aborted(error: Error) -> Self {
        Self {
            decision: Decision::Rejected,
            reasons: vec![Reason::for_run(error)],
            steps: Vec::new(),
            graph: None,
            skipped: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accepted
    }

    /// Errors in reason order
    pub fn errors(&self) -> Vec<&Error> {
        self.reasons.iter().map(|r| &r.error).collect()
    }

    /// Report for a named step
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Render the verdict as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

//! Verification orchestrator
//!
//! Drives a run end to end: verify the policy envelope, decode and group
//! candidate collections by step, evaluate every candidate on a bounded
//! worker pool, then link the accepted steps and bind the artifact.
//!
//! Candidate results are collected into a step-indexed table before any
//! decision is made, so the verdict does not depend on completion order.

use crate::config::VerifierConfig;
use crate::error::Error;
use crate::linker::{link, locate_artifact, AcceptedCollections};
use crate::matcher::{is_functionary, missing_attestation_types};
use crate::policy::{verify_policy, VerifiedPolicy};
use crate::report::{
    CandidateOutcome, CandidateReport, Decision, Reason, SkippedEnvelope, StepReport, StepState,
    Verdict,
};
use crate::signature::{establish_trust, TrustedSignature};
use crate::source::EnvelopeSource;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use veritas_crypto::sha256;
use veritas_trust_root::TrustStore;
use veritas_types::{pae, Collection, DigestSet, Envelope, StepRule, TimestampQuorum};

/// Callback invoked as each step's candidates finish evaluating
pub type StepObserver = Arc<dyn Fn(&StepReport) + Send + Sync>;

/// Inputs to a verification run
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    /// The signed policy envelope
    pub policy_envelope: Vec<u8>,
    /// Attestation collection envelopes, in any order
    pub envelopes: Vec<Vec<u8>>,
    /// Artifact that must be a product of an accepted step
    pub artifact: Option<DigestSet>,
}

impl VerificationRequest {
    pub fn new(policy_envelope: Vec<u8>) -> Self {
        Self {
            policy_envelope,
            ..Default::default()
        }
    }

    pub fn with_envelope(mut self, envelope: Vec<u8>) -> Self {
        self.envelopes.push(envelope);
        self
    }

    pub fn with_envelopes(mut self, envelopes: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.envelopes.extend(envelopes);
        self
    }

    pub fn with_artifact(mut self, artifact: DigestSet) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// A decoded collection waiting to be evaluated
#[derive(Debug)]
struct Candidate {
    digest: String,
    envelope: Envelope,
    message: Vec<u8>,
    collection: Collection,
}

/// Verifies attestation envelopes against a signed policy
pub struct Verifier {
    pinned: Arc<TrustStore>,
    config: VerifierConfig,
    observer: Option<StepObserver>,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Verifier {
    /// Create a verifier trusting `pinned` anchors for the policy envelope
    pub fn new(pinned: TrustStore, config: VerifierConfig) -> Self {
        Self {
            pinned: Arc::new(pinned),
            config,
            observer: None,
        }
    }

    /// Report each step as its evaluation completes
    pub fn with_observer(mut self, observer: impl Fn(&StepReport) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run a verification.
    ///
    /// Cancelling `cancel`, or exceeding the configured timeout, yields a
    /// rejected verdict whose only reason is [`Error::Incomplete`].
    pub async fn verify(&self, request: &VerificationRequest, cancel: &CancellationToken) -> Verdict {
        if cancel.is_cancelled() {
            return Verdict::incomplete();
        }

        let run = self.run(request, cancel);
        let verdict = match self.config.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(verdict) => verdict,
                Err(_) => {
                    tracing::warn!("Verification timed out after {:?}", timeout);
                    Verdict::incomplete()
                }
            },
            None => run.await,
        };

        tracing::info!(
            "Verification {:?} with {} reason(s)",
            verdict.decision,
            verdict.reasons.len()
        );
        verdict
    }

    /// Collect envelopes from `source` by walking back from `artifact`
    /// through material digests, then verify them.
    pub async fn verify_from_source(
        &self,
        source: &dyn EnvelopeSource,
        policy_envelope: Vec<u8>,
        artifact: DigestSet,
        cancel: &CancellationToken,
    ) -> Verdict {
        let mut envelopes = Vec::new();
        let mut seen_envelopes = HashSet::new();
        let mut seen_digests = BTreeSet::new();
        let mut frontier = VecDeque::from([artifact.clone()]);
        seen_digests.insert(artifact.clone());

        for round in 0..self.config.max_search_depth {
            if frontier.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                return Verdict::incomplete();
            }
            tracing::debug!("Source lookup round {} for {} digest(s)", round, frontier.len());

            let mut next = VecDeque::new();
            while let Some(digest) = frontier.pop_front() {
                let found = match source.envelopes_for(&digest).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!("Envelope lookup for {} failed: {}", digest, e);
                        continue;
                    }
                };
                for bytes in found {
                    if !seen_envelopes.insert(sha256(&bytes)) {
                        continue;
                    }
                    for material in material_digests(&bytes, &self.config) {
                        if seen_digests.insert(material.clone()) {
                            next.push_back(material);
                        }
                    }
                    envelopes.push(bytes);
                }
            }
            frontier = next;
        }

        let request = VerificationRequest::new(policy_envelope)
            .with_envelopes(envelopes)
            .with_artifact(artifact);
        self.verify(&request, cancel).await
    }

    /// Run a verification on a fresh multi-threaded runtime
    pub fn verify_blocking(&self, request: &VerificationRequest) -> std::io::Result<Verdict> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.verify(request, &CancellationToken::new())))
    }

    async fn run(&self, request: &VerificationRequest, cancel: &CancellationToken) -> Verdict {
        let verified = match verify_policy(&request.policy_envelope, &self.pinned, &self.config) {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!("Aborting run: {}", e);
                return Verdict::aborted(e);
            }
        };
        let VerifiedPolicy {
            policy,
            trust_store,
            ..
        } = verified;

        let now = self.config.now();
        if policy.is_expired(now) {
            tracing::warn!("Policy expired at {}", policy.expires);
            let error = Error::PolicyExpired {
                expires: policy.expires,
                now,
            };
            return Verdict {
                decision: Decision::Rejected,
                reasons: policy
                    .step_names()
                    .map(|name| Reason::for_step(name, error.clone()))
                    .collect(),
                steps: policy
                    .step_names()
                    .map(|name| StepReport {
                        name: name.to_string(),
                        state: StepState::Rejected,
                        candidates: Vec::new(),
                    })
                    .collect(),
                graph: None,
                skipped: Vec::new(),
            };
        }

        let step_names: Vec<String> = policy.step_names().map(str::to_string).collect();
        let (grouped, skipped) = decode_candidates(&request.envelopes, &policy, &self.config);

        let mut table: Vec<Vec<Option<CandidateOutcome>>> = step_names
            .iter()
            .map(|name| grouped.get(name).map_or(0, Vec::len))
            .map(|n| vec![None; n])
            .collect();
        let mut pending: Vec<usize> = table.iter().map(Vec::len).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.workers()));
        let mut join_set = JoinSet::new();
        let quorum = policy.timestamp_quorum;

        for (step_index, name) in step_names.iter().enumerate() {
            let Some(rule) = policy.steps.get(name) else {
                continue;
            };
            let rule = Arc::new(rule.clone());
            for (candidate_index, candidate) in grouped.get(name).into_iter().flatten().enumerate() {
                let candidate = Arc::clone(candidate);
                let rule = Arc::clone(&rule);
                let store = Arc::clone(&trust_store);
                let semaphore = Arc::clone(&semaphore);
                join_set.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (step_index, candidate_index, None);
                    };
                    let outcome = tokio::task::spawn_blocking(move || {
                        evaluate_candidate(&candidate, &rule, &store, quorum)
                    })
                    .await
                    .ok();
                    (step_index, candidate_index, outcome)
                });
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Verification cancelled with {} task(s) outstanding", join_set.len());
                    join_set.abort_all();
                    return Verdict::incomplete();
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let Ok((step_index, candidate_index, Some(outcome))) = joined else {
                        tracing::warn!("Candidate evaluation did not complete");
                        join_set.abort_all();
                        return Verdict::incomplete();
                    };
                    table[step_index][candidate_index] = Some(outcome);
                    pending[step_index] -= 1;
                    if pending[step_index] == 0 {
                        let report = step_report(
                            &step_names[step_index],
                            &grouped,
                            &table[step_index],
                        );
                        if let Some(observer) = &self.observer {
                            observer(&report);
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Verdict::incomplete();
        }

        let mut steps: Vec<StepReport> = step_names
            .iter()
            .zip(&table)
            .map(|(name, outcomes)| step_report(name, &grouped, outcomes))
            .collect();
        let mut step_reasons: BTreeMap<String, Vec<Error>> = BTreeMap::new();
        for step in &steps {
            if step.state == StepState::Rejected {
                step_reasons.insert(step.name.clone(), step_errors(step));
            }
        }

        let mut run_reasons = Vec::new();
        let mut graph = None;

        if step_reasons.is_empty() {
            let accepted = accepted_collections(&steps, &grouped);
            match link(&policy, &accepted) {
                Ok(chain) => {
                    for step in &mut steps {
                        step.state = StepState::Linked;
                    }
                    if let Some(artifact) = &request.artifact {
                        match locate_artifact(&chain.linked, artifact) {
                            Some((step, subject)) => tracing::debug!(
                                "Artifact {} is product {} of step {}",
                                artifact,
                                subject.name,
                                step
                            ),
                            None => run_reasons
                                .push(Reason::for_run(Error::ArtifactNotFound(artifact.to_string()))),
                        }
                    }
                    if run_reasons.is_empty() {
                        for step in &mut steps {
                            step.state = StepState::Accepted;
                        }
                    }
                    graph = Some(chain.graph);
                }
                Err(errors) => {
                    for error in errors {
                        let step = match &error {
                            Error::BrokenChain { step, .. } => step.clone(),
                            _ => String::new(),
                        };
                        step_reasons.entry(step).or_default().push(error);
                    }
                    for step in &mut steps {
                        step.state = if step_reasons.contains_key(&step.name) {
                            StepState::Rejected
                        } else {
                            StepState::Linked
                        };
                    }
                }
            }
        }

        let mut reasons: Vec<Reason> = Vec::new();
        for name in &step_names {
            if let Some(errors) = step_reasons.remove(name) {
                reasons.extend(errors.into_iter().map(|e| Reason::for_step(name.clone(), e)));
            }
        }
        for (_, errors) in step_reasons {
            reasons.extend(errors.into_iter().map(Reason::for_run));
        }
        reasons.extend(run_reasons);

        let decision = if reasons.is_empty() {
            Decision::Accepted
        } else {
            Decision::Rejected
        };

        Verdict {
            decision,
            reasons,
            steps,
            graph,
            skipped,
        }
    }
}

type GroupedCandidates = BTreeMap<String, Vec<Arc<Candidate>>>;

/// Decode envelopes, drop duplicates and group collections by step
fn decode_candidates(
    envelopes: &[Vec<u8>],
    policy: &veritas_types::Policy,
    config: &VerifierConfig,
) -> (GroupedCandidates, Vec<SkippedEnvelope>) {
    let mut grouped: GroupedCandidates = BTreeMap::new();
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();

    for bytes in envelopes {
        let digest = hex::encode(sha256(bytes));
        if !seen.insert(digest.clone()) {
            tracing::debug!("Ignoring duplicate envelope {}", digest);
            continue;
        }

        match decode_candidate(bytes, digest.clone(), config) {
            Ok(candidate) => {
                if policy.steps.contains_key(&candidate.collection.name) {
                    grouped
                        .entry(candidate.collection.name.clone())
                        .or_default()
                        .push(Arc::new(candidate));
                } else {
                    tracing::debug!(
                        "Envelope {} attests to step {} outside the policy",
                        digest,
                        candidate.collection.name
                    );
                    skipped.push(SkippedEnvelope {
                        digest,
                        reason: format!("no policy step named {}", candidate.collection.name),
                    });
                }
            }
            Err(e) => {
                tracing::debug!("Skipping envelope {}: {}", digest, e);
                skipped.push(SkippedEnvelope {
                    digest,
                    reason: e.to_string(),
                });
            }
        }
    }

    for candidates in grouped.values_mut() {
        candidates.sort_by(|a, b| a.digest.cmp(&b.digest));
    }
    skipped.sort_by(|a, b| a.digest.cmp(&b.digest));

    (grouped, skipped)
}

fn decode_candidate(
    bytes: &[u8],
    digest: String,
    config: &VerifierConfig,
) -> Result<Candidate, veritas_types::Error> {
    let envelope = Envelope::decode_with_options(bytes, &config.envelope_limits)?;
    let payload = envelope.payload_bytes()?;
    let collection = Collection::from_payload(&envelope.payload_type, &payload)?;
    let message = pae(&envelope.payload_type, &payload);
    Ok(Candidate {
        digest,
        envelope,
        message,
        collection,
    })
}

/// Material digests of a collection envelope, for source walks
fn material_digests(bytes: &[u8], config: &VerifierConfig) -> Vec<DigestSet> {
    match decode_candidate(bytes, String::new(), config) {
        Ok(candidate) => candidate
            .collection
            .materials()
            .map(|m| m.digest.clone())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Evaluate one candidate: trust, then functionary and attestation types
fn evaluate_candidate(
    candidate: &Candidate,
    rule: &StepRule,
    store: &TrustStore,
    quorum: TimestampQuorum,
) -> CandidateOutcome {
    let mut trust_errors = Vec::new();
    let mut trusted: Vec<TrustedSignature> = Vec::new();

    for signature in &candidate.envelope.signatures {
        match establish_trust(&candidate.message, signature, store, quorum) {
            Ok(t) => trusted.push(t),
            Err(e) => {
                if !trust_errors.contains(&e) {
                    trust_errors.push(e);
                }
            }
        }
    }

    if trusted.is_empty() {
        tracing::debug!(
            "Candidate {} for {} has no trusted signature",
            candidate.digest,
            candidate.collection.name
        );
        return CandidateOutcome::Rejected {
            stage: StepState::Matching,
            errors: trust_errors,
        };
    }

    let mut errors = Vec::new();
    let signer = trusted
        .iter()
        .find(|t| is_functionary(rule, &t.identity))
        .cloned();
    if signer.is_none() {
        let identities: Vec<String> = trusted.iter().map(|t| t.identity.to_string()).collect();
        errors.push(Error::FunctionaryMismatch(identities.join(", ")));
    }
    errors.extend(
        missing_attestation_types(rule, &candidate.collection)
            .into_iter()
            .map(Error::MissingAttestationType),
    );

    match signer {
        Some(signer) if errors.is_empty() => CandidateOutcome::Accepted {
            identity: signer.identity,
            signed_time: signer.signed_time,
        },
        _ => CandidateOutcome::Rejected {
            stage: StepState::TrustChecked,
            errors,
        },
    }
}

fn step_report(
    name: &str,
    grouped: &GroupedCandidates,
    outcomes: &[Option<CandidateOutcome>],
) -> StepReport {
    let candidates: Vec<CandidateReport> = grouped
        .get(name)
        .into_iter()
        .flatten()
        .zip(outcomes)
        .filter_map(|(candidate, outcome)| {
            outcome.as_ref().map(|outcome| CandidateReport {
                digest: candidate.digest.clone(),
                outcome: outcome.clone(),
            })
        })
        .collect();

    let state = if candidates.iter().any(|c| c.outcome.is_accepted()) {
        StepState::TypesChecked
    } else {
        StepState::Rejected
    };

    StepReport {
        name: name.to_string(),
        state,
        candidates,
    }
}

/// Errors explaining a rejected step, in candidate order
fn step_errors(step: &StepReport) -> Vec<Error> {
    if step.candidates.is_empty() {
        return vec![Error::MissingStep(step.name.clone())];
    }
    let mut errors = Vec::new();
    for candidate in &step.candidates {
        for error in candidate.outcome.errors() {
            if !errors.contains(error) {
                errors.push(error.clone());
            }
        }
    }
    errors
}

fn accepted_collections(steps: &[StepReport], grouped: &GroupedCandidates) -> AcceptedCollections {
    let mut accepted = AcceptedCollections::new();
    for step in steps {
        let collections = grouped
            .get(&step.name)
            .into_iter()
            .flatten()
            .zip(&step.candidates)
            .filter(|(_, report)| report.outcome.is_accepted())
            .map(|(candidate, _)| candidate.collection.clone())
            .collect();
        accepted.insert(step.name.clone(), collections);
    }
    accepted
}

//! Provenance linking across steps
//!
//! Every material of a non-root step must be found, by digest, among the
//! products of one of its upstream steps. The resulting edges form the
//! provenance graph, which must be acyclic.

use crate::error::Error;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use veritas_types::{Collection, DigestSet, Policy, StepRule, Subject};

/// Accepted collections per step, each list in a stable order
pub type AcceptedCollections = BTreeMap<String, Vec<Collection>>;

/// A material of `to` resolved to a product of `from`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ProvenanceEdge {
    /// Upstream step that produced the subject
    pub from: String,
    /// Downstream step that consumed it
    pub to: String,
    /// Material subject name in the downstream step
    pub subject: String,
    /// Material digest
    pub digest: String,
}

/// Steps and the product-to-material edges between them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceGraph {
    /// Step names in policy order
    pub nodes: Vec<String>,
    /// Sorted, deduplicated edges
    pub edges: Vec<ProvenanceEdge>,
}

impl ProvenanceGraph {
    /// Steps with an edge into `step`
    pub fn predecessors(&self, step: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == step)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// Steps in dependency order, or `None` if the graph has a cycle
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in &self.edges {
            if successors
                .entry(edge.from.as_str())
                .or_default()
                .insert(edge.to.as_str())
            {
                *in_degree.entry(edge.to.as_str()).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for next in successors.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        (order.len() == in_degree.len()).then_some(order)
    }
}

/// Outcome of a successful link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedChain {
    pub graph: ProvenanceGraph,
    /// Accepted collections that trace back to a root step, per step
    pub linked: AcceptedCollections,
}

/// Link the accepted collections of every policy step.
///
/// Collections of root steps are linked by definition. A collection of a
/// non-root step is linked once every material resolves to a product of a
/// linked upstream collection, so products of collections that never link
/// cannot satisfy anything downstream. A step links when at least one of
/// its collections does. All broken steps are reported.
pub fn link(
    policy: &Policy,
    accepted: &AcceptedCollections,
) -> std::result::Result<LinkedChain, Vec<Error>> {
    let mut flags: BTreeMap<&str, Vec<bool>> = policy
        .steps
        .iter()
        .map(|(step, rule)| {
            let count = accepted.get(step).map_or(0, Vec::len);
            (step.as_str(), vec![rule.root; count])
        })
        .collect();

    // Grow the linked set until no further collection resolves
    loop {
        let mut changed = false;
        for (step, rule) in &policy.steps {
            if rule.root {
                continue;
            }
            for (index, collection) in candidates(accepted, step).iter().enumerate() {
                if is_linked(&flags, step, index) {
                    continue;
                }
                let linked = LinkedView { accepted, flags: &flags };
                if link_collection(policy, step, rule, collection, &linked).is_ok() {
                    if let Some(slot) = flags.get_mut(step.as_str()).and_then(|f| f.get_mut(index)) {
                        *slot = true;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    let view = LinkedView {
        accepted,
        flags: &flags,
    };
    let mut graph = ProvenanceGraph {
        nodes: policy.step_names().map(str::to_string).collect(),
        edges: Vec::new(),
    };
    let mut errors = Vec::new();

    for (step, rule) in &policy.steps {
        if rule.root {
            tracing::debug!("Step {} is a root step, skipping material linkage", step);
            continue;
        }

        let mut first_failure = None;
        let mut any_linked = false;
        for (index, collection) in candidates(accepted, step).iter().enumerate() {
            match link_collection(policy, step, rule, collection, &view) {
                Ok(edges) if is_linked(&flags, step, index) => {
                    graph.edges.extend(edges);
                    any_linked = true;
                }
                Ok(_) => {}
                Err(detail) => {
                    first_failure.get_or_insert(detail);
                }
            }
        }

        if !any_linked {
            let detail = first_failure.unwrap_or_else(|| "no accepted collection".to_string());
            tracing::warn!("Step {} does not link: {}", step, detail);
            errors.push(Error::BrokenChain {
                step: step.clone(),
                detail,
            });
        }
    }

    graph.edges.sort();
    graph.edges.dedup();

    if errors.is_empty() && graph.topological_order().is_none() {
        let cyclic = graph
            .nodes
            .iter()
            .find(|n| !graph.predecessors(n).is_empty())
            .cloned()
            .unwrap_or_default();
        errors.push(Error::BrokenChain {
            step: cyclic,
            detail: "provenance graph contains a cycle".to_string(),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let linked = accepted
        .iter()
        .map(|(step, collections)| {
            let kept = collections
                .iter()
                .enumerate()
                .filter(|(index, _)| is_linked(&flags, step, *index))
                .map(|(_, c)| c.clone())
                .collect();
            (step.clone(), kept)
        })
        .collect();

    Ok(LinkedChain { graph, linked })
}

/// Accepted collections restricted to those currently marked linked
struct LinkedView<'a> {
    accepted: &'a AcceptedCollections,
    flags: &'a BTreeMap<&'a str, Vec<bool>>,
}

impl LinkedView<'_> {
    /// Whether a linked collection of `step` has a product matching `digest`
    fn produces(&self, step: &str, digest: &DigestSet) -> bool {
        candidates(self.accepted, step)
            .iter()
            .enumerate()
            .filter(|(index, _)| is_linked(self.flags, step, *index))
            .flat_map(|(_, c)| c.products())
            .any(|p| p.digest.matches(digest))
    }
}

fn candidates<'a>(accepted: &'a AcceptedCollections, step: &str) -> &'a [Collection] {
    accepted.get(step).map(Vec::as_slice).unwrap_or_default()
}

fn is_linked(flags: &BTreeMap<&str, Vec<bool>>, step: &str, index: usize) -> bool {
    flags
        .get(step)
        .and_then(|f| f.get(index))
        .copied()
        .unwrap_or(false)
}

fn link_collection(
    policy: &Policy,
    step: &str,
    rule: &StepRule,
    collection: &Collection,
    linked: &LinkedView<'_>,
) -> std::result::Result<Vec<ProvenanceEdge>, String> {
    let materials: Vec<&Subject> = collection.materials().collect();
    if materials.is_empty() {
        return Err("non-root step declares no materials".to_string());
    }

    let upstream: Vec<&str> = if rule.artifacts_from.is_empty() {
        policy.step_names().filter(|s| *s != step).collect()
    } else {
        rule.artifacts_from.iter().map(String::as_str).collect()
    };

    let mut edges = Vec::new();
    for material in materials {
        let producers: Vec<&str> = upstream
            .iter()
            .copied()
            .filter(|up| linked.produces(up, &material.digest))
            .collect();

        if producers.is_empty() {
            let unlinked: Vec<&str> = upstream
                .iter()
                .copied()
                .filter(|up| {
                    products_of(linked.accepted, up).any(|p| p.digest.matches(&material.digest))
                })
                .collect();
            return Err(if unlinked.is_empty() {
                format!(
                    "material {} ({}) matches no upstream product",
                    material.name, material.digest
                )
            } else {
                format!(
                    "material {} ({}) matches only unlinked products of {}",
                    material.name,
                    material.digest,
                    unlinked.join(", ")
                )
            });
        }

        edges.extend(producers.into_iter().map(|from| ProvenanceEdge {
            from: from.to_string(),
            to: step.to_string(),
            subject: material.name.clone(),
            digest: material.digest.to_string(),
        }));
    }

    Ok(edges)
}

/// Products across the given collections of `step`
pub fn products_of<'a>(
    collections: &'a AcceptedCollections,
    step: &str,
) -> impl Iterator<Item = &'a Subject> + 'a {
    collections
        .get(step)
        .into_iter()
        .flatten()
        .flat_map(|c| c.products())
}

/// Find the step whose collections include `artifact` as a product.
///
/// Pass [`LinkedChain::linked`] so that only collections grounded in a
/// root step can vouch for the artifact.
pub fn locate_artifact<'a>(
    collections: &'a AcceptedCollections,
    artifact: &DigestSet,
) -> Option<(&'a str, &'a Subject)> {
    collections.iter().find_map(|(step, collections)| {
        collections
            .iter()
            .flat_map(|c| c.products())
            .find(|p| p.digest.matches(artifact))
            .map(|p| (step.as_str(), p))
    })
}

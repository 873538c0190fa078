//! Embeddable visualization candidates derived from one response payload.

use serde::Serialize;

use crate::response::{SubjectId, SupersetChartResponse, VizCandidate, non_empty};

/// Ordered candidates for a response: the explicit list when it is non-empty,
/// otherwise one candidate synthesized from the legacy single-chart fields,
/// otherwise nothing.
#[must_use]
pub fn resolve_candidates(response: &SupersetChartResponse) -> Vec<VizCandidate> {
    if let Some(candidates) = response
        .viz_type_candidates
        .as_ref()
        .filter(|candidates| !candidates.is_empty())
    {
        return candidates.iter().flatten().cloned().collect();
    }

    let has_legacy_identity = non_empty(response.embedded_id.as_deref()).is_some()
        || non_empty(response.superset_domain.as_deref()).is_some()
        || response.chart_id.is_some();
    if !has_legacy_identity {
        return Vec::new();
    }

    vec![VizCandidate {
        viz_type: response.viz_type.clone().unwrap_or_default(),
        viz_name: response.viz_type.clone(),
        chart_id: response.chart_id,
        chart_uuid: response.chart_uuid.clone(),
        embedded_id: response.embedded_id.clone(),
        superset_domain: response.superset_domain.clone(),
        guest_token: response.guest_token.clone(),
    }]
}

#[must_use]
pub fn candidate_label(candidate: &VizCandidate, index: usize) -> String {
    non_empty(candidate.viz_name.as_deref())
        .or_else(|| non_empty(Some(candidate.viz_type.as_str())))
        .map_or_else(|| format!("Candidate {}", index + 1), ToString::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateOption {
    pub label: String,
    pub value: usize,
}

#[must_use]
pub fn candidate_options(candidates: &[VizCandidate]) -> Vec<CandidateOption> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| CandidateOption {
            label: candidate_label(candidate, index),
            value: index,
        })
        .collect()
}

/// Selected candidate index, kept inside `0..max(1, len)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSelection {
    subject: Option<SubjectId>,
    index: usize,
    len: usize,
}

impl CandidateSelection {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Aligns the selection with a new subject and candidate count. A new
    /// subject always starts at 0; a selection that fell off the end of a
    /// shrunken list also returns to 0. Returns whether the index moved.
    pub fn sync(&mut self, subject: &SubjectId, len: usize) -> bool {
        let previous = self.index;
        if self.subject.as_ref() != Some(subject) {
            self.subject = Some(subject.clone());
            self.index = 0;
        } else if self.index >= len {
            self.index = 0;
        }
        self.len = len;
        previous != self.index
    }

    /// Selects a candidate; out-of-range requests clamp to the last candidate.
    pub fn select(&mut self, index: usize) -> bool {
        let clamped = index.min(self.len.max(1) - 1);
        if clamped == self.index {
            return false;
        }
        self.index = clamped;
        true
    }

    #[must_use]
    pub fn active<'a>(&self, candidates: &'a [VizCandidate]) -> Option<&'a VizCandidate> {
        if candidates.is_empty() {
            return None;
        }
        candidates.get(self.index.min(candidates.len() - 1))
    }
}

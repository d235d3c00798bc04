// Topic data model: per-batch candidates and run-wide topics.
//
// A candidate lives for one clustering pass over one day's reviews. A Topic
// lives for the whole run: it is created the first time a candidate matches
// nothing, grows every time a later candidate merges into it, and is never
// deleted before the run ends.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

/// A review with its embedding attached. Output of the embedding stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    pub review_id: String,
    pub date: NaiveDate,
    pub tokens: Vec<String>,
    pub embedding: Vec<f64>,
}

/// Run-stable topic identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TopicId(pub u32);

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a topic is a real discovered theme or the catch-all bucket for
/// reviews whose clusters were too small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Named,
    Miscellaneous,
}

/// Label shown for the catch-all bucket.
pub const MISCELLANEOUS_LABEL: &str = "Miscellaneous";

/// A scored key phrase of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyword {
    pub phrase: String,
    pub score: f64,
    /// How many of the cluster's reviews contain the phrase
    pub doc_freq: usize,
}

/// A batch-local cluster, before cross-batch consolidation.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicCandidate {
    pub candidate_id: usize,
    pub kind: TopicKind,
    /// Member review ids, sorted
    pub member_ids: Vec<String>,
    /// Mean of the member embeddings
    pub centroid: Vec<f64>,
    /// Best first; the first keyword is the candidate's label
    pub keywords: Vec<Keyword>,
}

impl TopicCandidate {
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }

    pub fn label(&self) -> &str {
        match self.kind {
            TopicKind::Miscellaneous => MISCELLANEOUS_LABEL,
            TopicKind::Named => self
                .keywords
                .first()
                .map(|k| k.phrase.as_str())
                .unwrap_or(MISCELLANEOUS_LABEL),
        }
    }
}

/// A run-wide topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topic {
    pub id: TopicId,
    pub kind: TopicKind,
    pub label: String,
    #[serde(skip)]
    pub centroid: Vec<f64>,
    pub members: BTreeSet<String>,
    /// Accumulated phrase weight (keyword score × candidate size) over every
    /// candidate merged into this topic. Drives relabeling.
    #[serde(skip)]
    pub phrase_weights: BTreeMap<String, f64>,
    pub first_seen: NaiveDate,
}

impl Topic {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_miscellaneous(&self) -> bool {
        self.kind == TopicKind::Miscellaneous
    }

    /// Highest accumulated phrase, ties broken lexicographically.
    pub fn best_phrase(&self) -> Option<(&str, f64)> {
        self.phrase_weights
            .iter()
            .fold(None, |best: Option<(&str, f64)>, (phrase, &weight)| match best {
                // BTreeMap iterates in lexicographic order, so only a strictly
                // higher weight replaces the current best
                Some((_, w)) if weight <= w => best,
                _ => Some((phrase.as_str(), weight)),
            })
    }
}

/// One review resolved to one topic on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub review_id: String,
    pub topic_id: TopicId,
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_with_weights(weights: &[(&str, f64)]) -> Topic {
        Topic {
            id: TopicId(0),
            kind: TopicKind::Named,
            label: "x".to_string(),
            centroid: vec![1.0],
            members: BTreeSet::new(),
            phrase_weights: weights.iter().map(|(p, w)| (p.to_string(), *w)).collect(),
            first_seen: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn test_best_phrase_highest_weight() {
        let topic = topic_with_weights(&[("late", 1.0), ("delivery late", 3.0), ("cold", 2.0)]);
        assert_eq!(topic.best_phrase(), Some(("delivery late", 3.0)));
    }

    #[test]
    fn test_best_phrase_tie_is_lexicographic() {
        let topic = topic_with_weights(&[("zebra", 2.0), ("apple", 2.0)]);
        assert_eq!(topic.best_phrase().map(|(p, _)| p), Some("apple"));
    }

    #[test]
    fn test_best_phrase_empty() {
        assert_eq!(topic_with_weights(&[]).best_phrase(), None);
    }

    #[test]
    fn test_candidate_label() {
        let mut candidate = TopicCandidate {
            candidate_id: 0,
            kind: TopicKind::Named,
            member_ids: vec!["a".to_string()],
            centroid: vec![1.0],
            keywords: vec![Keyword {
                phrase: "app crash".to_string(),
                score: 1.0,
                doc_freq: 1,
            }],
        };
        assert_eq!(candidate.label(), "app crash");
        candidate.kind = TopicKind::Miscellaneous;
        assert_eq!(candidate.label(), MISCELLANEOUS_LABEL);
    }
}

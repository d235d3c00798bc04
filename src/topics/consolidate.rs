// Cross-day topic consolidation.
//
// Each day's candidates are folded into one run-wide registry, strictly in
// date order. A candidate either merges into the most similar existing topic
// (when that similarity beats the threshold) or becomes a new topic. Topic ids
// are handed out in creation order and never change.
//
// Merging is monotonic: once two topics exist they are never merged into each
// other by `absorb`. That keeps a topic's identity from depending on which day
// happened to be processed when. `merge_near_duplicates` is an explicit,
// opt-in end-of-run pass for callers who prefer fewer, broader topics.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::embeddings::{cosine_similarity, merge_means};
use super::models::{Assignment, Topic, TopicCandidate, TopicId, TopicKind, MISCELLANEOUS_LABEL};
use crate::config::AnalysisConfig;

/// The single owner of every topic in a run.
pub struct TopicRegistry {
    topics: Vec<Topic>,
    miscellaneous: Option<TopicId>,
    similarity_threshold: f64,
    relabel_margin: f64,
}

impl TopicRegistry {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            topics: Vec::new(),
            miscellaneous: None,
            similarity_threshold: config.similarity_threshold,
            relabel_margin: config.relabel_margin,
        }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn get(&self, id: TopicId) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Fold one day's candidates into the registry and return where each of
    /// that day's reviews ended up.
    pub fn absorb(&mut self, date: NaiveDate, candidates: Vec<TopicCandidate>) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut created = 0usize;
        let mut merged = 0usize;

        for candidate in candidates {
            let target = match candidate.kind {
                TopicKind::Miscellaneous => match self.miscellaneous {
                    Some(id) => {
                        self.merge_into(id, &candidate);
                        id
                    }
                    None => {
                        let id = self.create(date, &candidate);
                        self.miscellaneous = Some(id);
                        id
                    }
                },
                TopicKind::Named => match self.best_match(&candidate.centroid) {
                    Some(id) => {
                        merged += 1;
                        self.merge_into(id, &candidate);
                        id
                    }
                    None => {
                        created += 1;
                        self.create(date, &candidate)
                    }
                },
            };

            assignments.extend(candidate.member_ids.into_iter().map(|review_id| Assignment {
                review_id,
                topic_id: target,
                date,
            }));
        }

        debug!(
            %date,
            created,
            merged,
            topics = self.topics.len(),
            "Consolidated batch"
        );

        assignments
    }

    /// Most similar named topic above the threshold. Ties go to the lower id.
    fn best_match(&self, centroid: &[f64]) -> Option<TopicId> {
        let mut best: Option<(TopicId, f64)> = None;
        for topic in self.topics.iter().filter(|t| t.kind == TopicKind::Named) {
            let sim = cosine_similarity(centroid, &topic.centroid);
            if sim <= self.similarity_threshold {
                continue;
            }
            // Topics are stored in id order, so strict > keeps the lower id on ties
            if best.is_none_or(|(_, s)| sim > s) {
                best = Some((topic.id, sim));
            }
        }
        best.map(|(id, _)| id)
    }

    fn create(&mut self, date: NaiveDate, candidate: &TopicCandidate) -> TopicId {
        let id = TopicId(self.topics.len() as u32);
        let label = match candidate.kind {
            TopicKind::Miscellaneous => MISCELLANEOUS_LABEL.to_string(),
            TopicKind::Named => candidate.label().to_string(),
        };

        let mut topic = Topic {
            id,
            kind: candidate.kind,
            label,
            centroid: candidate.centroid.clone(),
            members: candidate.member_ids.iter().cloned().collect(),
            phrase_weights: BTreeMap::new(),
            first_seen: date,
        };
        accumulate_phrases(&mut topic, candidate);

        debug!(topic = %id, label = %topic.label, size = topic.size(), "New topic");
        self.topics.push(topic);
        id
    }

    fn merge_into(&mut self, id: TopicId, candidate: &TopicCandidate) {
        let margin = self.relabel_margin;
        let Some(topic) = self.topics.iter_mut().find(|t| t.id == id) else {
            return;
        };

        let old_size = topic.size();
        topic.members.extend(candidate.member_ids.iter().cloned());
        // Members already present (a review re-submitted on another day)
        // must not be double-weighted in the centroid
        let added = topic.size() - old_size;
        if added > 0 {
            topic.centroid = merge_means(&topic.centroid, old_size, &candidate.centroid, added);
        }

        accumulate_phrases(topic, candidate);
        if topic.kind == TopicKind::Named {
            maybe_relabel(topic, margin);
        }
    }

    /// Optional end-of-run pass: repeatedly merge the most similar pair of
    /// named topics whose centroids beat the threshold, folding the higher id
    /// into the lower one. Returns the id remap for every absorbed topic.
    pub fn merge_near_duplicates(&mut self) -> BTreeMap<TopicId, TopicId> {
        let mut remap: BTreeMap<TopicId, TopicId> = BTreeMap::new();

        loop {
            let named: Vec<usize> = (0..self.topics.len())
                .filter(|&i| self.topics[i].kind == TopicKind::Named)
                .collect();

            let mut best: Option<(usize, usize, f64)> = None;
            for (a_pos, &a) in named.iter().enumerate() {
                for &b in &named[a_pos + 1..] {
                    let sim = cosine_similarity(&self.topics[a].centroid, &self.topics[b].centroid);
                    if sim > self.similarity_threshold && best.is_none_or(|(_, _, s)| sim > s) {
                        best = Some((a, b, sim));
                    }
                }
            }

            let Some((keep, absorb, sim)) = best else {
                break;
            };

            let absorbed = self.topics.remove(absorb);
            let survivor = &mut self.topics[keep];

            let old_size = survivor.size();
            let absorbed_size = absorbed.size();
            survivor.members.extend(absorbed.members);
            let added = survivor.size() - old_size;
            if added > 0 {
                survivor.centroid =
                    merge_means(&survivor.centroid, old_size, &absorbed.centroid, absorbed_size);
            }
            for (phrase, weight) in absorbed.phrase_weights {
                *survivor.phrase_weights.entry(phrase).or_insert(0.0) += weight;
            }
            survivor.first_seen = survivor.first_seen.min(absorbed.first_seen);
            maybe_relabel(survivor, self.relabel_margin);

            info!(
                kept = %survivor.id,
                absorbed = %absorbed.id,
                similarity = sim,
                "Merged near-duplicate topics"
            );

            // Anything previously folded into the absorbed topic follows it
            let survivor_id = survivor.id;
            for target in remap.values_mut() {
                if *target == absorbed.id {
                    *target = survivor_id;
                }
            }
            remap.insert(absorbed.id, survivor_id);
        }

        remap
    }
}

/// Apply an id remap from `merge_near_duplicates` to assignments.
pub fn remap_assignments(assignments: &mut [Assignment], remap: &BTreeMap<TopicId, TopicId>) {
    if remap.is_empty() {
        return;
    }
    for a in assignments {
        if let Some(&to) = remap.get(&a.topic_id) {
            a.topic_id = to;
        }
    }
}

fn accumulate_phrases(topic: &mut Topic, candidate: &TopicCandidate) {
    let size = candidate.size() as f64;
    for keyword in &candidate.keywords {
        *topic
            .phrase_weights
            .entry(keyword.phrase.clone())
            .or_insert(0.0) += keyword.score * size;
    }
}

/// Switch to the best accumulated phrase only when it clearly outweighs the
/// current label.
fn maybe_relabel(topic: &mut Topic, margin: f64) {
    let current = topic.phrase_weights.get(&topic.label).copied().unwrap_or(0.0);
    let Some((best, weight)) = topic.best_phrase() else {
        return;
    };
    if best != topic.label && weight > current * (1.0 + margin) {
        let best = best.to_string();
        debug!(topic = %topic.id, from = %topic.label, to = %best, "Relabeled topic");
        topic.label = best;
    }
}

// Per-day review clustering: turns one batch of embedded reviews into
// topic candidates.
//
// Strategy: density-seeded leader clustering. Every review's neighbour degree
// (how many other reviews are more similar than the threshold) is computed up
// front. The densest unassigned review seeds a cluster; the remaining
// unassigned reviews are visited from most to least similar to the seed and
// join while they stay above the threshold against the cluster's running
// centroid. Reviews with zero or negative similarity to the seed are never
// visited for that cluster, even if the centroid later drifts toward them;
// they wait for a later seed. Repeat until everything is assigned.
//
// The batch is put in review id order first, and every tie (degree, visit
// order) is broken by that order, so the output depends only on the set of
// reviews and the thresholds, never on the order they arrived in.

use rayon::prelude::*;
use tracing::debug;

use super::embeddings::{cosine_similarity, mean_embedding, merge_means};
use super::keywords::{canonical_label, score_clusters};
use super::models::{Keyword, NormalizedText, TopicCandidate, TopicKind};
use crate::config::AnalysisConfig;

/// Clusters one day's reviews into topic candidates.
pub struct TopicExtractor {
    similarity_threshold: f64,
    min_cluster_size: usize,
    label_confidence_floor: f64,
    canonical_labels: bool,
}

impl TopicExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            min_cluster_size: config.min_cluster_size,
            label_confidence_floor: config.label_confidence_floor,
            canonical_labels: config.canonical_labels,
        }
    }

    /// Cluster a batch. An empty batch yields no candidates.
    ///
    /// Named candidates come first, in seed order; the miscellaneous
    /// candidate, if any, is last.
    pub fn extract(&self, batch: &[NormalizedText]) -> Vec<TopicCandidate> {
        if batch.is_empty() {
            return Vec::new();
        }

        let mut docs: Vec<&NormalizedText> = batch.iter().collect();
        docs.sort_by(|a, b| a.review_id.cmp(&b.review_id));

        let groups = self.group(&docs);

        let (named, small): (Vec<Vec<usize>>, Vec<Vec<usize>>) = groups
            .into_iter()
            .partition(|g| g.len() >= self.min_cluster_size);

        let mut misc: Vec<usize> = small.into_iter().flatten().collect();
        misc.sort_unstable();

        let mut all_groups: Vec<(TopicKind, Vec<usize>)> = named
            .into_iter()
            .map(|g| (TopicKind::Named, g))
            .collect();
        if !misc.is_empty() {
            all_groups.push((TopicKind::Miscellaneous, misc));
        }

        let token_groups: Vec<Vec<&[String]>> = all_groups
            .iter()
            .map(|(_, g)| g.iter().map(|&i| docs[i].tokens.as_slice()).collect())
            .collect();
        let scored = score_clusters(&token_groups);

        let candidates: Vec<TopicCandidate> = all_groups
            .into_iter()
            .zip(scored)
            .zip(token_groups.iter())
            .enumerate()
            .map(|(candidate_id, (((kind, members), scored), tokens))| {
                let mut keywords = scored.keywords;
                if kind == TopicKind::Named
                    && self.canonical_labels
                    && scored.confidence < self.label_confidence_floor
                {
                    if let Some(label) = canonical_label(tokens) {
                        let (score, doc_freq) = keywords
                            .first()
                            .map(|k| (k.score, k.doc_freq))
                            .unwrap_or((0.0, members.len()));
                        keywords.insert(
                            0,
                            Keyword {
                                phrase: label.to_string(),
                                score,
                                doc_freq,
                            },
                        );
                        keywords.truncate(super::keywords::MAX_KEYWORDS);
                    }
                }

                let vectors: Vec<&[f64]> = members
                    .iter()
                    .map(|&i| docs[i].embedding.as_slice())
                    .collect();

                TopicCandidate {
                    candidate_id,
                    kind,
                    member_ids: members.iter().map(|&i| docs[i].review_id.clone()).collect(),
                    centroid: mean_embedding(&vectors),
                    keywords,
                }
            })
            .collect();

        debug!(
            reviews = docs.len(),
            candidates = candidates.len(),
            miscellaneous = candidates
                .last()
                .filter(|c| c.kind == TopicKind::Miscellaneous)
                .map(|c| c.size())
                .unwrap_or(0),
            "Clustered batch"
        );

        candidates
    }

    /// Leader clustering over id-ordered docs. Returns groups of indices,
    /// each group sorted ascending.
    fn group(&self, docs: &[&NormalizedText]) -> Vec<Vec<usize>> {
        let n = docs.len();
        let theta = self.similarity_threshold;

        let sims: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| cosine_similarity(&docs[i].embedding, &docs[j].embedding))
                    .collect()
            })
            .collect();

        let degree: Vec<usize> = (0..n)
            .map(|i| (0..n).filter(|&j| j != i && sims[i][j] > theta).count())
            .collect();

        let mut assigned = vec![false; n];
        let mut groups = Vec::new();

        // Densest first; equal degree falls back to id order
        let mut seeds: Vec<usize> = (0..n).collect();
        seeds.sort_by(|&a, &b| degree[b].cmp(&degree[a]).then(a.cmp(&b)));

        for seed in seeds {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;

            let mut members = vec![seed];
            let mut centroid = docs[seed].embedding.clone();

            // Only reviews on the seed's side of the space are candidates
            let mut visit: Vec<usize> = (0..n)
                .filter(|&j| !assigned[j] && sims[seed][j] > 0.0)
                .collect();
            visit.sort_by(|&a, &b| sims[seed][b].total_cmp(&sims[seed][a]).then(a.cmp(&b)));

            for j in visit {
                if cosine_similarity(&docs[j].embedding, &centroid) > theta {
                    centroid = merge_means(&centroid, members.len(), &docs[j].embedding, 1);
                    members.push(j);
                    assigned[j] = true;
                }
            }

            members.sort_unstable();
            groups.push(members);
        }

        groups
    }
}

// Cluster keyword scoring and labeling.
//
// Class-based TF-IDF: within one day's batch, each cluster's combined token
// stream is treated as a single document and handed to the
// `keyword_extraction` TF-IDF. Its score is a word's batch frequency times
// its rarity across clusters; dividing out the frequency leaves a rarity
// weight in [0, 1], and a word's score for one cluster is
//
//   score(w, c) = tf(w, c) * (1 + rarity(w))
//
// so a word shared by every cluster (or the only cluster) still ranks by how
// often that cluster uses it.
//
// Candidate phrases are single words and adjacent word pairs, compared on
// stems so "crashed" / "crashing" count together. A phrase scores the sum of
// its words' scores times its coverage (share of the cluster's reviews that
// contain it), so a pair beats its parts only when reviewers actually say it
// together. The displayed phrase is the most common surface form.

use std::collections::{BTreeMap, BTreeSet};

use keyword_extraction::tf_idf::{TfIdf, TfIdfParams};

use super::hashing::stem;
use super::models::Keyword;

/// Most keywords kept per cluster.
pub const MAX_KEYWORDS: usize = 3;

/// Keywords for one cluster plus how confident the label is.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterKeywords {
    pub keywords: Vec<Keyword>,
    /// Share of the cluster's reviews that contain the top phrase (0.0 to 1.0)
    pub confidence: f64,
}

/// Seeded labels for the complaint categories that come up in almost every
/// consumer app. Used only when keyword labeling is unconfident.
const CANONICAL_LABELS: &[(&str, &[&str])] = &[
    (
        "Delivery issue",
        &["delivery", "deliver", "late", "delay", "delayed", "arrive", "slow", "waiting"],
    ),
    (
        "Food stale",
        &["stale", "cold", "spoiled", "rotten", "taste", "quality", "fresh", "smell"],
    ),
    (
        "Delivery partner rude",
        &["rude", "behaviour", "behavior", "misbehave", "arrogant", "abusive", "partner"],
    ),
    (
        "Maps not working properly",
        &["map", "maps", "location", "gps", "address", "route", "tracking"],
    ),
    (
        "App crashing",
        &["crash", "crashes", "freeze", "hang", "bug", "glitch", "lag", "error"],
    ),
    (
        "Payment and refund problems",
        &["payment", "refund", "charged", "money", "deducted", "debited", "upi", "wallet"],
    ),
    (
        "Customer support unhelpful",
        &["support", "customer", "care", "service", "chat", "response", "helpline"],
    ),
    (
        "Login and account issues",
        &["login", "otp", "account", "password", "signin", "verify", "verification"],
    ),
    (
        "Pricing and fees",
        &["price", "expensive", "fee", "fees", "charges", "surge", "costly", "overpriced"],
    ),
];

/// A phrase as a sequence of stems.
type StemKey = Vec<String>;

/// Score keywords for every cluster of a batch.
///
/// `clusters[c]` holds the token sequences of cluster `c`'s reviews, in a
/// canonical (review id) order. The result is index-aligned with `clusters`.
pub fn score_clusters(clusters: &[Vec<&[String]>]) -> Vec<ClusterKeywords> {
    // Word (stem) counts per cluster and across the batch
    let stemmed: Vec<Vec<Vec<String>>> = clusters
        .iter()
        .map(|docs| docs.iter().map(|d| d.iter().map(|t| stem(t)).collect()).collect())
        .collect();

    let mut cluster_counts: Vec<BTreeMap<&str, usize>> = Vec::with_capacity(clusters.len());
    let mut batch_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for docs in &stemmed {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in docs {
            for s in doc {
                *counts.entry(s.as_str()).or_insert(0) += 1;
                *batch_counts.entry(s.as_str()).or_insert(0) += 1;
            }
        }
        cluster_counts.push(counts);
    }

    let batch_total: usize = batch_counts.values().sum();
    let rarity = class_rarity(&stemmed, &batch_counts, batch_total);

    clusters
        .iter()
        .zip(stemmed.iter())
        .zip(cluster_counts.iter())
        .map(|((surface_docs, stem_docs), counts)| {
            let total: usize = counts.values().sum();
            let word_score = |w: &str| -> f64 {
                let tf = counts.get(w).copied().unwrap_or(0) as f64 / total.max(1) as f64;
                tf * (1.0 + rarity.get(w).copied().unwrap_or(0.0))
            };
            score_phrases(surface_docs, stem_docs, &word_score)
        })
        .collect()
}

/// Rarity of each stem across the batch's clusters, scaled to [0, 1].
///
/// Runs TF-IDF with one document per cluster, then divides each score by the
/// stem's batch frequency so only the inverse document frequency remains.
fn class_rarity(
    stemmed: &[Vec<Vec<String>>],
    batch_counts: &BTreeMap<&str, usize>,
    batch_total: usize,
) -> BTreeMap<String, f64> {
    let class_docs: Vec<String> = stemmed
        .iter()
        .map(|docs| docs.iter().flatten().map(String::as_str).collect::<Vec<_>>().join(" "))
        .filter(|doc| !doc.is_empty())
        .collect();
    if class_docs.is_empty() || batch_total == 0 {
        return BTreeMap::new();
    }

    // Tokens are already stop-word filtered by the normalizer
    let no_stop_words: Vec<String> = Vec::new();
    let tfidf = TfIdf::new(TfIdfParams::UnprocessedDocuments(
        &class_docs,
        &no_stop_words,
        None,
    ));

    let raw: BTreeMap<String, f64> = tfidf
        .get_ranked_word_scores(batch_counts.len())
        .into_iter()
        .filter_map(|(word, score)| {
            let freq = batch_counts.get(word.as_str()).copied()? as f64 / batch_total as f64;
            Some((word, (score as f64 / freq).max(0.0)))
        })
        .filter(|(_, r)| r.is_finite())
        .collect();

    let max = raw.values().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        return BTreeMap::new();
    }
    raw.into_iter().map(|(w, r)| (w, r / max)).collect()
}

fn score_phrases(
    surface_docs: &[&[String]],
    stem_docs: &[Vec<String>],
    word_score: &dyn Fn(&str) -> f64,
) -> ClusterKeywords {
    let n_docs = surface_docs.len();
    if n_docs == 0 {
        return ClusterKeywords {
            keywords: Vec::new(),
            confidence: 0.0,
        };
    }

    // stem phrase -> (document frequency, surface form -> occurrences)
    let mut phrases: BTreeMap<StemKey, (usize, BTreeMap<String, usize>)> = BTreeMap::new();

    for (surface, stems) in surface_docs.iter().zip(stem_docs.iter()) {
        let mut seen: BTreeSet<StemKey> = BTreeSet::new();
        let mut record = |key: StemKey, form: String| {
            let entry = phrases.entry(key.clone()).or_default();
            *entry.1.entry(form).or_insert(0) += 1;
            if seen.insert(key) {
                entry.0 += 1;
            }
        };

        for (i, s) in stems.iter().enumerate() {
            record(vec![s.clone()], surface[i].clone());
        }
        for i in 1..stems.len() {
            if stems[i - 1] != stems[i] {
                record(
                    vec![stems[i - 1].clone(), stems[i].clone()],
                    format!("{} {}", surface[i - 1], surface[i]),
                );
            }
        }
    }

    let mut scored: Vec<(StemKey, Keyword)> = phrases
        .into_iter()
        .map(|(key, (df, forms))| {
            let coverage = df as f64 / n_docs as f64;
            let score = key.iter().map(|w| word_score(w.as_str())).sum::<f64>() * coverage;
            let phrase = most_common_form(&forms);
            (
                key,
                Keyword {
                    phrase,
                    score,
                    doc_freq: df,
                },
            )
        })
        .collect();

    scored.sort_by(|(_, a), (_, b)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.doc_freq.cmp(&a.doc_freq))
            .then_with(|| a.phrase.cmp(&b.phrase))
    });

    // Skip phrases whose words are all already covered by a chosen phrase,
    // so "delivery late" is not followed by "delivery" and "late"
    let mut covered: BTreeSet<String> = BTreeSet::new();
    let mut keywords = Vec::new();
    for (key, keyword) in scored {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        if key.iter().all(|w| covered.contains(w)) {
            continue;
        }
        covered.extend(key);
        keywords.push(keyword);
    }

    let confidence = keywords
        .first()
        .map(|k| k.doc_freq as f64 / n_docs as f64)
        .unwrap_or(0.0);

    ClusterKeywords {
        keywords,
        confidence,
    }
}

/// Most frequent surface form; ties go to the lexicographically smallest.
fn most_common_form(forms: &BTreeMap<String, usize>) -> String {
    forms
        .iter()
        .fold(None, |best: Option<(&String, usize)>, (form, &n)| match best {
            Some((_, b)) if n <= b => best,
            _ => Some((form, n)),
        })
        .map(|(form, _)| form.clone())
        .unwrap_or_default()
}

/// Pick a canonical complaint label for a cluster, if most of its reviews
/// mention one category's trigger words. Ties go to the earlier category.
pub fn canonical_label(docs: &[&[String]]) -> Option<&'static str> {
    if docs.is_empty() {
        return None;
    }

    let doc_stems: Vec<BTreeSet<String>> = docs
        .iter()
        .map(|d| d.iter().map(|t| stem(t)).collect())
        .collect();

    let mut best: Option<(&'static str, usize)> = None;
    for &(label, triggers) in CANONICAL_LABELS {
        let trigger_stems: BTreeSet<String> = triggers.iter().map(|t| stem(t)).collect();
        let hits = doc_stems
            .iter()
            .filter(|stems| !stems.is_disjoint(&trigger_stems))
            .count();
        if hits * 2 > docs.len() && best.is_none_or(|(_, b)| hits > b) {
            best = Some((label, hits));
        }
    }
    best.map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn refs(docs: &[Vec<String>]) -> Vec<&[String]> {
        docs.iter().map(|d| d.as_slice()).collect()
    }

    #[test]
    fn test_consistent_pair_beats_its_parts() {
        let docs = vec![doc(&["delivery", "late"]), doc(&["delivery", "late"])];
        let scored = score_clusters(&[refs(&docs)]);
        assert_eq!(scored[0].keywords[0].phrase, "delivery late");
        assert_eq!(scored[0].keywords[0].doc_freq, 2);
        assert!((scored[0].confidence - 1.0).abs() < 1e-12);
        // The pair covers both words, so neither is repeated on its own
        assert_eq!(scored[0].keywords.len(), 1);
    }

    #[test]
    fn test_inflections_grouped() {
        let docs = vec![
            doc(&["app", "crashed"]),
            doc(&["app", "crashing", "login"]),
            doc(&["app", "crashed", "again"]),
        ];
        let scored = score_clusters(&[refs(&docs)]);
        let top = &scored[0].keywords[0];
        assert_eq!(top.phrase, "app crashed");
        assert_eq!(top.doc_freq, 3);
    }

    #[test]
    fn test_distinctive_words_win_across_clusters() {
        let a = vec![doc(&["food", "cold"]), doc(&["food", "cold", "stale"])];
        let b = vec![doc(&["food", "tasty"]), doc(&["food", "tasty", "fresh"])];
        let scored = score_clusters(&[refs(&a), refs(&b)]);
        assert!(scored[0].keywords[0].phrase.contains("cold"));
        assert!(scored[1].keywords[0].phrase.contains("tasty"));
    }

    #[test]
    fn test_shared_words_are_not_rarer_than_distinctive_ones() {
        let stemmed = vec![
            vec![vec!["food".to_string(), "cold".to_string()]],
            vec![vec!["food".to_string(), "tasti".to_string()]],
        ];
        let mut batch_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for word in stemmed.iter().flatten().flatten() {
            *batch_counts.entry(word.as_str()).or_insert(0) += 1;
        }
        let rarity = class_rarity(&stemmed, &batch_counts, 4);

        let of = |w: &str| rarity.get(w).copied().unwrap_or(0.0);
        assert!(of("food") <= of("cold"));
        assert!(rarity.values().all(|r| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn test_tie_broken_lexicographically() {
        // Two unrelated words with identical statistics
        let docs = vec![doc(&["zeta"]), doc(&["alpha"])];
        let scored = score_clusters(&[refs(&docs)]);
        assert_eq!(scored[0].keywords[0].phrase, "alpha");
        assert_eq!(scored[0].keywords[1].phrase, "zeta");
    }

    #[test]
    fn test_at_most_three_keywords() {
        let docs = vec![doc(&["one", "two", "three", "four", "five", "six"])];
        let scored = score_clusters(&[refs(&docs)]);
        assert!(scored[0].keywords.len() <= MAX_KEYWORDS);
    }

    #[test]
    fn test_empty_cluster() {
        let scored = score_clusters(&[Vec::new()]);
        assert!(scored[0].keywords.is_empty());
        assert_eq!(scored[0].confidence, 0.0);
    }

    #[test]
    fn test_order_independent_within_cluster() {
        let d1 = doc(&["refund", "pending"]);
        let d2 = doc(&["refund", "delayed", "money"]);
        let forward = score_clusters(&[vec![d1.as_slice(), d2.as_slice()]]);
        let backward = score_clusters(&[vec![d2.as_slice(), d1.as_slice()]]);
        assert_eq!(forward[0].keywords[0].phrase, backward[0].keywords[0].phrase);
    }

    #[test]
    fn test_canonical_label_majority() {
        let docs = vec![
            doc(&["order", "arrived", "late"]),
            doc(&["delayed", "again"]),
            doc(&["rider", "slow"]),
        ];
        assert_eq!(canonical_label(&refs(&docs)), Some("Delivery issue"));
    }

    #[test]
    fn test_canonical_label_needs_majority() {
        let docs = vec![
            doc(&["refund", "pending"]),
            doc(&["great", "offers"]),
            doc(&["nice", "ui"]),
        ];
        assert_eq!(canonical_label(&refs(&docs)), None);
    }

    #[test]
    fn test_canonical_label_empty() {
        assert_eq!(canonical_label(&[]), None);
    }
}

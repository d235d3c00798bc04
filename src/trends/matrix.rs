// Report assembly: daily counts and the topic registry become a dense
// topic-by-day matrix.
//
// Every date of the window gets a column, in order, with no gaps. A day the
// pipeline has no data for is still a column, marked unavailable, so a reader
// can tell "nobody complained" apart from "we could not look".

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use super::aggregate::DailyCount;
use super::window::AnalysisWindow;
use crate::topics::models::{Topic, TopicId, TopicKind};

/// Whether a column holds real counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayAvailability {
    Available,
    Missing { reason: String },
}

impl DayAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, DayAvailability::Available)
    }
}

/// One topic's counts across the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRow {
    pub topic_id: TopicId,
    pub kind: TopicKind,
    pub label: String,
    /// One entry per window date; zero on unavailable days
    pub counts: Vec<u32>,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMatrix {
    pub window: AnalysisWindow,
    pub dates: Vec<NaiveDate>,
    pub availability: Vec<DayAvailability>,
    /// Sorted by total descending, then topic id ascending
    pub rows: Vec<TopicRow>,
}

impl TrendMatrix {
    /// Count for a cell, or `None` when the day's data is unavailable.
    pub fn cell(&self, row: usize, col: usize) -> Option<u32> {
        let counts = &self.rows.get(row)?.counts;
        self.availability
            .get(col)?
            .is_available()
            .then(|| counts[col])
    }

    /// The first `n` rows. Never recomputes or reorders anything.
    pub fn top(&self, n: usize) -> &[TopicRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn available_days(&self) -> usize {
        self.availability.iter().filter(|a| a.is_available()).count()
    }

    pub fn total_occurrences(&self) -> u64 {
        self.rows.iter().map(|r| u64::from(r.total)).sum()
    }

    /// Display labels, one per row. Labels shared by more than one row get
    /// the topic id appended so every row is distinguishable.
    pub fn row_labels(&self) -> Vec<String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for row in &self.rows {
            *seen.entry(row.label.as_str()).or_insert(0) += 1;
        }
        self.rows
            .iter()
            .map(|row| {
                if seen.get(row.label.as_str()).copied().unwrap_or(0) > 1 {
                    format!("{} {}", row.label, row.topic_id)
                } else {
                    row.label.clone()
                }
            })
            .collect()
    }
}

/// Build the matrix for `window`.
///
/// Counts outside the window, and counts on days listed in `unavailable`, are
/// ignored. Topics with no occurrences in the window get no row. The
/// miscellaneous topic is kept only when `include_miscellaneous` is set.
pub fn assemble(
    counts: &[DailyCount],
    topics: &[Topic],
    window: &AnalysisWindow,
    unavailable: &BTreeMap<NaiveDate, String>,
    include_miscellaneous: bool,
) -> TrendMatrix {
    let dates = window.dates();
    let availability: Vec<DayAvailability> = dates
        .iter()
        .map(|d| match unavailable.get(d) {
            Some(reason) => DayAvailability::Missing {
                reason: reason.clone(),
            },
            None => DayAvailability::Available,
        })
        .collect();

    let mut per_topic: BTreeMap<TopicId, Vec<u32>> = BTreeMap::new();
    for c in counts {
        let Some(col) = window.index_of(c.date) else {
            continue;
        };
        if !availability[col].is_available() {
            continue;
        }
        per_topic
            .entry(c.topic_id)
            .or_insert_with(|| vec![0; dates.len()])[col] += c.count;
    }

    let mut rows: Vec<TopicRow> = topics
        .iter()
        .filter(|t| include_miscellaneous || t.kind != TopicKind::Miscellaneous)
        .filter_map(|t| {
            let counts = per_topic.remove(&t.id)?;
            let total: u32 = counts.iter().sum();
            (total > 0).then(|| TopicRow {
                topic_id: t.id,
                kind: t.kind,
                label: t.label.clone(),
                counts,
                total,
            })
        })
        .collect();

    rows.sort_by(|a, b| b.total.cmp(&a.total).then(a.topic_id.cmp(&b.topic_id)));

    TrendMatrix {
        window: *window,
        dates,
        availability,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn topic(id: u32, kind: TopicKind, label: &str) -> Topic {
        Topic {
            id: TopicId(id),
            kind,
            label: label.to_string(),
            centroid: Vec::new(),
            members: BTreeSet::new(),
            phrase_weights: BTreeMap::new(),
            first_seen: day(1),
        }
    }

    fn count(topic: u32, d: u32, n: u32) -> DailyCount {
        DailyCount {
            topic_id: TopicId(topic),
            date: day(d),
            count: n,
        }
    }

    fn window() -> AnalysisWindow {
        AnalysisWindow::new(day(1), day(5)).unwrap()
    }

    #[test]
    fn test_columns_cover_window() {
        let m = assemble(&[], &[], &window(), &BTreeMap::new(), true);
        assert_eq!(m.dates, window().dates());
        assert_eq!(m.availability.len(), 5);
        assert!(m.is_empty());
    }

    #[test]
    fn test_sorted_by_total_then_id() {
        let topics = vec![
            topic(0, TopicKind::Named, "late"),
            topic(1, TopicKind::Named, "crash"),
            topic(2, TopicKind::Named, "refund"),
        ];
        let counts = vec![count(0, 1, 2), count(1, 2, 5), count(2, 3, 2)];
        let m = assemble(&counts, &topics, &window(), &BTreeMap::new(), true);
        let order: Vec<u32> = m.rows.iter().map(|r| r.topic_id.0).collect();
        assert_eq!(order, vec![1, 0, 2]);
        assert_eq!(m.rows[0].counts, vec![0, 5, 0, 0, 0]);
    }

    #[test]
    fn test_zero_total_topics_dropped() {
        let topics = vec![
            topic(0, TopicKind::Named, "late"),
            topic(1, TopicKind::Named, "crash"),
        ];
        // Topic 1 only occurs outside the window
        let counts = vec![count(0, 1, 1), count(1, 20, 3)];
        let m = assemble(&counts, &topics, &window(), &BTreeMap::new(), true);
        assert_eq!(m.rows.len(), 1);
        assert_eq!(m.total_occurrences(), 1);
    }

    #[test]
    fn test_miscellaneous_optional() {
        let topics = vec![
            topic(0, TopicKind::Miscellaneous, "Miscellaneous"),
            topic(1, TopicKind::Named, "crash"),
        ];
        let counts = vec![count(0, 1, 1), count(1, 1, 1)];
        assert_eq!(
            assemble(&counts, &topics, &window(), &BTreeMap::new(), true)
                .rows
                .len(),
            2
        );
        let m = assemble(&counts, &topics, &window(), &BTreeMap::new(), false);
        assert_eq!(m.rows.len(), 1);
        assert_eq!(m.rows[0].label, "crash");
    }

    #[test]
    fn test_unavailable_days() {
        let topics = vec![topic(0, TopicKind::Named, "late")];
        let counts = vec![count(0, 1, 1), count(0, 3, 4)];
        let mut unavailable = BTreeMap::new();
        unavailable.insert(day(3), "source outage".to_string());

        let m = assemble(&counts, &topics, &window(), &unavailable, true);
        assert_eq!(m.available_days(), 4);
        assert_eq!(m.cell(0, 0), Some(1));
        assert_eq!(m.cell(0, 1), Some(0));
        assert_eq!(m.cell(0, 2), None);
        assert_eq!(m.rows[0].total, 1);
        assert_eq!(
            m.availability[2],
            DayAvailability::Missing {
                reason: "source outage".to_string()
            }
        );
    }

    #[test]
    fn test_top_is_a_slice() {
        let topics: Vec<Topic> = (0..4)
            .map(|i| topic(i, TopicKind::Named, &format!("t{i}")))
            .collect();
        let counts: Vec<DailyCount> = (0..4).map(|i| count(i, 1, 4 - i)).collect();
        let m = assemble(&counts, &topics, &window(), &BTreeMap::new(), true);
        assert_eq!(m.top(2), &m.rows[..2]);
        assert_eq!(m.top(10).len(), 4);
        assert!(m.top(0).is_empty());
    }

    #[test]
    fn test_duplicate_labels_disambiguated() {
        let topics = vec![
            topic(0, TopicKind::Named, "late"),
            topic(1, TopicKind::Named, "late"),
            topic(2, TopicKind::Named, "crash"),
        ];
        let counts = vec![count(0, 1, 3), count(1, 1, 2), count(2, 1, 1)];
        let m = assemble(&counts, &topics, &window(), &BTreeMap::new(), true);
        assert_eq!(m.row_labels(), vec!["late #0", "late #1", "crash"]);
    }
}

// Temporal aggregation: assignments in, per-topic per-day counts out.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::topics::models::{Assignment, TopicId};

/// How many reviews a topic received on one day. Zero counts are never
/// materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub topic_id: TopicId,
    pub date: NaiveDate,
    pub count: u32,
}

/// Count assignments per (topic, date). Output is sorted by topic id, then
/// date.
pub fn aggregate(assignments: &[Assignment]) -> Vec<DailyCount> {
    let mut counts: BTreeMap<(TopicId, NaiveDate), u32> = BTreeMap::new();
    for a in assignments {
        *counts.entry((a.topic_id, a.date)).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((topic_id, date), count)| DailyCount {
            topic_id,
            date,
            count,
        })
        .collect()
}

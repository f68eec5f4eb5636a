//! Record grouping by file key.
//!
//! The [`RecordGrouper`] accumulates records into named groups between
//! flushes. Each (topic, partition) tracks a head: the record that started
//! the partition's current file. `{{start_offset}}` evaluates against the
//! head, so every record appended to the file keeps the file's offset;
//! `{{timestamp}}` and `{{key}}` evaluate against the incoming record, so
//! crossing a period boundary or a key change rolls the partition onto a
//! new file.
//!
//! Groups are held in insertion order (IndexMap) so `records()` enumerates
//! deterministically for a given state, which lets a failed flush be retried
//! against the same sequence of groups.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;

use crate::error::{GroupFullSnafu, GroupingError, KeyEvaluationSnafu};
use crate::record::Record;
use crate::template::{Template, TemplateVars};

/// What to do when a group reaches `max_records_per_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLimitPolicy {
    /// Start a fresh group: the incoming record becomes the new head for its
    /// partition. Offset-bearing templates produce a naturally distinct key;
    /// otherwise a `.N` counter suffix disambiguates.
    #[default]
    Rotate,
    /// Reject the record with [`GroupingError::GroupFull`]; it is not
    /// retained.
    Reject,
}

/// The record that started a partition's current file.
struct HeadState {
    start_offset: i64,
    file_key: String,
}

/// Accumulates records into file-keyed groups between flushes.
///
/// Not internally synchronized: the host invokes `put`/`records`/`clear`
/// serially, which single ownership and `&mut self` enforce.
pub struct RecordGrouper {
    template: Template,
    /// Per-group record limit; 0 means unlimited.
    max_records_per_file: usize,
    on_full: GroupLimitPolicy,
    groups: IndexMap<String, Vec<Record>>,
    /// Current head per (topic, partition).
    heads: HashMap<(String, i32), HeadState>,
}

impl RecordGrouper {
    pub fn new(template: Template, max_records_per_file: usize, on_full: GroupLimitPolicy) -> Self {
        Self {
            template,
            max_records_per_file,
            on_full,
            groups: IndexMap::new(),
            heads: HashMap::new(),
        }
    }

    /// Group a record, appending it to the group for its computed file key.
    ///
    /// On error the record is not retained; no record is ever silently
    /// dropped or duplicated.
    pub fn put(&mut self, record: Record) -> Result<(), GroupingError> {
        let tp = (record.topic.clone(), record.partition);

        if let Some(head) = self.heads.get(&tp) {
            let candidate = self
                .template
                .evaluate(&TemplateVars {
                    topic: &record.topic,
                    partition: record.partition,
                    start_offset: head.start_offset,
                    timestamp: record.timestamp,
                    key: record.key.as_deref(),
                })
                .context(KeyEvaluationSnafu)?;

            if candidate == head.file_key {
                if !self.group_full(&candidate) {
                    self.groups.entry(candidate).or_default().push(record);
                    return Ok(());
                }
                ensure!(
                    self.on_full != GroupLimitPolicy::Reject,
                    GroupFullSnafu {
                        file_key: candidate,
                        limit: self.max_records_per_file,
                    }
                );
            }
            // Key changed or group rolled: fall through to start a new head.
        }

        let file_key = self.next_key(&record)?;
        self.heads.insert(
            tp,
            HeadState {
                start_offset: record.offset,
                file_key: file_key.clone(),
            },
        );
        self.groups.entry(file_key).or_default().push(record);
        Ok(())
    }

    /// Enumerate current groups as (file key, ordered records) pairs.
    ///
    /// Non-destructive; insertion-ordered and stable for a given state.
    pub fn records(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.groups
            .iter()
            .map(|(key, group)| (key.as_str(), group.as_slice()))
    }

    /// Discard all groups and head tracking. Idempotent.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.heads.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn record_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    fn group_full(&self, key: &str) -> bool {
        self.max_records_per_file > 0
            && self
                .groups
                .get(key)
                .is_some_and(|group| group.len() >= self.max_records_per_file)
    }

    /// Compute the file key for a record that starts a new head.
    ///
    /// If the freshly evaluated key still points at a full group - either
    /// because the template carries no offset, or because another partition
    /// mapped to the same key - the limit policy applies here too.
    /// Cross-partition key collisions are a configuration hazard (template
    /// without `{{partition}}`), not a grouper fault; colliding partitions
    /// share the group and their records interleave in arrival order.
    fn next_key(&self, record: &Record) -> Result<String, GroupingError> {
        let base = self
            .template
            .evaluate(&TemplateVars {
                topic: &record.topic,
                partition: record.partition,
                start_offset: record.offset,
                timestamp: record.timestamp,
                key: record.key.as_deref(),
            })
            .context(KeyEvaluationSnafu)?;

        if !self.group_full(&base) {
            return Ok(base);
        }

        match self.on_full {
            GroupLimitPolicy::Reject => GroupFullSnafu {
                file_key: base,
                limit: self.max_records_per_file,
            }
            .fail(),
            GroupLimitPolicy::Rotate => {
                let mut n = 1usize;
                loop {
                    let candidate = format!("{base}.{n}");
                    if !self.group_full(&candidate) {
                        return Ok(candidate);
                    }
                    n += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn grouper(template: &str, max: usize, on_full: GroupLimitPolicy) -> RecordGrouper {
        RecordGrouper::new(Template::parse(template).unwrap(), max, on_full)
    }

    fn record(topic: &str, partition: i32, offset: i64) -> Record {
        Record::new(
            topic,
            partition,
            offset,
            Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap(),
            format!("value-{offset}"),
        )
    }

    #[test]
    fn test_records_share_group_until_cleared() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset:padding=true}}",
            0,
            GroupLimitPolicy::Rotate,
        );

        g.put(record("topic", 0, 0)).unwrap();
        g.put(record("topic", 0, 1)).unwrap();

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "topic-0-00000000000000000000");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[0].offset, 0);
        assert_eq!(groups[0].1[1].offset, 1);
    }

    #[test]
    fn test_groups_per_partition() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );

        g.put(record("topic", 0, 0)).unwrap();
        g.put(record("topic", 0, 1)).unwrap();
        g.put(record("topic", 1, 3)).unwrap();

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "topic-0-0");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "topic-1-3");
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn test_no_record_lost_or_duplicated_across_interleaved_partitions() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );

        // Interleave three partitions; offsets monotonic per partition.
        for i in 0..30i64 {
            let partition = (i % 3) as i32;
            g.put(record("events", partition, i / 3)).unwrap();
        }

        assert_eq!(g.record_count(), 30);
        assert_eq!(g.group_count(), 3);

        // Intra-group arrival order equals offset order per partition.
        for (_, group) in g.records() {
            let offsets: Vec<i64> = group.iter().map(|r| r.offset).collect();
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            assert_eq!(offsets, sorted);
            assert_eq!(offsets.len(), 10);
        }
    }

    #[test]
    fn test_enumeration_order_is_stable() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );
        for partition in [4, 1, 3, 0, 2] {
            g.put(record("t", partition, 0)).unwrap();
        }

        let first: Vec<String> = g.records().map(|(k, _)| k.to_string()).collect();
        let second: Vec<String> = g.records().map(|(k, _)| k.to_string()).collect();
        assert_eq!(first, second);
        // Insertion order, not sorted order.
        assert_eq!(first[0], "t-4-0");
    }

    #[test]
    fn test_clear_then_records_is_empty() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );
        g.put(record("t", 0, 0)).unwrap();
        g.clear();

        assert!(g.is_empty());
        assert_eq!(g.records().count(), 0);

        // Idempotent on empty state.
        g.clear();
        assert!(g.is_empty());
    }

    #[test]
    fn test_put_after_clear_starts_fresh_groups() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );
        g.put(record("t", 0, 0)).unwrap();
        g.put(record("t", 0, 1)).unwrap();
        g.clear();

        // Head tracking was reset: the new group starts at offset 2.
        g.put(record("t", 0, 2)).unwrap();
        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "t-0-2");
        assert_eq!(groups[0].1.len(), 1);
    }

    #[test]
    fn test_rotation_at_limit_with_offset_template() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            2,
            GroupLimitPolicy::Rotate,
        );
        for offset in 0..5 {
            g.put(record("t", 0, offset)).unwrap();
        }

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0, "t-0-0");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "t-0-2");
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[2].0, "t-0-4");
        assert_eq!(groups[2].1.len(), 1);
    }

    #[test]
    fn test_rotation_disambiguates_offsetless_template() {
        let mut g = grouper("{{topic}}", 2, GroupLimitPolicy::Rotate);
        for offset in 0..5 {
            g.put(record("t", 0, offset)).unwrap();
        }

        let keys: Vec<&str> = g.records().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["t", "t.1", "t.2"]);
        assert_eq!(g.record_count(), 5);
    }

    #[test]
    fn test_reject_policy_surfaces_group_full() {
        let mut g = grouper(
            "{{topic}}-{{partition}}-{{start_offset}}",
            2,
            GroupLimitPolicy::Reject,
        );
        g.put(record("t", 0, 0)).unwrap();
        g.put(record("t", 0, 1)).unwrap();

        let err = g.put(record("t", 0, 2)).unwrap_err();
        assert!(matches!(err, GroupingError::GroupFull { limit: 2, .. }));
        // The rejected record was not retained.
        assert_eq!(g.record_count(), 2);

        // Rejection is not sticky: the group drains on clear.
        g.clear();
        g.put(record("t", 0, 2)).unwrap();
        assert_eq!(g.record_count(), 1);
    }

    #[test]
    fn test_key_evaluation_failure_propagates() {
        let mut g = grouper("{{key}}", 0, GroupLimitPolicy::Rotate);
        let err = g.put(record("t", 0, 0)).unwrap_err();
        assert!(matches!(err, GroupingError::KeyEvaluation { .. }));
        assert!(g.is_empty());
    }

    #[test]
    fn test_cross_partition_collision_shares_group() {
        // Template without {{partition}}: both partitions map to one key.
        let mut g = grouper("{{topic}}", 0, GroupLimitPolicy::Rotate);
        g.put(record("t", 0, 0)).unwrap();
        g.put(record("t", 1, 0)).unwrap();
        g.put(record("t", 0, 1)).unwrap();

        assert_eq!(g.group_count(), 1);
        assert_eq!(g.record_count(), 3);
    }

    #[test]
    fn test_key_change_rolls_to_new_group() {
        let mut g = grouper("{{key}}", 0, GroupLimitPolicy::Rotate);
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();

        g.put(Record::new("t", 0, 0, ts, "a").with_key("alpha"))
            .unwrap();
        g.put(Record::new("t", 0, 1, ts, "b").with_key("alpha"))
            .unwrap();
        g.put(Record::new("t", 0, 2, ts, "c").with_key("beta"))
            .unwrap();
        g.put(Record::new("t", 0, 3, ts, "d").with_key("alpha"))
            .unwrap();

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "alpha");
        // Offsets 0, 1 and 3: "alpha" resumed after the "beta" interlude.
        assert_eq!(
            groups[0].1.iter().map(|r| r.offset).collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
        assert_eq!(groups[1].0, "beta");
    }

    #[test]
    fn test_timestamp_boundary_rolls_new_file() {
        let mut g = grouper(
            "{{topic}}/{{timestamp:unit=HH}}-{{start_offset}}",
            0,
            GroupLimitPolicy::Rotate,
        );
        let before = Utc.with_ymd_and_hms(2026, 3, 7, 12, 59, 58).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 7, 13, 0, 2).unwrap();

        g.put(Record::new("t", 0, 5, before, "a")).unwrap();
        g.put(Record::new("t", 0, 6, before, "b")).unwrap();
        // Crossing the hour boundary starts a new file whose start offset is
        // the crossing record's own.
        g.put(Record::new("t", 0, 7, after, "c")).unwrap();
        g.put(Record::new("t", 0, 8, after, "d")).unwrap();

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "t/12-5");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "t/13-7");
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_start_offset_pinned_to_head() {
        // The head's offset names the file even as later offsets arrive.
        let mut g = grouper("{{start_offset}}", 0, GroupLimitPolicy::Rotate);
        g.put(record("t", 0, 100)).unwrap();
        g.put(record("t", 0, 101)).unwrap();
        g.put(record("t", 0, 102)).unwrap();

        let groups: Vec<_> = g.records().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "100");
    }
}

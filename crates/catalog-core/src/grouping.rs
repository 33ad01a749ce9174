use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::dictionary::Dictionary;
use crate::record::TaskRecord;
use crate::text::title_case_activity;

pub const OTHER_GROUP: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub id: String,
    pub label: String,
}

impl GroupKey {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

/// Deterministic name -> group classification for one listing mode.
pub trait Grouper {
    fn group_of(&self, record: &TaskRecord) -> GroupKey;

    /// Position of a group in the listing. The default orders by label with
    /// the catch-all group last.
    fn rank(&self, key: &GroupKey) -> (bool, usize, String) {
        (key.id == OTHER_GROUP, 0, key.label.to_lowercase())
    }

    /// Every group this grouper can produce, for empty-group listings.
    fn declared(&self) -> Vec<GroupKey> {
        vec![]
    }
}

/// Composite tasks grouped by their activity.
#[derive(Debug, Clone, Default)]
pub struct ActivityGrouper;

impl Grouper for ActivityGrouper {
    fn group_of(&self, record: &TaskRecord) -> GroupKey {
        let label = title_case_activity(&record.group);
        if label.is_empty() {
            return GroupKey::new(OTHER_GROUP, "Other");
        }
        GroupKey::new(&label.to_lowercase(), &label)
    }
}

/// Atomic tasks grouped by the fixture they were listed under.
#[derive(Debug, Clone, Default)]
pub struct FixtureGrouper;

impl Grouper for FixtureGrouper {
    fn group_of(&self, record: &TaskRecord) -> GroupKey {
        match (&record.fixture_id, record.group.trim()) {
            (Some(id), label) if !label.is_empty() => GroupKey::new(id, label),
            (Some(id), _) => GroupKey::new(id, id),
            (None, _) => GroupKey::new(OTHER_GROUP, "Miscellaneous"),
        }
    }
}

/// Atomic tasks grouped by skill, using the dictionary's ordered
/// first-match rules over the task name.
#[derive(Debug, Clone)]
pub struct SkillGrouper {
    groups: Vec<(GroupKey, Vec<Regex>)>,
    fallback: GroupKey,
}

impl SkillGrouper {
    pub fn new(dict: &Dictionary) -> Self {
        let groups: Vec<(GroupKey, Vec<Regex>)> = dict
            .skill_groups
            .iter()
            .map(|def| {
                let patterns = def
                    .patterns
                    .iter()
                    .filter_map(|p| match Regex::new(p) {
                        Ok(re) => Some(re),
                        Err(err) => {
                            warn!(group = %def.id, pattern = %p, error = %err, "skipping invalid skill pattern");
                            None
                        }
                    })
                    .collect();
                (GroupKey::new(&def.id, &def.label), patterns)
            })
            .collect();

        let fallback = dict
            .default_skill_group
            .as_deref()
            .and_then(|id| groups.iter().find(|(key, _)| key.id == id))
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| GroupKey::new(OTHER_GROUP, "Other"));

        debug!(groups = groups.len(), fallback = %fallback.id, "built skill grouper");
        Self { groups, fallback }
    }
}

impl Grouper for SkillGrouper {
    fn group_of(&self, record: &TaskRecord) -> GroupKey {
        let name = record.name.trim();
        if name.is_empty() {
            return self.fallback.clone();
        }
        self.groups
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(name)))
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn rank(&self, key: &GroupKey) -> (bool, usize, String) {
        match self.groups.iter().position(|(k, _)| k == key) {
            Some(pos) => (false, pos, String::new()),
            None => (true, usize::MAX, key.label.to_lowercase()),
        }
    }

    fn declared(&self) -> Vec<GroupKey> {
        self.groups.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TaskGroup<'a> {
    pub key: GroupKey,
    pub tasks: Vec<&'a TaskRecord>,
}

/// Visible records bucketed by `grouper`, groups in listing order and
/// tasks sorted by name (stable) inside each group.
pub fn group_visible<'a>(
    records: &[&'a TaskRecord],
    grouper: &dyn Grouper,
) -> Vec<TaskGroup<'a>> {
    let mut by_key: BTreeMap<GroupKey, Vec<&'a TaskRecord>> = BTreeMap::new();
    for &record in records {
        by_key.entry(grouper.group_of(record)).or_default().push(record);
    }

    let mut groups: Vec<TaskGroup<'a>> = by_key
        .into_iter()
        .map(|(key, mut tasks)| {
            tasks.sort_by(|a, b| a.name.cmp(&b.name));
            TaskGroup { key, tasks }
        })
        .collect();
    groups.sort_by_key(|g| grouper.rank(&g.key));
    groups
}

/// Per-group visible counts, keyed by group id.
pub fn group_counts(records: &[&TaskRecord], grouper: &dyn Grouper) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for record in records {
        *out.entry(grouper.group_of(record).id).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::SkillGroupDef;
    use crate::record::TaskKind;

    fn skill_dict() -> Dictionary {
        Dictionary {
            skill_groups: vec![
                SkillGroupDef {
                    id: "lids".to_string(),
                    label: "Lids".to_string(),
                    patterns: vec!["^(Open|Close).*(Lid|Head)$".to_string()],
                },
                SkillGroupDef {
                    id: "opening_doors".to_string(),
                    label: "Opening Doors".to_string(),
                    patterns: vec!["^Open[A-Z]".to_string(), "([".to_string()],
                },
                SkillGroupDef {
                    id: "pick_and_place".to_string(),
                    label: "Pick and Place".to_string(),
                    patterns: vec![],
                },
            ],
            default_skill_group: Some("pick_and_place".to_string()),
            ..Dictionary::default()
        }
    }

    fn atomic(name: &str) -> TaskRecord {
        TaskRecord::new(name, TaskKind::Atomic, "")
    }

    #[test]
    fn skill_rules_are_first_match() {
        let grouper = SkillGrouper::new(&skill_dict());
        assert_eq!(grouper.group_of(&atomic("OpenBlenderLid")).id, "lids");
        assert_eq!(grouper.group_of(&atomic("OpenDrawer")).id, "opening_doors");
        assert_eq!(grouper.group_of(&atomic("PickPlaceCounterToSink")).id, "pick_and_place");
        assert_eq!(grouper.declared().len(), 3);
    }

    #[test]
    fn groups_follow_declared_order_and_sort_tasks() {
        let grouper = SkillGrouper::new(&skill_dict());
        let records = [
            atomic("PickB"),
            atomic("OpenDrawer"),
            atomic("PickA"),
            atomic("CloseKettleLid"),
        ];
        let refs: Vec<&TaskRecord> = records.iter().collect();
        let groups = group_visible(&refs, &grouper);

        let ids: Vec<&str> = groups.iter().map(|g| g.key.id.as_str()).collect();
        assert_eq!(ids, vec!["lids", "opening_doors", "pick_and_place"]);
        let picks: Vec<&str> = groups[2].tasks.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(picks, vec!["PickA", "PickB"]);

        let counts = group_counts(&refs, &grouper);
        assert_eq!(counts.get("pick_and_place"), Some(&2));
    }

    #[test]
    fn activity_groups_are_alphabetical_with_other_last() {
        let records = [
            TaskRecord::new("B", TaskKind::Composite, "washing dishes"),
            TaskRecord::new("A", TaskKind::Composite, ""),
            TaskRecord::new("C", TaskKind::Composite, "adding ice to beverages"),
        ];
        let refs: Vec<&TaskRecord> = records.iter().collect();
        let groups = group_visible(&refs, &ActivityGrouper);
        let labels: Vec<&str> = groups.iter().map(|g| g.key.label.as_str()).collect();
        assert_eq!(labels, vec!["Adding Ice to Beverages", "Washing Dishes", "Other"]);
    }

    #[test]
    fn fixture_grouper_uses_fixture_label() {
        let mut record = atomic("OpenDrawer");
        record.group = "Drawers".to_string();
        record.fixture_id = Some("drawer".to_string());
        assert_eq!(FixtureGrouper.group_of(&record), GroupKey::new("drawer", "Drawers"));
        assert_eq!(FixtureGrouper.group_of(&atomic("X")).id, OTHER_GROUP);
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bundle::Bundle;
use crate::dictionary::{CategoryResolver, Dictionary};
use crate::tags::task_tag_keys;
use crate::grouping::{Grouper, SkillGrouper};
use crate::text::{activity_folder_from_title, collapse_lower, snake_from_task_name, spaced_lower};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Atomic,
    Composite,
}

impl TaskKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Some(Self::Atomic),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Composite => "composite",
        }
    }
}

/// One catalogued task. Built once, never mutated; derived fields
/// (`search_text`) are computed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub name: String,
    pub kind: TaskKind,
    /// Activity title (composite) or fixture label (atomic).
    pub group: String,
    pub fixture_id: Option<String>,
    pub description: String,
    pub search_text: String,
    pub tag_keys: Vec<String>,
    pub category: Option<String>,
    pub horizon_seconds: Option<f64>,
    pub subtask_count: Option<u32>,
    pub target_membership: BTreeSet<String>,
    pub navigation: Option<bool>,
    pub source_url: Option<String>,
}

impl TaskRecord {
    pub fn new(name: &str, kind: TaskKind, group: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            group: group.to_string(),
            fixture_id: None,
            description: String::new(),
            search_text: search_text_for(name, group),
            tag_keys: vec![],
            category: None,
            horizon_seconds: None,
            subtask_count: None,
            target_membership: BTreeSet::new(),
            navigation: None,
            source_url: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_keys = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category.map(str::to_string);
        self
    }

    pub fn with_horizon(mut self, seconds: Option<f64>) -> Self {
        self.horizon_seconds = seconds.filter(|s| s.is_finite());
        self
    }

    pub fn with_subtasks(mut self, count: Option<u32>) -> Self {
        self.subtask_count = count;
        self
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_membership = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.trim().to_string();
        self
    }

    /// Appends extra searchable text, lowercased and whitespace-collapsed.
    pub fn with_search_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            let term = collapse_lower(term.as_ref());
            if !term.is_empty() {
                self.search_text.push(' ');
                self.search_text.push_str(&term);
            }
        }
        self
    }

    /// Lowercased name and its spaced variant, without the group label.
    pub fn name_text(&self) -> String {
        format!("{} {}", self.name.to_lowercase(), spaced_lower(&self.name))
    }
}

fn search_text_for(name: &str, group: &str) -> String {
    format!(
        "{} {} {}",
        name.to_lowercase(),
        spaced_lower(name),
        group.to_lowercase()
    )
}

/// The read-only record set the engine evaluates against.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    records: Vec<TaskRecord>,
    by_name: BTreeMap<String, usize>,
}

impl TaskIndex {
    /// Later records whose name is already present are dropped.
    pub fn new(records: Vec<TaskRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut by_name = BTreeMap::new();

        for record in records {
            if by_name.contains_key(&record.name) {
                warn!(task = %record.name, "duplicate task name in bundle; keeping first");
                continue;
            }
            by_name.insert(record.name.clone(), kept.len());
            kept.push(record);
        }

        Self {
            records: kept,
            by_name,
        }
    }

    pub fn get(&self, name: &str) -> Option<&TaskRecord> {
        self.by_name.get(name).map(|&idx| &self.records[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one catalog page, derived from the bundled tables.
    #[tracing::instrument(skip(bundle))]
    pub fn build(bundle: &Bundle, kind: TaskKind) -> Self {
        let records = match kind {
            TaskKind::Composite => composite_records(bundle),
            TaskKind::Atomic => atomic_records(bundle),
        };
        let index = Self::new(records);
        info!(kind = kind.as_str(), tasks = index.len(), "built task index");
        index
    }
}

fn composite_records(bundle: &Bundle) -> Vec<TaskRecord> {
    let dict = &bundle.dictionary;
    let categories = CategoryResolver::new(dict);

    bundle
        .attributes
        .iter()
        .filter(|(_, attrs)| !attrs.is_atomic())
        .map(|(name, attrs)| {
            let activity = attrs.activity.clone().unwrap_or_default();
            let navigation = attrs.navigation();
            let mut record = TaskRecord::new(name, TaskKind::Composite, &activity)
                .with_description(&attrs.description)
                .with_category(categories.resolve(&activity).as_deref())
                .with_horizon(bundle.composite_length(name))
                .with_subtasks(attrs.subtask_count())
                .with_targets(dict.target_membership(name, TaskKind::Composite))
                .with_tags(task_tag_keys(dict, name, navigation, &attrs.description));
            record.navigation = navigation;
            record.source_url = composite_source_url(dict, &activity, name);
            record
        })
        .collect()
}

/// Atomic search text also covers the description and the skill-group
/// label, so words that only appear there still match.
fn atomic_records(bundle: &Bundle) -> Vec<TaskRecord> {
    let dict = &bundle.dictionary;
    let skills = (!dict.skill_groups.is_empty()).then(|| SkillGrouper::new(dict));
    let mut out = Vec::new();

    for fixture in &bundle.fixtures {
        for entry in &fixture.tasks {
            let attrs = bundle.attributes.get(&entry.name);
            let description = entry
                .description
                .clone()
                .or_else(|| attrs.map(|a| a.description.clone()))
                .unwrap_or_default();
            let navigation = attrs.and_then(|a| a.navigation());

            let mut record = TaskRecord::new(&entry.name, TaskKind::Atomic, &fixture.label)
                .with_description(&description)
                .with_horizon(bundle.atomic_length(&entry.name))
                .with_targets(dict.target_membership(&entry.name, TaskKind::Atomic))
                .with_tags(task_tag_keys(dict, &entry.name, navigation, &description));
            let skill_label = skills.as_ref().map(|g| g.group_of(&record).label);
            record = record.with_search_terms(
                std::iter::once(description.as_str()).chain(skill_label.as_deref()),
            );
            record.fixture_id = Some(fixture.id.clone());
            record.navigation = navigation;
            record.source_url = dict.source.atomic_base.as_deref().and_then(|base| {
                entry.source.as_deref().map(|path| match entry.line {
                    Some(line) => format!("{}/{}#L{}", base.trim_end_matches('/'), path, line),
                    None => format!("{}/{}", base.trim_end_matches('/'), path),
                })
            });
            out.push(record);
        }
    }

    debug!(tasks = out.len(), fixtures = bundle.fixtures.len(), "collected atomic tasks");
    out
}

fn composite_source_url(dict: &Dictionary, activity: &str, name: &str) -> Option<String> {
    let base = dict.source.composite_base.as_deref()?;
    let folder = activity_folder_from_title(activity);
    let file = dict
        .source
        .file_base_overrides
        .get(name)
        .cloned()
        .unwrap_or_else(|| snake_from_task_name(name));
    if folder.is_empty() || file.is_empty() {
        return None;
    }
    Some(format!("{}/{folder}/{file}.py", base.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_has_name_variants_and_group() {
        let record = TaskRecord::new("OpenCabinet", TaskKind::Atomic, "Doors");
        assert_eq!(record.search_text, "opencabinet open cabinet doors");
        assert_eq!(record.name_text(), "opencabinet open cabinet");
    }

    #[test]
    fn search_terms_are_collapsed_and_appended() {
        let record = TaskRecord::new("OpenCabinet", TaskKind::Atomic, "Doors")
            .with_search_terms(["Open the  Cabinet\tdoor.", "", "Door Skills"]);
        assert_eq!(
            record.search_text,
            "opencabinet open cabinet doors open the cabinet door. door skills"
        );
    }

    #[test]
    fn index_keeps_first_of_duplicate_names() {
        let index = TaskIndex::new(vec![
            TaskRecord::new("A", TaskKind::Atomic, "one"),
            TaskRecord::new("B", TaskKind::Atomic, "one"),
            TaskRecord::new("A", TaskKind::Atomic, "two"),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("A").map(|r| r.group.as_str()), Some("one"));
        assert!(index.get("C").is_none());
    }

    #[test]
    fn non_finite_horizon_is_dropped() {
        let record = TaskRecord::new("A", TaskKind::Atomic, "g").with_horizon(Some(f64::NAN));
        assert_eq!(record.horizon_seconds, None);
    }

    #[test]
    fn composite_source_links_use_folder_and_snake_name() {
        let mut dict = Dictionary::default();
        dict.source.composite_base = Some("https://example.org/composite/".to_string());
        dict.source
            .file_base_overrides
            .insert("AddSweetener".to_string(), "add_sweetner".to_string());

        assert_eq!(
            composite_source_url(&dict, "Brewing Coffee", "MakeIceLemonade").as_deref(),
            Some("https://example.org/composite/brewing_coffee/make_ice_lemonade.py")
        );
        assert_eq!(
            composite_source_url(&dict, "Brewing Coffee", "AddSweetener").as_deref(),
            Some("https://example.org/composite/brewing_coffee/add_sweetner.py")
        );
        assert_eq!(composite_source_url(&dict, "", "AddSweetener"), None);
    }
}
